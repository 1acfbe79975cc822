//! Application UI. For now, this is a spinner per pipeline stage.
//!
//! This is adapted from `substudy` by Eric Kidd, which is licensed under
//! Apache-2.0 OR MIT. Used with permission.

use std::{borrow::Cow, io, sync::Arc, time::Duration};

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::{sync::watch, task::JoinHandle};

use crate::pipeline::Status;

/// Application UI state.
#[derive(Clone)]
pub struct Ui {
    /// Our spinners.
    multi_progress: Arc<MultiProgress>,
}

impl Ui {
    /// Create a new UI.
    pub fn init() -> Ui {
        let multi_progress = Arc::new(MultiProgress::new());
        Ui { multi_progress }
    }

    /// Hide all our spinners completely, for when we're writing actual output
    /// to `stdout`.
    pub fn hide_progress_bars(&self) {
        self.multi_progress
            .set_draw_target(ProgressDrawTarget::hidden());
    }

    /// Get a writer than can be used to write to stderr, for use with `tracing`
    /// and other output code.
    pub fn get_stderr_writer(&self) -> SafeStderrWriter {
        SafeStderrWriter { ui: self.clone() }
    }

    /// Get a reference to our spinners.
    pub fn multi_progress(&self) -> &MultiProgress {
        &self.multi_progress
    }

    /// Create a new spinner with default settings.
    pub fn new_spinner(&self, config: &ProgressConfig<'_>) -> ProgressBar {
        let sp = ProgressBar::new_spinner().with_style(default_spinner_style());
        let sp = self.multi_progress.add(sp);
        sp.set_prefix(config.emoji.to_owned());
        sp.set_message(config.msg.to_owned());
        sp.enable_steady_tick(Duration::from_millis(250));
        sp.with_finish(indicatif::ProgressFinish::WithMessage(Cow::Owned(
            config.done_msg.to_owned(),
        )))
    }

    /// Show a spinner for each pipeline stage, until the pipeline is ready or
    /// has failed.
    pub fn follow_pipeline(&self, mut status_rx: watch::Receiver<Status>) -> JoinHandle<()> {
        let ui = self.clone();
        tokio::spawn(async move {
            let mut spinner: Option<ProgressBar> = None;
            loop {
                let status = status_rx.borrow_and_update().clone();
                if let Some(sp) = spinner.take() {
                    match status {
                        Status::Error(_) => sp.abandon_with_message("Failed"),
                        _ => sp.finish_using_style(),
                    }
                }
                if matches!(status, Status::Ready | Status::Error(_)) {
                    break;
                }
                spinner = stage_config(&status).map(|config| ui.new_spinner(&config));
                if status_rx.changed().await.is_err() {
                    break;
                }
            }
            if let Some(sp) = spinner {
                sp.finish_using_style();
            }
        })
    }
}

/// Spinner text for a stage, if it has a spinner.
fn stage_config(status: &Status) -> Option<ProgressConfig<'static>> {
    match status {
        Status::Ocr => Some(ProgressConfig {
            emoji: "📄",
            msg: "Reading document",
            done_msg: "Read document",
        }),
        Status::Structuring => Some(ProgressConfig {
            emoji: "🧩",
            msg: "Structuring chalan",
            done_msg: "Structured chalan",
        }),
        _ => None,
    }
}

/// Configuration for a spinner.
pub struct ProgressConfig<'a> {
    /// Emoji to display in the spinner.
    pub emoji: &'a str,
    /// Message to display in a running spinner.
    pub msg: &'a str,
    /// Message to display in a spinner when it is done.
    pub done_msg: &'a str,
}

fn default_spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner} {prefix:3}{msg} {elapsed}")
        .expect("bad progress bar template")
}

/// A writer which can used to write to `stderr`. It will hide and show
/// spinners as needed, so that they don't interfere with the output.
#[derive(Clone)]
pub struct SafeStderrWriter {
    ui: Ui,
}

impl io::Write for SafeStderrWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.ui.multi_progress().suspend(|| io::stderr().write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.ui.multi_progress().suspend(|| io::stderr().flush())
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.ui
            .multi_progress()
            .suspend(|| io::stderr().write_all(buf))
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SafeStderrWriter {
    type Writer = SafeStderrWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
