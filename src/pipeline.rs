//! The two-stage pipeline: OCR, then structuring, then editing.
//!
//! ```text
//! idle -> ocr -> structuring -> ready
//!          \          \
//!           `-> error <-'
//! ```
//!
//! Any state can be reset to `idle`. A [`Pipeline`] is a cheap handle, so one
//! task can reset it while another is waiting on the API. Each run is tagged
//! with a generation number, and results from an older generation are thrown
//! away.

use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard},
};

use tokio::sync::watch;

use crate::{
    document::{DeliveryChalanDocument, DocumentUpdate},
    drivers::TokenUsage,
    editor::EditorSession,
    error::ChalanError,
    ocr::OcrClient,
    prelude::*,
    source::SourceFile,
    structure::StructuringClient,
};

/// Where the pipeline is.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Status {
    /// Waiting for a file, or for [`Pipeline::process`].
    Idle,
    /// Transcribing the document.
    Ocr,
    /// Structuring the transcription.
    Structuring,
    /// A document is ready for editing.
    Ready,
    /// Something went wrong. The message is meant for humans.
    Error(String),
}

impl Status {
    /// Is a stage running right now?
    pub fn is_busy(&self) -> bool {
        matches!(self, Status::Ocr | Status::Structuring)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Idle => write!(f, "idle"),
            Status::Ocr => write!(f, "ocr"),
            Status::Structuring => write!(f, "structuring"),
            Status::Ready => write!(f, "ready"),
            Status::Error(message) => write!(f, "error: {message}"),
        }
    }
}

/// How a call to [`Pipeline::process`] ended.
#[derive(Debug)]
pub enum Outcome {
    /// A document is ready for editing.
    Ready,
    /// A stage failed, and the pipeline is in the error state.
    Failed(ChalanError),
    /// The pipeline was reset, or a new file was selected, while we were
    /// waiting. Nothing was changed.
    Superseded,
    /// There is no file to process.
    NoFile,
    /// Another run is already in progress.
    Busy,
}

/// Everything we have once a document is ready.
#[derive(Clone, Debug)]
struct Ready {
    session: EditorSession,
    preview_url: String,
}

/// State shared between pipeline handles.
#[derive(Debug)]
struct Inner {
    /// Bumped by every run, reset and file selection.
    generation: u64,
    source: Option<SourceFile>,
    status: Status,
    ready: Option<Ready>,
    token_usage: TokenUsage,
}

/// The OCR and structuring pipeline for one document at a time.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<Mutex<Inner>>,
    status_tx: Arc<watch::Sender<Status>>,
    ocr: OcrClient,
    structurer: StructuringClient,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Create an idle pipeline.
    pub fn new(ocr: OcrClient, structurer: StructuringClient) -> Self {
        let (status_tx, _) = watch::channel(Status::Idle);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                generation: 0,
                source: None,
                status: Status::Idle,
                ready: None,
                token_usage: TokenUsage::default(),
            })),
            status_tx: Arc::new(status_tx),
            ocr,
            structurer,
        }
    }

    /// Lock our state. Never hold this across an `.await`.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Nothing we do while holding the lock can leave `Inner` half-updated,
        // so a poisoned lock is still usable.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Change our status and tell any subscribers. Call with the lock held.
    fn set_status(&self, inner: &mut Inner, status: Status) {
        debug!(generation = inner.generation, %status, "Pipeline status");
        inner.status = status.clone();
        self.status_tx.send_replace(status);
    }

    /// The current status.
    pub fn status(&self) -> Status {
        self.lock().status.clone()
    }

    /// Watch status changes.
    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.status_tx.subscribe()
    }

    /// Select a new file, discarding any previous results. Files which are
    /// not images or PDFs are rejected and change nothing.
    pub fn select_file(&self, name: &str, data: Vec<u8>) -> Result<(), ChalanError> {
        let source = SourceFile::from_bytes(name, data)?;
        self.select_source(source);
        Ok(())
    }

    /// Select an already-validated file, discarding any previous results.
    pub fn select_source(&self, source: SourceFile) {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.source = Some(source);
        inner.ready = None;
        inner.token_usage = TokenUsage::default();
        self.set_status(&mut inner, Status::Idle);
    }

    /// Forget the file and any results, and go back to idle. Any run in
    /// progress will be discarded when it finishes.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.source = None;
        inner.ready = None;
        inner.token_usage = TokenUsage::default();
        self.set_status(&mut inner, Status::Idle);
    }

    /// Run OCR and structuring on the selected file.
    #[instrument(level = "debug", skip(self))]
    pub async fn process(&self, model: &str) -> Outcome {
        let (generation, source) = {
            let mut inner = self.lock();
            if inner.status.is_busy() {
                return Outcome::Busy;
            }
            let Some(source) = inner.source.clone() else {
                return Outcome::NoFile;
            };
            inner.generation += 1;
            inner.ready = None;
            inner.token_usage = TokenUsage::default();
            self.set_status(&mut inner, Status::Ocr);
            (inner.generation, source)
        };

        let ocr = self.ocr.perform_ocr(&source, model).await;
        let ocr_text = match self.finish_stage(generation, ocr, |inner, ocr| {
            if let Some(usage) = ocr.token_usage {
                inner.token_usage += usage;
            }
            self.set_status(inner, Status::Structuring);
            ocr.text
        }) {
            Ok(text) => text,
            Err(outcome) => return outcome,
        };

        let structured = self
            .structurer
            .structure_delivery_chalan(&ocr_text, model)
            .await;
        let finished = self.finish_stage(generation, structured, |inner, structured| {
            if let Some(usage) = structured.token_usage {
                inner.token_usage += usage;
            }
            inner.ready = Some(Ready {
                session: EditorSession::new(structured.document),
                preview_url: source.preview_url(),
            });
            self.set_status(inner, Status::Ready);
        });
        match finished {
            Ok(()) => Outcome::Ready,
            Err(outcome) => outcome,
        }
    }

    /// Check a stage result against the current generation and, if it is
    /// still current, hand it to `advance`. Both happen under one lock, so a
    /// reset can never land between the check and the state change. The lock
    /// is released before we return, so the caller may `.await` again.
    fn finish_stage<T, R>(
        &self,
        generation: u64,
        result: Result<T, ChalanError>,
        advance: impl FnOnce(&mut Inner, T) -> R,
    ) -> Result<R, Outcome> {
        let mut inner = self.lock();
        if inner.generation != generation {
            debug!(
                generation,
                current = inner.generation,
                "Discarding result from superseded run"
            );
            return Err(Outcome::Superseded);
        }
        match result {
            Ok(value) => Ok(advance(&mut inner, value)),
            Err(err) => {
                inner.ready = None;
                self.set_status(&mut inner, Status::Error(err.to_string()));
                Err(Outcome::Failed(err))
            }
        }
    }

    /// Apply an update to the document. Returns `false` if there is no
    /// document, or the update was empty.
    pub fn update(&self, update: DocumentUpdate) -> bool {
        self.edit(|session| session.update(update)).unwrap_or(false)
    }

    /// Run an editing operation against the ready document.
    pub fn edit<R>(&self, f: impl FnOnce(&mut EditorSession) -> R) -> Option<R> {
        let mut inner = self.lock();
        inner.ready.as_mut().map(|ready| f(&mut ready.session))
    }

    /// A copy of the ready document, if there is one.
    pub fn document(&self) -> Option<DeliveryChalanDocument> {
        self.lock()
            .ready
            .as_ref()
            .map(|ready| ready.session.document().clone())
    }

    /// How many corrections have been made to the ready document.
    pub fn corrections(&self) -> Option<usize> {
        self.lock()
            .ready
            .as_ref()
            .map(|ready| ready.session.corrections())
    }

    /// A `data:` URL of the original file, once a document is ready.
    pub fn preview_url(&self) -> Option<String> {
        self.lock()
            .ready
            .as_ref()
            .map(|ready| ready.preview_url.clone())
    }

    /// Tokens used by the current run so far.
    pub fn token_usage(&self) -> TokenUsage {
        self.lock().token_usage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        document::tests::sample_document,
        drivers::{LlmOpts, scripted::ScriptedDriver},
        llm_client::{ApiKey, GeminiConfig},
        prompt::Prompt,
        source::tests::PNG_HEADER,
    };

    const MODEL: &str = "gemini-3-flash-preview";

    fn structured_reply() -> String {
        serde_json::to_string(&sample_document()).unwrap()
    }

    fn pipeline_with(driver: ScriptedDriver, config: GeminiConfig) -> (Pipeline, Arc<ScriptedDriver>) {
        let driver = Arc::new(driver);
        let ocr = OcrClient::new(
            driver.clone(),
            config.clone(),
            Prompt::default_ocr(),
            LlmOpts::default(),
        );
        let structurer = StructuringClient::new(
            driver.clone(),
            config,
            Prompt::default_structure(),
            LlmOpts::default(),
        );
        (Pipeline::new(ocr, structurer), driver)
    }

    fn pipeline(driver: ScriptedDriver) -> (Pipeline, Arc<ScriptedDriver>) {
        let config = GeminiConfig {
            api_key: ApiKey::new("test-key"),
            ..GeminiConfig::default()
        };
        pipeline_with(driver, config)
    }

    #[tokio::test]
    async fn happy_path_ends_ready() {
        let reply = structured_reply();
        let (pipeline, driver) =
            pipeline(ScriptedDriver::new().reply_text("OCR text").reply_text(&reply));
        let mut status_rx = pipeline.subscribe();
        pipeline.select_file("scan.png", PNG_HEADER.to_vec()).unwrap();

        assert!(matches!(pipeline.process(MODEL).await, Outcome::Ready));
        assert_eq!(pipeline.status(), Status::Ready);
        assert_eq!(*status_rx.borrow_and_update(), Status::Ready);

        let doc = pipeline.document().unwrap();
        assert_eq!(doc.chalan_number, "DC-1001");
        assert_eq!(doc.raw_ocr_text, "OCR text");
        assert_eq!(doc.processing_model, MODEL);
        assert!(pipeline.preview_url().unwrap().starts_with("data:image/png;base64,"));
        assert_eq!(pipeline.corrections(), Some(0));
        assert_eq!(pipeline.token_usage().total_tokens(), 2400);

        let requests = driver.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].parts.len(), 1);
    }

    #[tokio::test]
    async fn each_patch_counts_once() {
        let reply = structured_reply();
        let (pipeline, _) =
            pipeline(ScriptedDriver::new().reply_text("OCR text").reply_text(&reply));
        pipeline.select_file("scan.png", PNG_HEADER.to_vec()).unwrap();
        pipeline.process(MODEL).await;

        assert!(pipeline.update(DocumentUpdate {
            po_number: Some("PO-9".to_owned()),
            ..DocumentUpdate::default()
        }));
        assert!(pipeline.update(DocumentUpdate {
            date: Some("today".to_owned()),
            ..DocumentUpdate::default()
        }));
        assert!(!pipeline.update(DocumentUpdate::default()));
        assert_eq!(pipeline.corrections(), Some(2));
        let doc = pipeline.document().unwrap();
        assert_eq!(doc.po_number, "PO-9");
        assert_eq!(doc.chalan_number, "DC-1001");
    }

    #[tokio::test]
    async fn structuring_failure_keeps_nothing() {
        let (pipeline, _) = pipeline(
            ScriptedDriver::new()
                .reply_text("OCR text")
                .reply_text("this is not JSON"),
        );
        pipeline.select_file("scan.png", PNG_HEADER.to_vec()).unwrap();

        let outcome = pipeline.process(MODEL).await;
        assert!(matches!(outcome, Outcome::Failed(ChalanError::Structuring(_))));
        match pipeline.status() {
            Status::Error(message) => {
                assert!(message.starts_with("Failed to structure document data."))
            }
            other => panic!("unexpected status: {other:?}"),
        }
        assert!(pipeline.document().is_none());
        assert!(!pipeline.update(DocumentUpdate {
            date: Some("x".to_owned()),
            ..DocumentUpdate::default()
        }));
    }

    #[tokio::test]
    async fn ocr_failure_skips_structuring() {
        let (pipeline, driver) = pipeline(ScriptedDriver::new().reply_error("Bad request"));
        pipeline.select_file("scan.png", PNG_HEADER.to_vec()).unwrap();
        assert!(matches!(
            pipeline.process(MODEL).await,
            Outcome::Failed(ChalanError::Upstream { .. })
        ));
        assert_eq!(driver.requests().len(), 1);
        assert!(matches!(pipeline.status(), Status::Error(_)));
    }

    #[tokio::test]
    async fn errors_can_be_retried_by_hand() {
        let reply = structured_reply();
        let (pipeline, _) = pipeline(
            ScriptedDriver::new()
                .reply_empty()
                .reply_text("OCR text")
                .reply_text(&reply),
        );
        pipeline.select_file("scan.png", PNG_HEADER.to_vec()).unwrap();
        assert!(matches!(
            pipeline.process(MODEL).await,
            Outcome::Failed(ChalanError::NoText)
        ));
        assert!(matches!(pipeline.process(MODEL).await, Outcome::Ready));
    }

    #[tokio::test]
    async fn invalid_files_change_nothing() {
        let reply = structured_reply();
        let (pipeline, _) =
            pipeline(ScriptedDriver::new().reply_text("OCR text").reply_text(&reply));
        pipeline.select_file("scan.png", PNG_HEADER.to_vec()).unwrap();
        pipeline.process(MODEL).await;

        let err = pipeline
            .select_file("notes.txt", b"hello".to_vec())
            .unwrap_err();
        assert!(matches!(err, ChalanError::UnsupportedMediaType { .. }));
        assert_eq!(pipeline.status(), Status::Ready);
        assert!(pipeline.document().is_some());
    }

    #[tokio::test]
    async fn selecting_a_new_file_clears_results() {
        let reply = structured_reply();
        let (pipeline, _) =
            pipeline(ScriptedDriver::new().reply_text("OCR text").reply_text(&reply));
        pipeline.select_file("scan.png", PNG_HEADER.to_vec()).unwrap();
        pipeline.process(MODEL).await;
        pipeline.select_file("next.pdf", b"%PDF-1.4\n".to_vec()).unwrap();
        assert_eq!(pipeline.status(), Status::Idle);
        assert!(pipeline.document().is_none());
        assert!(pipeline.token_usage().is_zero());
    }

    #[tokio::test]
    async fn processing_without_a_file_does_nothing() {
        let (pipeline, driver) = pipeline(ScriptedDriver::new());
        assert!(matches!(pipeline.process(MODEL).await, Outcome::NoFile));
        assert_eq!(pipeline.status(), Status::Idle);
        assert!(driver.requests().is_empty());
    }

    #[tokio::test]
    async fn missing_api_key_fails_without_a_request() {
        let (pipeline, driver) = pipeline_with(ScriptedDriver::new(), GeminiConfig::default());
        pipeline.select_file("scan.png", PNG_HEADER.to_vec()).unwrap();
        assert!(matches!(
            pipeline.process(MODEL).await,
            Outcome::Failed(ChalanError::MissingApiKey)
        ));
        assert!(driver.requests().is_empty());
        match pipeline.status() {
            Status::Error(message) => assert!(message.contains("API key is missing")),
            other => panic!("unexpected status: {other:?}"),
        }
    }

    #[tokio::test]
    async fn stale_results_are_discarded_after_reset() {
        let (driver, gate) = ScriptedDriver::new().reply_text_gated("late OCR text");
        let (pipeline, driver) = pipeline(driver);
        pipeline.select_file("scan.png", PNG_HEADER.to_vec()).unwrap();

        let mut status_rx = pipeline.subscribe();
        let running = tokio::spawn({
            let pipeline = pipeline.clone();
            async move { pipeline.process(MODEL).await }
        });

        // Wait until OCR is in flight.
        status_rx
            .wait_for(|status| *status == Status::Ocr)
            .await
            .unwrap();
        assert!(matches!(pipeline.process(MODEL).await, Outcome::Busy));
        pipeline.reset();
        gate.send(()).unwrap();

        assert!(matches!(running.await.unwrap(), Outcome::Superseded));
        assert_eq!(pipeline.status(), Status::Idle);
        assert!(pipeline.document().is_none());
        // The structuring stage never ran.
        assert_eq!(driver.requests().len(), 1);
    }

    #[tokio::test]
    async fn reset_during_structuring_leaves_pipeline_usable() {
        let reply = structured_reply();
        let (driver, gate) = ScriptedDriver::new()
            .reply_text("OCR text")
            .reply_text_gated(&reply);
        let (pipeline, _) = pipeline(driver.reply_text("OCR text").reply_text(&reply));
        pipeline.select_file("scan.png", PNG_HEADER.to_vec()).unwrap();

        let mut status_rx = pipeline.subscribe();
        let running = tokio::spawn({
            let pipeline = pipeline.clone();
            async move { pipeline.process(MODEL).await }
        });
        status_rx
            .wait_for(|status| *status == Status::Structuring)
            .await
            .unwrap();
        pipeline.reset();
        gate.send(()).unwrap();

        assert!(matches!(running.await.unwrap(), Outcome::Superseded));
        assert_eq!(pipeline.status(), Status::Idle);
        assert!(pipeline.token_usage().is_zero());

        // The stale run must not leave us stuck in a busy state.
        pipeline.select_file("scan.png", PNG_HEADER.to_vec()).unwrap();
        assert!(matches!(pipeline.process(MODEL).await, Outcome::Ready));
        assert_eq!(pipeline.token_usage().total_tokens(), 2400);
    }

    #[test]
    fn stale_stage_results_never_touch_newer_state() {
        let (pipeline, _) = pipeline(ScriptedDriver::new());
        pipeline.select_file("scan.png", PNG_HEADER.to_vec()).unwrap();
        let generation = pipeline.lock().generation;
        // A reset lands after the stage finished but before it was applied.
        pipeline.reset();

        let mut advanced = false;
        let result = pipeline.finish_stage(
            generation,
            Ok::<_, ChalanError>(TokenUsage {
                prompt_tokens: 1000,
                completion_tokens: 200,
            }),
            |inner, usage| {
                advanced = true;
                inner.token_usage += usage;
                pipeline.set_status(inner, Status::Structuring);
            },
        );

        assert!(matches!(result, Err(Outcome::Superseded)));
        assert!(!advanced);
        assert_eq!(pipeline.status(), Status::Idle);
        assert!(pipeline.token_usage().is_zero());
        assert!(!pipeline.status().is_busy());
    }
}
