//! Scripted driver for testing.
//!
//! Replies are queued up front and handed out in order. Every request is
//! recorded so tests can check what would have been sent.

use std::{collections::VecDeque, sync::Mutex};

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::{error::ChalanError, llm_client::ApiKey, prelude::*};

use super::{Driver, GenerateRequest, GenerateResponse, LlmOpts, TokenUsage};

/// A queued reply.
enum Reply {
    /// Return this response.
    Ok(GenerateResponse),

    /// Fail with an upstream error carrying this message.
    Fail(String),

    /// Wait until the gate is opened (or dropped), then return this response.
    Gated(oneshot::Receiver<()>, GenerateResponse),
}

/// Scripted driver for testing.
#[derive(Default)]
pub struct ScriptedDriver {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl std::fmt::Debug for ScriptedDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedDriver").finish_non_exhaustive()
    }
}

impl ScriptedDriver {
    /// Create a driver with no queued replies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a text reply with some token usage.
    pub fn reply_text(self, text: &str) -> Self {
        self.push(Reply::Ok(text_response(text)))
    }

    /// Queue a reply with no text at all.
    pub fn reply_empty(self) -> Self {
        self.push(Reply::Ok(GenerateResponse::default()))
    }

    /// Queue an upstream failure.
    pub fn reply_error(self, message: &str) -> Self {
        self.push(Reply::Fail(message.to_owned()))
    }

    /// Queue a text reply that is held back until the returned sender fires.
    pub fn reply_text_gated(self, text: &str) -> (Self, oneshot::Sender<()>) {
        let (tx, rx) = oneshot::channel();
        (self.push(Reply::Gated(rx, text_response(text))), tx)
    }

    fn push(self, reply: Reply) -> Self {
        self.replies
            .lock()
            .expect("lock poisoned")
            .push_back(reply);
        self
    }

    /// All the requests we've seen so far.
    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().expect("lock poisoned").clone()
    }
}

fn text_response(text: &str) -> GenerateResponse {
    GenerateResponse {
        text: Some(text.to_owned()),
        token_usage: Some(TokenUsage {
            prompt_tokens: 1000,
            completion_tokens: 200,
        }),
    }
}

#[async_trait]
impl Driver for ScriptedDriver {
    async fn generate_content(
        &self,
        _api_key: &ApiKey,
        request: &GenerateRequest,
        _llm_opts: &LlmOpts,
    ) -> Result<GenerateResponse, ChalanError> {
        self.requests
            .lock()
            .expect("lock poisoned")
            .push(request.clone());
        let reply = self
            .replies
            .lock()
            .expect("lock poisoned")
            .pop_front()
            .expect("no scripted reply left");
        match reply {
            Reply::Ok(response) => Ok(response),
            Reply::Fail(message) => Err(ChalanError::Upstream {
                status: 500,
                message,
            }),
            Reply::Gated(gate, response) => {
                let _ = gate.await;
                Ok(response)
            }
        }
    }
}
