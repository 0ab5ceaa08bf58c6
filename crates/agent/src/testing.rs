use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{CompletionRequest, LlmClient, LlmError};

/// Replays canned completions in order and records every request.
#[derive(Default)]
pub(crate) struct ScriptedLlm {
    responses: Mutex<VecDeque<Result<String, String>>>,
    pub(crate) requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlm {
    pub(crate) fn replying(responses: &[&str]) -> Self {
        Self {
            responses: Mutex::new(responses.iter().map(|r| Ok(r.to_string())).collect()),
            requests: Mutex::default(),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            responses: Mutex::new(VecDeque::from([Err("upstream unavailable".to_string())])),
            requests: Mutex::default(),
        }
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.lock().expect("requests lock").len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        self.requests.lock().expect("requests lock").push(request);
        match self.responses.lock().expect("responses lock").pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(body)) => Err(LlmError::HttpStatus { status: 503, body }),
            None => Err(LlmError::EmptyCompletion),
        }
    }
}
