// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted AI client for tests.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{AiClient, AiError, AiRequest, AiResponse};

/// Queue of canned responses, popped in order. Popping an empty queue
/// is a test bug and fails loudly via `EmptyResponse`.
#[derive(Clone, Default)]
pub struct FakeAi {
    responses: Arc<Mutex<VecDeque<Result<String, AiError>>>>,
    requests: Arc<Mutex<Vec<AiRequest>>>,
}

impl FakeAi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_text(&self, text: impl Into<String>) {
        self.responses.lock().push_back(Ok(text.into()));
    }

    pub fn push_json(&self, value: serde_json::Value) {
        self.responses.lock().push_back(Ok(value.to_string()));
    }

    pub fn push_overloaded(&self) {
        self.responses
            .lock()
            .push_back(Err(AiError::Overloaded { attempts: 5 }));
    }

    /// Prompts seen so far, for asserting on what was sent.
    pub fn requests(&self) -> Vec<AiRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl AiClient for FakeAi {
    async fn complete(&self, request: AiRequest) -> Result<AiResponse, AiError> {
        self.requests.lock().push(request);
        match self.responses.lock().pop_front() {
            Some(Ok(text)) => Ok(AiResponse {
                text,
                input_tokens: 1_000,
                output_tokens: 200,
            }),
            Some(Err(err)) => Err(err),
            None => Err(AiError::EmptyResponse),
        }
    }
}
