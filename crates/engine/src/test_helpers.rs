//! Shared test helpers for orchestrator tests.

use infrared_core::error::ProviderError;
use infrared_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use infrared_core::Phase;
use std::sync::Mutex;

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue and
/// records the request. Panics if more calls are made than responses
/// provided.
pub struct SequentialMockProvider {
    responses: Vec<Result<ProviderResponse, ProviderError>>,
    requests: Mutex<Vec<ProviderRequest>>,
    fail_always: bool,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: responses.into_iter().map(Ok).collect(),
            requests: Mutex::new(Vec::new()),
            fail_always: false,
        }
    }

    /// A provider whose every call fails at the transport.
    pub fn failing() -> Self {
        Self {
            responses: Vec::new(),
            requests: Mutex::new(Vec::new()),
            fail_always: true,
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn phases(&self) -> Vec<Phase> {
        self.requests.lock().unwrap().iter().map(|r| r.phase).collect()
    }
}

#[async_trait::async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let index = requests.len();
        requests.push(request);

        if self.fail_always {
            return Err(ProviderError::Network("connection refused".into()));
        }
        if index >= self.responses.len() {
            panic!(
                "SequentialMockProvider: no more responses (call #{}, have {})",
                index,
                self.responses.len()
            );
        }
        self.responses[index].clone()
    }
}

/// A scripted model reply.
pub fn json_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        content: text.to_string(),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}
