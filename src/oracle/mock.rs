//! Scripted oracle for testing purposes.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{Oracle, OracleError};

type Handler = Box<dyn Fn(&str) -> Result<String, OracleError> + Send + Sync>;

/// An oracle whose answers come from a closure, recording every prompt
pub struct MockOracle {
    handler: Handler,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl MockOracle {
    /// Answer each prompt with the closure's result
    pub fn from_fn<F>(handler: F) -> Self
    where
        F: Fn(&str) -> Result<String, OracleError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Answer every prompt with the same text
    pub fn replying(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::from_fn(move |_| Ok(text.clone()))
    }

    /// Fail every prompt
    pub fn failing() -> Self {
        Self::from_fn(|_| Err(OracleError::Network("connection refused".to_string())))
    }

    /// Number of completed calls
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every prompt received so far
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl std::fmt::Debug for MockOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockOracle")
            .field("calls", &self.calls())
            .finish()
    }
}

#[async_trait]
impl Oracle for MockOracle {
    fn model(&self) -> &str {
        "mock"
    }

    async fn complete(&self, prompt: &str) -> Result<String, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        (self.handler)(prompt)
    }
}
