//! Scripted inference backend for tests and dry runs.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::time::Duration;

use super::{Generation, InferenceBackend, InferenceError};

/// What a [`MockBackend`] does for one request.
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    Success {
        tokens: u64,
        compute_time_secs: Option<f64>,
        text: String,
    },
    Timeout,
    ConnectionRefused,
    ApiError { status: u16, body: String },
}

impl MockReply {
    /// `tokens` generated in `secs` seconds.
    pub fn rate(tokens: u64, secs: f64) -> Self {
        Self::Success {
            tokens,
            compute_time_secs: Some(secs),
            text: "The text contains 56 characters per sentence.".to_string(),
        }
    }
}

/// Mock backend: replies are chosen per context size, with an optional
/// queue of one-off replies consumed first.
pub struct MockBackend {
    script: Box<dyn Fn(u32) -> MockReply>,
    queue: RefCell<VecDeque<MockReply>>,
    calls: RefCell<Vec<u32>>,
    last_timeout: Cell<Option<Duration>>,
}

impl MockBackend {
    pub fn from_fn(script: impl Fn(u32) -> MockReply + 'static) -> Self {
        Self {
            script: Box::new(script),
            queue: RefCell::new(VecDeque::new()),
            calls: RefCell::new(Vec::new()),
            last_timeout: Cell::new(None),
        }
    }

    /// Same reply for every request.
    pub fn constant(reply: MockReply) -> Self {
        Self::from_fn(move |_| reply.clone())
    }

    /// Replies served (in order) before falling back to the script.
    pub fn with_queue(self, replies: Vec<MockReply>) -> Self {
        self.queue.borrow_mut().extend(replies);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }

    /// Context size of every request, in call order.
    pub fn requested_sizes(&self) -> Vec<u32> {
        self.calls.borrow().clone()
    }

    pub fn last_context_size(&self) -> Option<u32> {
        self.calls.borrow().last().copied()
    }

    pub fn last_timeout(&self) -> Option<Duration> {
        self.last_timeout.get()
    }
}

impl InferenceBackend for MockBackend {
    fn generate(
        &self,
        _model: &str,
        prompt: &str,
        context_size: u32,
        timeout: Duration,
    ) -> Result<Generation, InferenceError> {
        self.calls.borrow_mut().push(context_size);
        self.last_timeout.set(Some(timeout));

        let queued = self.queue.borrow_mut().pop_front();
        let reply = queued.unwrap_or_else(|| (self.script)(context_size));

        match reply {
            MockReply::Success {
                tokens,
                compute_time_secs,
                text,
            } => Ok(Generation {
                text,
                tokens_generated: tokens,
                prompt_tokens: Some(prompt.split_whitespace().count() as u64),
                compute_time_secs,
            }),
            MockReply::Timeout => Err(InferenceError::Timeout(timeout.as_secs())),
            MockReply::ConnectionRefused => Err(InferenceError::Connection(
                "http://localhost:11434".to_string(),
            )),
            MockReply::ApiError { status, body } => Err(InferenceError::Api { status, body }),
        }
    }
}
