use std::fmt::Display;

use serde::Serialize;

/// Per-item failure captured by a bulk operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure<I> {
    pub item: I,
    pub error: String,
}

/// Outcome of a bulk operation that runs item by item without rolling back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchResult<T, I> {
    pub succeeded: Vec<T>,
    pub failed: Vec<BatchFailure<I>>,
}

impl<T, I> Default for BatchResult<T, I> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<T, I> BatchResult<T, I> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self, value: T) {
        self.succeeded.push(value);
    }

    pub fn record_failure(&mut self, item: I, error: impl Display) {
        self.failed.push(BatchFailure {
            item,
            error: error.to_string(),
        });
    }

    pub fn record(&mut self, item: I, result: Result<T, impl Display>) {
        match result {
            Ok(value) => self.record_success(value),
            Err(err) => self.record_failure(item, err),
        }
    }

    pub fn failure_count(&self) -> usize {
        self.failed.len()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }
}
