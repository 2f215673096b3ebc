//! In-process backend that replays queued scripts.
//!
//! Used by tests and offline runs. Every call is recorded with the mode it
//! was made in.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use futures::stream;
use tracing::debug;

use crate::backend::{BackendMode, DeltaStream, ResponseBackend, TextDelta};
use crate::error::BackendError;

/// One scripted streamed response.
#[derive(Clone, Debug)]
pub struct Script {
    /// `Err` here makes `stream` itself fail before yielding anything.
    open: Result<(), BackendError>,
    steps: Vec<Result<TextDelta, BackendError>>,
}

impl Script {
    /// Yield each cumulative text in order, then end cleanly.
    pub fn deltas<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_steps(texts.into_iter().map(|t| Ok(TextDelta::new(t))))
    }

    /// Yield each cumulative text, then fail with `error`.
    pub fn failing_after<I, S>(texts: I, error: BackendError) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut script = Self::deltas(texts);
        script.steps.push(Err(error));
        script
    }

    /// Refuse the request outright.
    pub fn rejected(error: BackendError) -> Self {
        Self {
            open: Err(error),
            steps: Vec::new(),
        }
    }

    pub fn from_steps<I>(steps: I) -> Self
    where
        I: IntoIterator<Item = Result<TextDelta, BackendError>>,
    {
        Self {
            open: Ok(()),
            steps: steps.into_iter().collect(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ScriptedBackend {
    streams: Mutex<VecDeque<Script>>,
    completions: Mutex<VecDeque<Result<String, BackendError>>>,
    calls: Mutex<Vec<(String, BackendMode)>>,
    resets: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the response for the next `stream` call.
    pub fn push_stream(&self, script: Script) {
        lock(&self.streams).push_back(script);
    }

    /// Queue the result of the next `complete` call.
    pub fn push_completion(&self, result: Result<String, BackendError>) {
        lock(&self.completions).push_back(result);
    }

    /// Prompts received so far, with the mode of each call.
    pub fn calls(&self) -> Vec<(String, BackendMode)> {
        lock(&self.calls).clone()
    }

    pub fn reset_count(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }

    fn record(&self, prompt: &str, mode: BackendMode) {
        debug!(prompt, ?mode, "Scripted backend call");
        lock(&self.calls).push((prompt.to_string(), mode));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicking test thread must not hide the script from the others.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn exhausted() -> BackendError {
    BackendError::Unknown("no scripted response".to_string())
}

#[async_trait]
impl ResponseBackend for ScriptedBackend {
    async fn stream(&self, prompt: &str, mode: BackendMode) -> Result<DeltaStream, BackendError> {
        self.record(prompt, mode);
        let script = lock(&self.streams).pop_front().ok_or_else(exhausted)?;
        script.open?;
        Ok(Box::pin(stream::iter(script.steps)))
    }

    async fn complete(&self, prompt: &str, mode: BackendMode) -> Result<String, BackendError> {
        self.record(prompt, mode);
        lock(&self.completions).pop_front().unwrap_or_else(|| Err(exhausted()))
    }

    fn reset(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }
}
