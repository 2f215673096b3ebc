//! Two-state backend adapter: `Full` until the backend refuses an augmented
//! request, then `Degraded` for the rest of the session.

use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::backend::{BackendMode, ResponseBackend, StreamUpdate};
use crate::error::BackendError;
use crate::prompts::BASIC_MODE_SUFFIX;

/// Wraps a [`ResponseBackend`] with the degrade-and-retry-once policy.
#[derive(Debug)]
pub struct BackendAdapter<B> {
    backend: B,
    mode: BackendMode,
}

impl<B: ResponseBackend> BackendAdapter<B> {
    pub fn new(backend: B) -> Self {
        Self::with_mode(backend, BackendMode::Full)
    }

    /// Start in `mode`. A `Degraded` start never retries.
    pub fn with_mode(backend: B, mode: BackendMode) -> Self {
        Self { backend, mode }
    }

    pub fn mode(&self) -> BackendMode {
        self.mode
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Drop augmentation and reset backend history.
    ///
    /// Returns false if already degraded.
    pub fn degrade(&mut self) -> bool {
        if self.mode == BackendMode::Degraded {
            return false;
        }
        self.mode = BackendMode::Degraded;
        self.backend.reset();
        warn!("Backend degraded to basic mode; web search disabled");
        true
    }

    /// Stream a response to `prompt`, calling `on_update` for every
    /// cumulative delta. Returns the final text.
    ///
    /// A `Permission` failure while in `Full` mode degrades the adapter and
    /// retries once with the basic-mode prompt. The retry is announced with
    /// [`StreamUpdate::Restarted`] before its first delta.
    pub async fn stream_response<F>(
        &mut self,
        prompt: &str,
        mut on_update: F,
    ) -> Result<String, BackendError>
    where
        F: FnMut(StreamUpdate) + Send,
    {
        let first = self.drain(prompt, &mut on_update).await;
        match first {
            Err(e) if e.is_permission() && self.mode.allows_search() => {
                self.degrade();
                info!(error = %e, "Retrying in basic mode");
                on_update(StreamUpdate::Restarted);
                let retry = format!("{prompt}{BASIC_MODE_SUFFIX}");
                self.drain(&retry, &mut on_update).await
            }
            other => other,
        }
    }

    /// Non-streamed request with the same degrade-once policy.
    pub async fn complete(&mut self, prompt: &str) -> Result<String, BackendError> {
        let first = self.backend.complete(prompt, self.mode).await;
        match first {
            Err(e) if e.is_permission() && self.mode.allows_search() => {
                self.degrade();
                info!(error = %e, "Retrying in basic mode");
                let retry = format!("{prompt}{BASIC_MODE_SUFFIX}");
                self.backend.complete(&retry, self.mode).await
            }
            other => other,
        }
    }

    async fn drain<F>(&self, prompt: &str, on_update: &mut F) -> Result<String, BackendError>
    where
        F: FnMut(StreamUpdate) + Send,
    {
        let mut stream = self.backend.stream(prompt, self.mode).await?;
        let mut full_text = String::new();
        let mut deltas = 0usize;

        while let Some(item) = stream.next().await {
            let delta = item?;
            deltas += 1;
            full_text.clone_from(&delta.text);
            on_update(StreamUpdate::Delta(delta));
        }

        debug!(mode = ?self.mode, deltas, chars = full_text.len(), "Stream drained");
        Ok(full_text)
    }
}
