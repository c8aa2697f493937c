use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::LLMError;

/// Per-call cancellation and deadline carrier.
///
/// Every operation on [`crate::LLMProvider`] takes a `Context`. Cancelling it (or
/// letting its deadline pass) makes in-flight completions fail with
/// [`LLMError::Cancelled`] and makes open streams stop without a terminal item.
///
/// Cloning shares the underlying token; [`Context::child`] derives a token that is
/// cancelled together with its parent but can also be cancelled on its own.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use relay_llm::Context;
///
/// let ctx = Context::new().with_timeout(Duration::from_secs(30));
/// assert!(!ctx.is_done());
/// ctx.cancel();
/// assert!(ctx.is_done());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing token, e.g. one shared with an application shutdown signal.
    pub fn with_cancellation(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Sets a deadline relative to now. An earlier deadline already present wins.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Sets an absolute deadline. An earlier deadline already present wins.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// Derives a context whose cancellation does not propagate back to `self`.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns `true` once the context has been cancelled or its deadline passed.
    pub fn is_done(&self) -> bool {
        self.token.is_cancelled() || self.deadline_passed()
    }

    /// Resolves when the context is cancelled or its deadline passes.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// Reports why the context is done, or `None` while it is still live.
    pub fn err(&self) -> Option<LLMError> {
        if self.token.is_cancelled() {
            Some(LLMError::cancelled("context cancelled"))
        } else if self.deadline_passed() {
            Some(LLMError::cancelled("deadline exceeded"))
        } else {
            None
        }
    }

    /// Drives `fut` to completion unless the context finishes first.
    ///
    /// # Errors
    ///
    /// Returns [`LLMError::Cancelled`] when the context is cancelled or its deadline
    /// passes before `fut` resolves; `fut` is dropped in that case.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, LLMError>
    where
        F: Future,
    {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            biased;
            _ = self.done() => Err(self
                .err()
                .unwrap_or_else(|| LLMError::cancelled("context cancelled"))),
            output = fut => Ok(output),
        }
    }

    fn deadline_passed(&self) -> bool {
        self.deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }
}
