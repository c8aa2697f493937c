//! Channel-backed streaming shared by every adapter.
//!
//! An adapter's `stream` call spawns one producer task that opens the vendor stream
//! and pulls fragments from a [`FragmentSource`]. Items travel to the caller's
//! [`ResultStream`] over a single-slot channel, so the producer never runs more than
//! one item ahead of the consumer. Every await in the producer races the call
//! context, and the producer exits (dropping the vendor body) as soon as it fires.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use async_trait::async_trait;
use futures_core::Stream;
use futures_core::stream::FusedStream;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::context::Context;
use crate::error::LLMError;
use crate::types::{ChatCompletion, StreamResult};

/// Lifecycle of a [`ResultStream`] as observed by the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Nothing has been received yet.
    NotStarted,
    /// At least one fragment has been received.
    Streaming,
    /// `Done` was received.
    Completed,
    /// An `Error` was received.
    Failed,
    /// The context finished before a terminal item arrived.
    Cancelled,
}

impl StreamState {
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Lazily produced, finite sequence of [`StreamResult`] values.
///
/// The sequence ends after `Done`, after `Error`, or silently when the call context is
/// cancelled or its deadline passes. Dropping the stream cancels the producer.
pub struct ResultStream {
    rx: mpsc::Receiver<StreamResult>,
    ctx: Context,
    state: StreamState,
}

impl ResultStream {
    fn new(rx: mpsc::Receiver<StreamResult>, ctx: Context) -> Self {
        Self {
            rx,
            ctx,
            state: StreamState::NotStarted,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Stops the stream; the producer exits at its next await point.
    pub fn cancel(&self) {
        self.ctx.cancel();
    }

    /// Drains the stream and folds every fragment into one completion.
    ///
    /// Text is concatenated in arrival order; token counts and finish reason come from
    /// the last fragment that carried them.
    ///
    /// # Errors
    ///
    /// Returns the streamed error on `Error`, or [`LLMError::Cancelled`] when the stream
    /// ends without `Done`.
    pub async fn collect_completion(mut self) -> Result<ChatCompletion, LLMError> {
        let mut merged = ChatCompletion::default();
        while let Some(item) = self.next().await {
            match item {
                StreamResult::Completion(fragment) => {
                    merged.text.push_str(&fragment.text);
                    merged.input_tokens = merged.input_tokens.max(fragment.input_tokens);
                    merged.output_tokens = merged.output_tokens.max(fragment.output_tokens);
                    if fragment.finish_reason.is_some() {
                        merged.finish_reason = fragment.finish_reason;
                    }
                }
                StreamResult::Error(err) => return Err(err),
                StreamResult::Done => return Ok(merged),
            }
        }
        Err(self
            .ctx
            .err()
            .unwrap_or_else(|| LLMError::cancelled("stream ended without completion")))
    }
}

impl Stream for ResultStream {
    type Item = StreamResult;

    fn poll_next(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.state.is_finished() {
            return Poll::Ready(None);
        }
        if this.ctx.is_done() {
            this.state = StreamState::Cancelled;
            this.rx.close();
            return Poll::Ready(None);
        }

        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(item)) => {
                this.state = match &item {
                    StreamResult::Completion(_) => StreamState::Streaming,
                    StreamResult::Done => StreamState::Completed,
                    StreamResult::Error(_) => StreamState::Failed,
                };
                Poll::Ready(Some(item))
            }
            Poll::Ready(None) => {
                this.state = StreamState::Cancelled;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl FusedStream for ResultStream {
    fn is_terminated(&self) -> bool {
        self.state.is_finished()
    }
}

impl Drop for ResultStream {
    fn drop(&mut self) {
        self.ctx.cancel();
    }
}

/// Pull side of an opened vendor stream.
#[async_trait]
pub(crate) trait FragmentSource: Send {
    /// Returns the next fragment, `Ok(None)` once the backend signals completion.
    async fn next_fragment(&mut self) -> Result<Option<ChatCompletion>, LLMError>;
}

/// Spawns the producer task and returns the consumer half.
///
/// `open` performs the HTTP request and yields the fragment source; it runs inside the
/// producer so that open-time failures are delivered as [`StreamResult::Error`].
pub(crate) fn spawn_stream<F, S>(ctx: &Context, provider: &'static str, open: F) -> ResultStream
where
    F: Future<Output = Result<S, LLMError>> + Send + 'static,
    S: FragmentSource + 'static,
{
    let ctx = ctx.child();
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(produce(ctx.clone(), provider, open, tx));
    ResultStream::new(rx, ctx)
}

async fn produce<F, S>(ctx: Context, provider: &'static str, open: F, tx: mpsc::Sender<StreamResult>)
where
    F: Future<Output = Result<S, LLMError>> + Send,
    S: FragmentSource,
{
    let opened = tokio::select! {
        biased;
        _ = ctx.done() => {
            debug!(provider, "stream cancelled before it was opened");
            return;
        }
        opened = open => opened,
    };

    let mut source = match opened {
        Ok(source) => source,
        Err(err) => {
            warn!(provider, error = %err, "failed to open stream");
            deliver(&ctx, &tx, StreamResult::Error(err)).await;
            return;
        }
    };

    let mut fragments = 0usize;
    loop {
        let next = tokio::select! {
            biased;
            _ = ctx.done() => {
                debug!(provider, fragments, "stream cancelled");
                return;
            }
            next = source.next_fragment() => next,
        };

        let (item, terminal) = match next {
            Ok(Some(fragment)) => {
                fragments += 1;
                (StreamResult::Completion(fragment), false)
            }
            Ok(None) => {
                debug!(provider, fragments, "stream completed");
                (StreamResult::Done, true)
            }
            Err(err) => {
                warn!(provider, fragments, error = %err, "stream failed");
                (StreamResult::Error(err), true)
            }
        };

        if !deliver(&ctx, &tx, item).await || terminal {
            return;
        }
    }
}

/// Hands one item to the consumer; `false` once the consumer is gone or the context is done.
async fn deliver(ctx: &Context, tx: &mpsc::Sender<StreamResult>, item: StreamResult) -> bool {
    tokio::select! {
        biased;
        _ = ctx.done() => false,
        sent = tx.send(item) => sent.is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use super::*;

    struct Scripted {
        items: VecDeque<Result<Option<ChatCompletion>, LLMError>>,
        hang_when_empty: bool,
        dropped: Arc<AtomicBool>,
    }

    impl Scripted {
        fn new(items: Vec<Result<Option<ChatCompletion>, LLMError>>) -> (Self, Arc<AtomicBool>) {
            let dropped = Arc::new(AtomicBool::new(false));
            (
                Self {
                    items: items.into(),
                    hang_when_empty: false,
                    dropped: dropped.clone(),
                },
                dropped,
            )
        }
    }

    impl Drop for Scripted {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl FragmentSource for Scripted {
        async fn next_fragment(&mut self) -> Result<Option<ChatCompletion>, LLMError> {
            match self.items.pop_front() {
                Some(item) => item,
                None if self.hang_when_empty => std::future::pending().await,
                None => Ok(None),
            }
        }
    }

    fn text(value: &str) -> Result<Option<ChatCompletion>, LLMError> {
        Ok(Some(ChatCompletion {
            text: value.to_string(),
            ..ChatCompletion::default()
        }))
    }

    #[tokio::test]
    async fn fragments_arrive_in_order_then_done() {
        let (source, _) = Scripted::new(vec![text("c1"), text("c2"), text("c3"), Ok(None)]);
        let mut stream = spawn_stream(&Context::new(), "test", async move { Ok(source) });
        assert_eq!(stream.state(), StreamState::NotStarted);

        let mut texts = Vec::new();
        while let Some(item) = stream.next().await {
            match item {
                StreamResult::Completion(c) => {
                    assert_eq!(stream.state(), StreamState::Streaming);
                    texts.push(c.text);
                }
                StreamResult::Done => texts.push("<done>".to_string()),
                StreamResult::Error(err) => panic!("unexpected error: {err}"),
            }
        }
        assert_eq!(texts, vec!["c1", "c2", "c3", "<done>"]);
        assert_eq!(stream.state(), StreamState::Completed);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn nothing_follows_an_error() {
        let (source, _) = Scripted::new(vec![
            text("partial"),
            Err(LLMError::transport("connection reset")),
            text("never"),
            Ok(None),
        ]);
        let stream = spawn_stream(&Context::new(), "test", async move { Ok(source) });
        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 2);
        assert!(matches!(items[1], StreamResult::Error(LLMError::Transport { .. })));
    }

    #[tokio::test]
    async fn open_failure_is_delivered_as_data() {
        let mut stream = spawn_stream::<_, Scripted>(&Context::new(), "test", async {
            Err(LLMError::Auth {
                message: "bad key".to_string(),
            })
        });
        assert!(matches!(
            stream.next().await,
            Some(StreamResult::Error(LLMError::Auth { .. }))
        ));
        assert!(stream.next().await.is_none());
        assert_eq!(stream.state(), StreamState::Failed);
    }

    #[tokio::test]
    async fn cancellation_ends_silently_and_releases_source() {
        let (mut source, dropped) = Scripted::new(vec![text("c1")]);
        source.hang_when_empty = true;
        let ctx = Context::new();
        let mut stream = spawn_stream(&ctx, "test", async move { Ok(source) });

        assert!(matches!(stream.next().await, Some(StreamResult::Completion(_))));
        ctx.cancel();
        assert!(stream.next().await.is_none());
        assert_eq!(stream.state(), StreamState::Cancelled);

        for _ in 0..50 {
            if dropped.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(dropped.load(Ordering::SeqCst), "producer kept the source alive");
    }

    #[tokio::test]
    async fn dropping_the_stream_stops_the_producer() {
        let (mut source, dropped) = Scripted::new(Vec::new());
        source.hang_when_empty = true;
        let ctx = Context::new();
        let stream = spawn_stream(&ctx, "test", async move { Ok(source) });
        drop(stream);

        for _ in 0..50 {
            if dropped.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(dropped.load(Ordering::SeqCst));
        assert!(!ctx.is_done(), "parent context must stay live");
    }

    #[tokio::test]
    async fn collect_completion_merges_fragments() {
        let (source, _) = Scripted::new(vec![
            Ok(Some(ChatCompletion {
                text: "Hel".to_string(),
                input_tokens: 5,
                output_tokens: 1,
                finish_reason: None,
            })),
            Ok(Some(ChatCompletion {
                text: "lo".to_string(),
                input_tokens: 5,
                output_tokens: 2,
                finish_reason: Some(crate::types::FinishReason::Stop),
            })),
            Ok(None),
        ]);
        let stream = spawn_stream(&Context::new(), "test", async move { Ok(source) });
        let merged = stream.collect_completion().await.expect("completed");
        assert_eq!(merged.text, "Hello");
        assert_eq!((merged.input_tokens, merged.output_tokens), (5, 2));
        assert_eq!(merged.finish_reason, Some(crate::types::FinishReason::Stop));
    }
}
