//! Streaming multiplexer.
//!
//! Wraps the upstream fragment stream of the adapter that won routing and
//! turns it into [`StreamEvent`]s for the transport:
//! - every fragment is forwarded as soon as it is polled, in arrival order
//! - a clean end produces `Done` with the aggregated content
//! - an upstream failure or an idle timeout produces one `Error` and ends
//!
//! Dropping the multiplexer drops the upstream, which aborts the provider
//! call. A [`CancellationHandle`] stops it from another task.

use futures::stream::{BoxStream, Stream, StreamExt};
use gateway_core::{CompletionResult, ErrorKind, FragmentStream, GatewayError, StreamEvent};
use gateway_resilience::HealthTracker;
use gateway_telemetry::{ActiveStreamGuard, Metrics};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Cooperative cancellation for a stream
#[derive(Debug, Clone, Default)]
pub struct CancellationHandle {
    inner: Arc<CancelState>,
}

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationHandle {
    /// Create an uncancelled handle
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; idempotent
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::AcqRel) {
            self.inner.notify.notify_waiters();
        }
    }

    /// Whether cancellation was requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Resolve once cancellation is requested
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Everything the multiplexer needs about the winning attempt
pub(crate) struct StreamSource {
    pub provider: String,
    pub model: String,
    pub first: Option<String>,
    pub upstream: FragmentStream,
    pub attempts: usize,
}

/// Observers notified as the stream progresses
#[derive(Default)]
pub(crate) struct StreamObservers {
    pub health: Option<Arc<HealthTracker>>,
    pub metrics: Option<Arc<Metrics>>,
}

/// Uniform event stream over one provider's fragments
pub struct StreamMultiplexer {
    provider: String,
    cancel: CancellationHandle,
    events: BoxStream<'static, StreamEvent>,
}

impl StreamMultiplexer {
    /// Multiplex an upstream fragment stream
    #[must_use]
    pub fn new(
        provider: impl Into<String>,
        model: impl Into<String>,
        upstream: FragmentStream,
        idle_timeout: Duration,
    ) -> Self {
        Self::from_source(
            StreamSource {
                provider: provider.into(),
                model: model.into(),
                first: None,
                upstream,
                attempts: 1,
            },
            idle_timeout,
            StreamObservers::default(),
        )
    }

    pub(crate) fn from_source(
        source: StreamSource,
        idle_timeout: Duration,
        observers: StreamObservers,
    ) -> Self {
        let cancel = CancellationHandle::new();
        let provider = source.provider.clone();
        let guard = observers.metrics.as_ref().map(|m| m.stream_started());
        let events = relay(source, idle_timeout, cancel.clone(), observers, guard);

        Self {
            provider,
            cancel,
            events,
        }
    }

    /// Adapter producing the fragments
    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Handle that stops this stream from elsewhere
    #[must_use]
    pub fn cancellation_handle(&self) -> CancellationHandle {
        self.cancel.clone()
    }
}

impl Stream for StreamMultiplexer {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.cancel.is_cancelled() {
            return Poll::Ready(None);
        }
        self.events.poll_next_unpin(cx)
    }
}

impl std::fmt::Debug for StreamMultiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamMultiplexer")
            .field("provider", &self.provider)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

fn relay(
    source: StreamSource,
    idle_timeout: Duration,
    cancel: CancellationHandle,
    observers: StreamObservers,
    guard: Option<ActiveStreamGuard>,
) -> BoxStream<'static, StreamEvent> {
    let StreamSource {
        provider,
        model,
        first,
        mut upstream,
        attempts,
    } = source;

    let stream = async_stream::stream! {
        let _guard = guard;
        let mut content = String::new();
        let mut fragments = 0usize;

        if let Some(fragment) = first {
            content.push_str(&fragment);
            fragments += 1;
            if let Some(metrics) = &observers.metrics {
                metrics.record_fragment(&provider);
            }
            yield StreamEvent::Fragment(fragment);
        }

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!(provider = %provider, fragments = fragments, "Stream cancelled");
                    return;
                }
                next = tokio::time::timeout(idle_timeout, upstream.next()) => next,
            };

            match next {
                Ok(Some(Ok(fragment))) => {
                    if fragment.is_empty() {
                        continue;
                    }
                    content.push_str(&fragment);
                    fragments += 1;
                    if let Some(metrics) = &observers.metrics {
                        metrics.record_fragment(&provider);
                    }
                    yield StreamEvent::Fragment(fragment);
                }
                Ok(Some(Err(error))) => {
                    let kind = match error.kind() {
                        ErrorKind::Timeout => ErrorKind::Timeout,
                        _ => ErrorKind::StreamInterrupted,
                    };
                    warn!(
                        provider = %provider,
                        fragments = fragments,
                        error_kind = %error.kind(),
                        error = %error,
                        "Stream failed after partial delivery"
                    );
                    if let Some(health) = &observers.health {
                        health.record_failure(&provider);
                    }
                    let message = GatewayError::stream_interrupted(provider.as_str(), error.to_string());
                    yield StreamEvent::Error { kind, message: message.to_string() };
                    return;
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        provider = %provider,
                        idle_ms = idle_timeout.as_millis() as u64,
                        "Stream idle timeout"
                    );
                    if let Some(health) = &observers.health {
                        health.record_failure(&provider);
                    }
                    let message = GatewayError::timeout(provider.as_str(), idle_timeout);
                    yield StreamEvent::Error { kind: ErrorKind::Timeout, message: message.to_string() };
                    return;
                }
            }
        }

        debug!(provider = %provider, fragments = fragments, "Stream completed");
        yield StreamEvent::Done(
            CompletionResult::success(content, provider.as_str(), model.as_str()).with_attempts(attempts),
        );
    };

    stream.boxed()
}
