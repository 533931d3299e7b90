//! The per-connection topology streaming loop.
//!
//! Each connection renders its view, prunes it, and sends the [`Diff`]
//! against the last snapshot it sent. The first message is the diff against
//! the empty graph. It then waits for the next timer tick or store merge and
//! repeats until the client goes away, a write fails or overruns its
//! deadline, or the server shuts down.

use std::fmt::Display;
use std::time::Duration;

use futures::{Sink, SinkExt, Stream, StreamExt};
use meshscope_core::{Diff, RenderableNodes, Store, View};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    /// Re-render at least this often even without new reports.
    pub interval: Duration,
    /// A single message taking longer than this to send ends the stream.
    pub write_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            write_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("failed to encode diff: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to send diff: {0}")]
    Send(String),
    #[error("send did not complete within {0:?}")]
    Deadline(Duration),
}

/// Stream diffs of `view` to `sink` until the connection ends.
///
/// `incoming` is only polled to notice the client going away: the stream
/// ends when it yields `None`, and every item is discarded. A clean end
/// (client gone, store dropped or `shutdown` cancelled) returns `Ok`.
pub async fn stream_topology<S, R>(
    mut sink: S,
    mut incoming: R,
    store: &Store,
    view: View,
    config: &StreamConfig,
    shutdown: CancellationToken,
) -> Result<(), StreamError>
where
    S: Sink<String> + Unpin,
    S::Error: Display,
    R: Stream + Unpin,
{
    let mut subscription = store.subscribe();
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    let mut previous = RenderableNodes::new();
    let mut sent = 0u64;
    loop {
        let next = view.render(&store.report()).prune();
        let diff = Diff::between(&previous, &next);
        previous = next;

        let text = serde_json::to_string(&diff)?;
        match tokio::time::timeout(config.write_timeout, sink.send(text)).await {
            Ok(Ok(())) => sent += 1,
            Ok(Err(e)) => return Err(StreamError::Send(e.to_string())),
            Err(_) => return Err(StreamError::Deadline(config.write_timeout)),
        }
        log::trace!("{view}: sent diff #{sent} with {} changes", diff.len());

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
            alive = subscription.changed() => {
                if !alive {
                    break;
                }
            }
            msg = incoming.next() => {
                if msg.is_none() {
                    break;
                }
            }
        }
    }

    log::debug!("{view}: stream closed after {sent} messages");
    Ok(())
}
