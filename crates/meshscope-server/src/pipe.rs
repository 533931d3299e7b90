//! Bidirectional byte tunnels between a control's process and a UI
//! websocket, e.g. for an attached terminal.
//!
//! A [`Pipe`] has two connected ends. The control handler that opens it
//! with [`PipeRegistry::create`] keeps one and returns the pipe ID in its
//! [`ControlResponse`](crate::ControlResponse); the other is parked in the
//! registry until a UI attaches to it at `/api/pipe/{id}`. Pipes nobody
//! attaches to are expired by [`PipeRegistry::expire_unattached`].

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::{Duration, Instant};

use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

/// Bytes buffered in each direction before writers wait.
const PIPE_BUFFER: usize = 64 * 1024;
const READ_CHUNK: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum PipeError {
    #[error("pipe {0} not found")]
    NotFound(String),
    #[error("pipe {0} already has a client attached")]
    AlreadyAttached(String),
    #[error("pipe I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("websocket: {0}")]
    Transport(String),
}

type OnClose = Box<dyn FnOnce() + Send>;

pub struct Pipe {
    id: String,
    token: CancellationToken,
    /// Held for reading by every running copy loop.
    active: RwLock<()>,
    on_close: StdMutex<Option<OnClose>>,
}

impl Pipe {
    /// A new pipe and its two ends.
    pub fn open() -> (Arc<Pipe>, DuplexStream, DuplexStream) {
        let (port, starboard) = tokio::io::duplex(PIPE_BUFFER);
        let pipe = Arc::new(Pipe {
            id: uuid::Uuid::new_v4().to_string(),
            token: CancellationToken::new(),
            active: RwLock::new(()),
            on_close: StdMutex::new(None),
        });
        (pipe, port, starboard)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Set the hook run by the first [`close`](Pipe::close).
    pub fn on_close(&self, f: impl FnOnce() + Send + 'static) {
        let mut slot = self.on_close.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(Box::new(f));
    }

    /// Stop every copy loop on this pipe and wait for them to return. Only
    /// the first call runs the on-close hook, after the loops are done.
    pub async fn close(&self) {
        self.token.cancel();
        drop(self.active.write().await);
        let hook = self
            .on_close
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(hook) = hook {
            log::debug!("pipe {} closed", self.id);
            hook();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Copy between `end` and a websocket until either direction fails or
    /// ends, or the pipe is closed. Returns immediately on a closed pipe.
    pub async fn copy_to_websocket<S, R, E>(&self, end: DuplexStream, mut sink: S, mut incoming: R) -> Result<(), PipeError>
    where
        S: Sink<Vec<u8>> + Unpin,
        S::Error: Display,
        R: Stream<Item = Result<Vec<u8>, E>> + Unpin,
        E: Display,
    {
        if self.is_closed() {
            return Ok(());
        }
        let _active = self.active.read().await;
        let (mut reader, mut writer) = tokio::io::split(end);

        let from_ui = async {
            while let Some(msg) = incoming.next().await {
                let buf = msg.map_err(|e| PipeError::Transport(e.to_string()))?;
                writer.write_all(&buf).await?;
            }
            Ok::<(), PipeError>(())
        };

        let to_ui = async {
            let mut buf = vec![0u8; READ_CHUNK];
            loop {
                let n = reader.read(&mut buf).await?;
                if n == 0 {
                    return Ok::<(), PipeError>(());
                }
                sink.send(buf[..n].to_vec())
                    .await
                    .map_err(|e| PipeError::Transport(e.to_string()))?;
            }
        };

        tokio::select! {
            r = from_ui => r,
            r = to_ui => r,
            _ = self.token.cancelled() => Ok(()),
        }
    }
}

struct Parked {
    pipe: Arc<Pipe>,
    ui_end: Option<DuplexStream>,
    opened: Instant,
}

/// Open pipes by ID.
#[derive(Default)]
pub struct PipeRegistry {
    pipes: Mutex<HashMap<String, Parked>>,
}

impl PipeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a pipe. The returned end belongs to the control's process; the
    /// other end waits for [`attach`](PipeRegistry::attach).
    pub async fn create(&self) -> (Arc<Pipe>, DuplexStream) {
        let (pipe, probe_end, ui_end) = Pipe::open();
        self.pipes.lock().await.insert(
            pipe.id().to_string(),
            Parked {
                pipe: Arc::clone(&pipe),
                ui_end: Some(ui_end),
                opened: Instant::now(),
            },
        );
        log::debug!("pipe {} opened", pipe.id());
        (pipe, probe_end)
    }

    /// Take the UI end of a pipe. Each pipe can be attached once.
    pub async fn attach(&self, id: &str) -> Result<(Arc<Pipe>, DuplexStream), PipeError> {
        let mut pipes = self.pipes.lock().await;
        let parked = pipes.get_mut(id).ok_or_else(|| PipeError::NotFound(id.to_string()))?;
        let end = parked
            .ui_end
            .take()
            .ok_or_else(|| PipeError::AlreadyAttached(id.to_string()))?;
        Ok((Arc::clone(&parked.pipe), end))
    }

    /// Close and forget a pipe. Returns whether it existed.
    pub async fn close(&self, id: &str) -> bool {
        let parked = self.pipes.lock().await.remove(id);
        match parked {
            Some(parked) => {
                parked.pipe.close().await;
                true
            }
            None => false,
        }
    }

    /// Close every pipe opened at least `max_age` ago that no UI has
    /// attached to. Returns how many were closed.
    pub async fn expire_unattached(&self, max_age: Duration) -> usize {
        let expired: Vec<Arc<Pipe>> = {
            let mut pipes = self.pipes.lock().await;
            let ids: Vec<String> = pipes
                .iter()
                .filter(|(_, p)| p.ui_end.is_some() && p.opened.elapsed() >= max_age)
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter()
                .filter_map(|id| pipes.remove(id))
                .map(|p| p.pipe)
                .collect()
        };
        for pipe in &expired {
            log::info!("pipe {} expired without a client", pipe.id());
            pipe.close().await;
        }
        expired.len()
    }

    pub async fn len(&self) -> usize {
        self.pipes.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pipes.lock().await.is_empty()
    }
}
