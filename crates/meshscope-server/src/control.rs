//! Routing control invocations to the probe that owns the node.
//!
//! A probe registers one [`ControlHandler`] under its probe ID. In-process
//! handlers are plain closures; probes connected over a websocket are served
//! by a [`ProbeConnection`] that forwards requests as JSON messages and
//! matches the replies by sequence number.

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::{FutureExt, Sink, SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, mpsc, oneshot};

/// UI → app → probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRequest {
    pub probe_id: String,
    pub node_id: String,
    pub control: String,
}

/// Probe → app → UI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    /// ID of a pipe opened by the control, to attach to at `/api/pipe/{id}`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pipe: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub raw_tty: bool,
}

impl ControlResponse {
    pub fn value(value: serde_json::Value) -> Self {
        Self {
            value: Some(value),
            ..Default::default()
        }
    }

    pub fn error(err: impl Display) -> Self {
        Self {
            error: err.to_string(),
            ..Default::default()
        }
    }

    pub fn pipe(id: impl Into<String>, raw_tty: bool) -> Self {
        Self {
            pipe: id.into(),
            raw_tty,
            ..Default::default()
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("no handler registered for probe {0}")]
    NoHandler(String),
    #[error("probe {0} disconnected")]
    Disconnected(String),
    #[error("{0}")]
    Handler(String),
}

/// Executes controls for one probe.
pub trait ControlHandler: Send + Sync {
    fn handle(&self, req: ControlRequest) -> BoxFuture<'_, Result<ControlResponse, ControlError>>;
}

impl<F> ControlHandler for F
where
    F: Fn(ControlRequest) -> ControlResponse + Send + Sync,
{
    fn handle(&self, req: ControlRequest) -> BoxFuture<'_, Result<ControlResponse, ControlError>> {
        let response = self(req);
        async move { Ok(response) }.boxed()
    }
}

/// Probe ID → handler.
#[derive(Default)]
pub struct ControlRouter {
    handlers: RwLock<HashMap<String, Arc<dyn ControlHandler>>>,
}

impl ControlRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `probe_id`, replacing any previous one.
    pub async fn register(&self, probe_id: impl Into<String>, handler: Arc<dyn ControlHandler>) {
        let probe_id = probe_id.into();
        log::info!("control handler registered for probe {probe_id}");
        self.handlers.write().await.insert(probe_id, handler);
    }

    /// Remove `handler` for `probe_id`. A newer handler registered under
    /// the same probe ID since is left in place.
    pub async fn deregister(&self, probe_id: &str, handler: &Arc<dyn ControlHandler>) {
        let mut handlers = self.handlers.write().await;
        match handlers.get(probe_id) {
            Some(current) if Arc::ptr_eq(current, handler) => {
                handlers.remove(probe_id);
                log::info!("control handler removed for probe {probe_id}");
            }
            Some(_) => log::debug!("probe {probe_id} re-registered, keeping the newer handler"),
            None => {}
        }
    }

    pub async fn probes(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.handlers.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn handle(&self, req: ControlRequest) -> Result<ControlResponse, ControlError> {
        let handler = self.handlers.read().await.get(&req.probe_id).cloned();
        let Some(handler) = handler else {
            return Err(ControlError::NoHandler(req.probe_id));
        };
        log::debug!("control {} on {} via probe {}", req.control, req.node_id, req.probe_id);
        handler.handle(req).await
    }
}

// ---------------------------------------------------------------------------
// Probes connected over a websocket
// ---------------------------------------------------------------------------

/// Messages exchanged with a probe over its control connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProbeMessage {
    Request { id: u64, request: ControlRequest },
    Response { id: u64, response: ControlResponse },
}

type Pending = (ControlRequest, oneshot::Sender<ControlResponse>);

/// Handler half of a probe connection; register it with the router.
pub struct RemoteHandler {
    probe_id: String,
    requests: mpsc::Sender<Pending>,
}

impl ControlHandler for RemoteHandler {
    fn handle(&self, req: ControlRequest) -> BoxFuture<'_, Result<ControlResponse, ControlError>> {
        async move {
            let (tx, rx) = oneshot::channel();
            self.requests
                .send((req, tx))
                .await
                .map_err(|_| ControlError::Disconnected(self.probe_id.clone()))?;
            rx.await
                .map_err(|_| ControlError::Disconnected(self.probe_id.clone()))
        }
        .boxed()
    }
}

/// Connection half of a probe connection: drives the websocket.
pub struct ProbeConnection {
    probe_id: String,
    requests: mpsc::Receiver<Pending>,
}

impl ProbeConnection {
    pub fn new(probe_id: impl Into<String>) -> (RemoteHandler, ProbeConnection) {
        let probe_id = probe_id.into();
        let (tx, rx) = mpsc::channel(16);
        (
            RemoteHandler {
                probe_id: probe_id.clone(),
                requests: tx,
            },
            ProbeConnection {
                probe_id,
                requests: rx,
            },
        )
    }

    /// Forward requests to the probe and route its responses back until the
    /// probe disconnects or every handler is dropped. Requests still waiting
    /// for a response fail with [`ControlError::Disconnected`].
    pub async fn run<S, R>(mut self, mut sink: S, mut incoming: R)
    where
        S: Sink<String> + Unpin,
        S::Error: Display,
        R: Stream<Item = String> + Unpin,
    {
        let mut pending: HashMap<u64, oneshot::Sender<ControlResponse>> = HashMap::new();
        let mut next_id = 0u64;

        loop {
            tokio::select! {
                req = self.requests.recv() => {
                    let Some((request, reply)) = req else { break };
                    next_id += 1;
                    let msg = ProbeMessage::Request { id: next_id, request };
                    let text = match serde_json::to_string(&msg) {
                        Ok(text) => text,
                        Err(e) => {
                            let _ = reply.send(ControlResponse::error(e));
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(text).await {
                        log::warn!("probe {}: control send failed: {e}", self.probe_id);
                        break;
                    }
                    pending.insert(next_id, reply);
                }
                msg = incoming.next() => {
                    let Some(text) = msg else { break };
                    match serde_json::from_str::<ProbeMessage>(&text) {
                        Ok(ProbeMessage::Response { id, response }) => match pending.remove(&id) {
                            Some(reply) => {
                                let _ = reply.send(response);
                            }
                            None => log::debug!("probe {}: response to unknown request {id}", self.probe_id),
                        },
                        Ok(ProbeMessage::Request { .. }) => {
                            log::debug!("probe {}: ignoring request sent to the app", self.probe_id);
                        }
                        Err(e) => log::warn!("probe {}: malformed control message: {e}", self.probe_id),
                    }
                }
            }
        }

        log::info!(
            "probe {}: control connection closed, {} requests abandoned",
            self.probe_id,
            pending.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc as fmpsc;

    fn request(probe: &str) -> ControlRequest {
        ControlRequest {
            probe_id: probe.to_string(),
            node_id: "abc;<container>".to_string(),
            control: "docker_stop_container".to_string(),
        }
    }

    #[tokio::test]
    async fn routes_to_the_registered_probe() {
        let router = ControlRouter::new();
        router
            .register(
                "probe-1",
                Arc::new(|req: ControlRequest| ControlResponse::value(serde_json::json!(req.node_id))),
            )
            .await;
        let resp = router.handle(request("probe-1")).await.unwrap();
        assert_eq!(resp.value, Some(serde_json::json!("abc;<container>")));
        assert_eq!(router.probes().await, vec!["probe-1".to_string()]);
    }

    #[tokio::test]
    async fn unknown_probe_is_an_error() {
        let router = ControlRouter::new();
        let err = router.handle(request("ghost")).await.unwrap_err();
        assert!(matches!(err, ControlError::NoHandler(p) if p == "ghost"));

        let handler: Arc<dyn ControlHandler> = Arc::new(|_: ControlRequest| ControlResponse::default());
        router.register("ghost", Arc::clone(&handler)).await;
        router.deregister("ghost", &handler).await;
        assert!(router.handle(request("ghost")).await.is_err());
    }

    #[tokio::test]
    async fn stale_deregistration_keeps_the_newer_handler() {
        let router = ControlRouter::new();
        let old: Arc<dyn ControlHandler> =
            Arc::new(|_: ControlRequest| ControlResponse::value(serde_json::json!("old")));
        let new: Arc<dyn ControlHandler> =
            Arc::new(|_: ControlRequest| ControlResponse::value(serde_json::json!("new")));

        router.register("p1", Arc::clone(&old)).await;
        router.register("p1", Arc::clone(&new)).await;
        router.deregister("p1", &old).await;

        let resp = router.handle(request("p1")).await.unwrap();
        assert_eq!(resp.value, Some(serde_json::json!("new")));

        router.deregister("p1", &new).await;
        assert!(router.probes().await.is_empty());
    }

    #[test]
    fn responses_omit_empty_fields() {
        let json = serde_json::to_value(ControlResponse::pipe("p1", true)).unwrap();
        assert_eq!(json, serde_json::json!({"pipe": "p1", "raw_tty": true}));
        let json = serde_json::to_value(ControlResponse::error("boom")).unwrap();
        assert_eq!(json, serde_json::json!({"error": "boom"}));
    }

    #[tokio::test]
    async fn probe_connection_matches_responses_to_requests() {
        let (handler, conn) = ProbeConnection::new("probe-1");
        let (to_probe, mut probe_rx) = fmpsc::unbounded::<String>();
        let (probe_tx, from_probe) = fmpsc::unbounded::<String>();
        let driver = tokio::spawn(conn.run(to_probe, from_probe));

        // The fake probe echoes the control name back as the value.
        let probe = tokio::spawn(async move {
            while let Some(text) = probe_rx.next().await {
                let ProbeMessage::Request { id, request } = serde_json::from_str(&text).unwrap() else {
                    panic!("expected a request");
                };
                let response = ControlResponse::value(serde_json::json!(request.control));
                let reply = serde_json::to_string(&ProbeMessage::Response { id, response }).unwrap();
                if probe_tx.unbounded_send(reply).is_err() {
                    break;
                }
            }
        });

        let resp = handler.handle(request("probe-1")).await.unwrap();
        assert_eq!(resp.value, Some(serde_json::json!("docker_stop_container")));

        drop(handler);
        driver.await.unwrap();
        probe.await.unwrap();
    }

    #[tokio::test]
    async fn requests_fail_once_the_probe_is_gone() {
        let (handler, conn) = ProbeConnection::new("probe-1");
        let (to_probe, _probe_rx) = fmpsc::unbounded::<String>();
        let (probe_tx, from_probe) = fmpsc::unbounded::<String>();
        drop(probe_tx);
        conn.run(to_probe, from_probe).await;
        let err = handler.handle(request("probe-1")).await.unwrap_err();
        assert!(matches!(err, ControlError::Disconnected(_)));
    }
}
