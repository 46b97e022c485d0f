//! WebSocket link for coplay sessions.
//!
//! Each [`WebSocketLink`] owns one outbound WebSocket connection driven by a
//! worker thread. The link never reconnects on its own: the session state
//! machine replaces it with a fresh link on every attempt.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use coplay_transport::link::{
    LinkError, LinkEvent, SessionConnector, SessionLink, CLOSE_ABNORMAL, CLOSE_NORMAL,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc as tokio_mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Close code reported when the peer closes without a status code.
const CLOSE_NO_STATUS: u16 = 1005;

#[derive(Debug, Clone)]
pub struct WebSocketLinkConfig {
    pub connect_timeout: Duration,
    pub outbound_queue_capacity: usize,
}

impl Default for WebSocketLinkConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            outbound_queue_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WebSocketLinkMetrics {
    pub outbound_queued: u64,
    pub outbound_send_ok: u64,
    pub outbound_send_err: u64,
    pub inbound_received: u64,
}

#[derive(Debug, Default)]
struct WebSocketLinkMetricsInner {
    outbound_queued: AtomicU64,
    outbound_send_ok: AtomicU64,
    outbound_send_err: AtomicU64,
    inbound_received: AtomicU64,
}

enum Outbound {
    Text(String),
    Close(u16),
}

pub struct WebSocketLink {
    outbound_tx: tokio_mpsc::Sender<Outbound>,
    inbound_rx: mpsc::Receiver<LinkEvent>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    worker: Option<JoinHandle<()>>,
    open: Arc<AtomicBool>,
    closing: bool,
    metrics: Arc<WebSocketLinkMetricsInner>,
}

impl WebSocketLink {
    /// Spawns the worker and starts connecting to `url`.
    ///
    /// Connect failures are reported through `poll_event` as an `Error`
    /// followed by an abnormal `Closed`.
    pub fn connect(url: &str, config: &WebSocketLinkConfig) -> Result<Self, LinkError> {
        let (outbound_tx, outbound_rx) =
            tokio_mpsc::channel::<Outbound>(config.outbound_queue_capacity.max(1));
        let (inbound_tx, inbound_rx) = mpsc::channel::<LinkEvent>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let open = Arc::new(AtomicBool::new(false));
        let metrics = Arc::new(WebSocketLinkMetricsInner::default());

        let worker_open = Arc::clone(&open);
        let worker_metrics = Arc::clone(&metrics);
        let worker_url = url.to_string();
        let connect_timeout = config.connect_timeout;
        let worker = thread::Builder::new()
            .name("coplay-ws-link".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(err) => {
                        let _ = inbound_tx.send(LinkEvent::Error(err.to_string()));
                        let _ = inbound_tx.send(LinkEvent::Closed {
                            code: CLOSE_ABNORMAL,
                            reason: "runtime unavailable".to_string(),
                        });
                        return;
                    }
                };
                runtime.block_on(run_link_worker(
                    worker_url,
                    connect_timeout,
                    worker_open,
                    worker_metrics,
                    outbound_rx,
                    inbound_tx,
                    shutdown_rx,
                ));
            })
            .map_err(|err| LinkError::Connect(err.to_string()))?;

        Ok(Self {
            outbound_tx,
            inbound_rx,
            shutdown_tx: Some(shutdown_tx),
            worker: Some(worker),
            open,
            closing: false,
            metrics,
        })
    }

    /// Whether the handshake completed and the socket has not closed yet.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }

    pub fn metrics_snapshot(&self) -> WebSocketLinkMetrics {
        WebSocketLinkMetrics {
            outbound_queued: self.metrics.outbound_queued.load(Ordering::Relaxed),
            outbound_send_ok: self.metrics.outbound_send_ok.load(Ordering::Relaxed),
            outbound_send_err: self.metrics.outbound_send_err.load(Ordering::Relaxed),
            inbound_received: self.metrics.inbound_received.load(Ordering::Relaxed),
        }
    }
}

impl Drop for WebSocketLink {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl SessionLink for WebSocketLink {
    fn send_text(&mut self, frame: &str) -> Result<(), LinkError> {
        if self.closing {
            return Err(LinkError::Closed);
        }
        self.outbound_tx
            .try_send(Outbound::Text(frame.to_string()))
            .map_err(|err| match err {
                tokio_mpsc::error::TrySendError::Full(_) => LinkError::QueueFull,
                tokio_mpsc::error::TrySendError::Closed(_) => LinkError::Closed,
            })
            .map(|_| {
                self.metrics.outbound_queued.fetch_add(1, Ordering::Relaxed);
            })
    }

    fn poll_event(&mut self) -> Option<LinkEvent> {
        self.inbound_rx.try_recv().ok()
    }

    fn close(&mut self, code: u16) {
        if self.closing {
            return;
        }
        self.closing = true;
        if self.outbound_tx.try_send(Outbound::Close(code)).is_err() {
            debug!("websocket link: close requested after worker exit");
        }
    }
}

/// Opens [`WebSocketLink`]s with a shared configuration.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    pub config: WebSocketLinkConfig,
}

impl WebSocketConnector {
    pub fn new(config: WebSocketLinkConfig) -> Self {
        Self { config }
    }
}

impl SessionConnector for WebSocketConnector {
    type Link = WebSocketLink;

    fn open(&mut self, url: &str) -> Result<Self::Link, LinkError> {
        WebSocketLink::connect(url, &self.config)
    }
}

fn close_message(code: u16) -> Message {
    Message::Close(Some(CloseFrame {
        code: CloseCode::from(code),
        reason: "".into(),
    }))
}

fn report_abnormal(inbound_tx: &mpsc::Sender<LinkEvent>, open: &AtomicBool, message: String) {
    open.store(false, Ordering::Relaxed);
    let _ = inbound_tx.send(LinkEvent::Error(message));
    let _ = inbound_tx.send(LinkEvent::Closed {
        code: CLOSE_ABNORMAL,
        reason: String::new(),
    });
}

async fn run_link_worker(
    url: String,
    connect_timeout: Duration,
    open: Arc<AtomicBool>,
    metrics: Arc<WebSocketLinkMetricsInner>,
    mut outbound_rx: tokio_mpsc::Receiver<Outbound>,
    inbound_tx: mpsc::Sender<LinkEvent>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let stream = tokio::select! {
        _ = &mut shutdown_rx => return,
        connect_result = tokio::time::timeout(connect_timeout, connect_async(url.as_str())) => {
            match connect_result {
                Ok(Ok((stream, _))) => stream,
                Ok(Err(err)) => {
                    warn!("websocket link: connect failed: {err}");
                    report_abnormal(&inbound_tx, &open, err.to_string());
                    return;
                }
                Err(_) => {
                    warn!("websocket link: connect timed out after {connect_timeout:?}");
                    report_abnormal(&inbound_tx, &open, "connect timed out".to_string());
                    return;
                }
            }
        }
    };

    info!("websocket link: open");
    open.store(true, Ordering::Relaxed);
    if inbound_tx.send(LinkEvent::Opened).is_err() {
        return;
    }
    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                while let Ok(pending) = outbound_rx.try_recv() {
                    if let Outbound::Close(code) = pending {
                        let _ = write.send(close_message(code)).await;
                    }
                }
                break;
            }
            maybe_out = outbound_rx.recv() => {
                match maybe_out {
                    Some(Outbound::Text(text)) => {
                        if let Err(err) = write.send(Message::Text(text)).await {
                            metrics.outbound_send_err.fetch_add(1, Ordering::Relaxed);
                            report_abnormal(&inbound_tx, &open, err.to_string());
                            break;
                        }
                        metrics.outbound_send_ok.fetch_add(1, Ordering::Relaxed);
                    }
                    Some(Outbound::Close(code)) => {
                        let _ = write.send(close_message(code)).await;
                        open.store(false, Ordering::Relaxed);
                        let _ = inbound_tx.send(LinkEvent::Closed {
                            code,
                            reason: "closed by client".to_string(),
                        });
                        break;
                    }
                    None => {
                        let _ = write.send(close_message(CLOSE_NORMAL)).await;
                        open.store(false, Ordering::Relaxed);
                        break;
                    }
                }
            }
            maybe_in = read.next() => {
                match maybe_in {
                    Some(Ok(Message::Text(text))) => {
                        metrics.inbound_received.fetch_add(1, Ordering::Relaxed);
                        let _ = inbound_tx.send(LinkEvent::Frame(text));
                    }
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => {
                            metrics.inbound_received.fetch_add(1, Ordering::Relaxed);
                            let _ = inbound_tx.send(LinkEvent::Frame(text));
                        }
                        Err(_) => debug!("websocket link: dropping non-utf8 binary frame"),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        open.store(false, Ordering::Relaxed);
                        let (code, reason) = match frame {
                            Some(frame) => (u16::from(frame.code), frame.reason.into_owned()),
                            None => (CLOSE_NO_STATUS, String::new()),
                        };
                        info!("websocket link: closed by server (code {code})");
                        let _ = inbound_tx.send(LinkEvent::Closed { code, reason });
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        report_abnormal(&inbound_tx, &open, err.to_string());
                        break;
                    }
                    None => {
                        report_abnormal(&inbound_tx, &open, "stream ended".to_string());
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{WebSocketConnector, WebSocketLinkConfig};
    use coplay_transport::link::{LinkEvent, SessionConnector, SessionLink, CLOSE_ABNORMAL};
    use std::time::{Duration, Instant};

    #[test]
    fn unreachable_server_reports_abnormal_close() {
        let mut connector = WebSocketConnector::new(WebSocketLinkConfig {
            connect_timeout: Duration::from_millis(500),
            outbound_queue_capacity: 8,
        });
        let mut link = connector
            .open("ws://127.0.0.1:1/room")
            .expect("worker should spawn");

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut events = Vec::new();
        while Instant::now() < deadline {
            match link.poll_event() {
                Some(event @ LinkEvent::Closed { .. }) => {
                    events.push(event);
                    break;
                }
                Some(event) => events.push(event),
                None => std::thread::sleep(Duration::from_millis(10)),
            }
        }
        assert!(matches!(events.first(), Some(LinkEvent::Error(_))));
        assert!(matches!(
            events.last(),
            Some(LinkEvent::Closed { code, .. }) if *code == CLOSE_ABNORMAL
        ));
        assert!(!link.is_open());
    }
}
