//! WebSocket endpoint relaying live device video.
//!
//! Each connection runs one relay session. Frames are sent as text messages
//! of the form `200|data:image/jpeg;base64,...`; a failure is reported once
//! as `<status>|<reason>` before the socket is closed.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::relay::{ClientChannel, PushOutcome, RelayMessage, RelaySession, TransportError};
use crate::state::AppState;

/// Outbound messages queued per client. Frames that do not fit are dropped.
const OUTBOUND_SLOTS: usize = 1;

/// How long closing waits for queued messages to reach the client.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Stream live video from a device.
///
/// Example usage from JavaScript:
/// ```javascript
/// const ws = new WebSocket('ws://localhost:8000/api/play/<device-id>');
/// ws.onmessage = (event) => {
///     const [status, payload] = event.data.split('|', 2);
///     if (status === '200') img.src = payload;
///     else console.error(status, payload);
/// };
/// ```
#[utoipa::path(
    get,
    path = "/api/play/{device_id}",
    tag = "play",
    params(("device_id" = String, Path, description = "Device ID (UUID)")),
    responses(
        (status = 101, description = "WebSocket connection upgraded")
    )
)]
pub async fn play_handler(
    ws: WebSocketUpgrade,
    Path(device_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    info!("Play client connecting for device {}", device_id);
    ws.on_failed_upgrade(|e| warn!("Play WebSocket upgrade failed: {}", e))
        .on_upgrade(move |socket| relay_socket(socket, device_id, state))
}

async fn relay_socket(socket: WebSocket, device_id: String, state: AppState) {
    let cancel = state.shutdown_token().child_token();
    let (sink, stream) = socket.split();
    let mut channel = WsChannel::spawn(sink, stream, cancel.clone());

    let session = RelaySession::new(state.relay_deps(), state.relay_config().clone(), cancel);
    let report = session.run(&device_id, &mut channel).await;

    if report.exit.is_clean() {
        info!(
            "Play session for device {} ended ({:?}): {} frames sent, {} dropped",
            report.device_id, report.exit, report.frames_sent, report.frames_dropped
        );
    } else {
        warn!(
            "Play session for device {} failed ({:?}) after {} frames",
            report.device_id, report.exit, report.frames_sent
        );
    }
}

/// Adapts the two halves of a WebSocket to the relay's client channel.
///
/// A writer task owns the sink and drains a one-slot queue; a reader task
/// watches for the peer leaving and cancels the session when it does.
struct WsChannel {
    outbound: Option<mpsc::Sender<Message>>,
    peer_gone: CancellationToken,
    writer: Option<JoinHandle<()>>,
    reader: JoinHandle<()>,
}

impl WsChannel {
    fn spawn<S, R, E>(sink: S, stream: R, session: CancellationToken) -> Self
    where
        S: Sink<Message> + Unpin + Send + 'static,
        S::Error: Display,
        R: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
        E: Display + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(OUTBOUND_SLOTS);
        let peer_gone = CancellationToken::new();

        let writer = tokio::spawn(write_loop(sink, rx, peer_gone.clone()));
        let reader = tokio::spawn(read_loop(stream, peer_gone.clone(), session));

        Self {
            outbound: Some(tx),
            peer_gone,
            writer: Some(writer),
            reader,
        }
    }
}

#[async_trait]
impl ClientChannel for WsChannel {
    fn is_open(&self) -> bool {
        self.outbound.is_some() && !self.peer_gone.is_cancelled()
    }

    async fn send_status(&mut self, message: RelayMessage) -> Result<(), TransportError> {
        let tx = self
            .outbound
            .as_ref()
            .ok_or_else(|| TransportError("channel closed".to_string()))?;
        tx.send(Message::Text(message.to_string().into()))
            .await
            .map_err(|_| TransportError("writer stopped".to_string()))
    }

    fn push_frame(&mut self, message: RelayMessage) -> Result<PushOutcome, TransportError> {
        if self.peer_gone.is_cancelled() {
            return Err(TransportError("peer disconnected".to_string()));
        }
        let tx = self
            .outbound
            .as_ref()
            .ok_or_else(|| TransportError("channel closed".to_string()))?;
        match tx.try_send(Message::Text(message.to_string().into())) {
            Ok(()) => Ok(PushOutcome::Delivered),
            Err(TrySendError::Full(_)) => Ok(PushOutcome::Dropped),
            Err(TrySendError::Closed(_)) => Err(TransportError("writer stopped".to_string())),
        }
    }

    async fn close(&mut self) {
        // Dropping the sender lets the writer flush what is queued and close
        self.outbound.take();
        if let Some(mut writer) = self.writer.take() {
            match tokio::time::timeout(CLOSE_GRACE, &mut writer).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("Play writer task ended abnormally: {}", e),
                Err(_) => {
                    debug!("Play client did not drain in time, dropping connection");
                    writer.abort();
                }
            }
        }
        self.reader.abort();
    }
}

impl Drop for WsChannel {
    fn drop(&mut self) {
        self.reader.abort();
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
    }
}

async fn write_loop<S>(
    mut sink: S,
    mut rx: mpsc::Receiver<Message>,
    peer_gone: CancellationToken,
) where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    while let Some(message) = rx.recv().await {
        if let Err(e) = sink.send(message).await {
            debug!("Failed to send to play client: {}", e);
            peer_gone.cancel();
            return;
        }
    }

    if !peer_gone.is_cancelled() {
        if let Err(e) = sink.send(Message::Close(None)).await {
            trace!("Failed to send close frame: {}", e);
        }
    }
    if let Err(e) = sink.close().await {
        trace!("Failed to close play socket: {}", e);
    }
}

async fn read_loop<R, E>(
    mut stream: R,
    peer_gone: CancellationToken,
    session: CancellationToken,
) where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    loop {
        match stream.next().await {
            Some(Ok(Message::Close(_))) | None => {
                debug!("Play client disconnected");
                break;
            }
            Some(Ok(_)) => {
                trace!("Ignoring message from play client");
            }
            Some(Err(e)) => {
                debug!("Play socket error: {}", e);
                break;
            }
        }
    }
    peer_gone.cancel();
    session.cancel();
}
