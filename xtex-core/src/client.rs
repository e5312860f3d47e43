//! The live stream connection to the plugin.
//!
//! One [`StreamClient`] owns one TCP connection and one spawned read
//! task. The task reads the intro header, then loops over image records,
//! decoding the windows the current selection names and skipping (but
//! still consuming) everything else so the stream never desynchronises.
//!
//! Reads block indefinitely; [`StreamClient::stop`] cancels the token and
//! the pending read loses a `select!` race against it within one read,
//! which is the async rendition of closing a socket out from under a
//! blocked reader thread. Every exit path funnels into exactly one
//! terminal [`ClientEvent::Disconnected`].

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::decode::ImageDecoder;
use crate::error::XtexError;
use crate::event::{ClientEvent, Event, EventSender, InstanceId};
use crate::protocol::{INTRO_HEADER_LEN, MAX_PAYLOAD_LEN, frame};
use crate::session::SharedSelection;

// ── StreamClient ─────────────────────────────────────────────────

/// Handle to one live connection attempt.
///
/// Dropping the handle does not stop the task; call [`stop`](Self::stop).
/// The manager relies on that: a superseded instance keeps running just
/// long enough to emit its terminal event, which is then filtered by
/// generation.
pub struct StreamClient {
    instance: InstanceId,
    cancel: CancellationToken,
}

impl StreamClient {
    /// Connect to `address:port` on a fresh task and stream events into
    /// `events`, tagged with a fresh instance id.
    pub fn spawn(
        address: IpAddr,
        port: u16,
        selection: SharedSelection,
        decoder: Arc<dyn ImageDecoder>,
        events: EventSender,
    ) -> Self {
        let instance = InstanceId::next();
        let cancel = CancellationToken::new();
        let task = ClientTask {
            instance,
            addr: SocketAddr::new(address, port),
            selection,
            decoder,
            events,
            cancel: cancel.clone(),
        };
        debug!("stream client {instance} connecting to {}", task.addr);
        tokio::spawn(task.run());
        Self { instance, cancel }
    }

    /// Generation tag carried by every event this instance emits.
    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    /// Signal the read loop to exit. Idempotent, callable from any
    /// task, never blocks; the loop observes it within one pending read.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

// ── Read task ────────────────────────────────────────────────────

struct ClientTask {
    instance: InstanceId,
    addr: SocketAddr,
    selection: SharedSelection,
    decoder: Arc<dyn ImageDecoder>,
    events: EventSender,
    cancel: CancellationToken,
}

impl ClientTask {
    async fn run(self) {
        let result = self.connect_and_stream().await;
        let reason = match &result {
            Ok(()) => None,
            Err(e) => {
                match e.disconnect_reason() {
                    Some(r) => {
                        warn!("stream client {} protocol failure: {r}", self.instance);
                        Some(r)
                    }
                    None => {
                        debug!("stream client {} connection ended: {e}", self.instance);
                        None
                    }
                }
            }
        };
        // Terminal event, exactly once. If the manager is gone the send
        // fails and there is nobody left to care.
        let _ = self
            .events
            .send(Event::Client {
                instance: self.instance,
                kind: ClientEvent::Disconnected { reason },
            })
            .await;
    }

    async fn connect_and_stream(&self) -> Result<(), XtexError> {
        let mut stream = tokio::select! {
            _ = self.cancel.cancelled() => return Ok(()),
            conn = TcpStream::connect(self.addr) => conn.map_err(XtexError::Connect)?,
        };
        self.emit(ClientEvent::Connected).await?;

        // The intro header always precedes the image stream.
        let mut intro = vec![0u8; INTRO_HEADER_LEN];
        self.read_full(&mut stream, &mut intro)
            .await
            .map_err(|_| XtexError::HandshakeRead)?;
        self.emit(ClientEvent::HandshakeReceived(Bytes::from(intro)))
            .await?;

        loop {
            self.next_record(&mut stream).await?;
        }
        // Dropping `stream` on any exit path closes the socket; failures
        // to tear down an already-dead socket are not observable here.
    }

    /// Read one complete image record: marker, length, trailer, payload
    /// (decoded or skipped), padding. Partial records never survive;
    /// any failure aborts the connection.
    async fn next_record(&self, stream: &mut TcpStream) -> Result<(), XtexError> {
        let mut marker = [0u8; frame::FRAME_HEADER_LEN];
        self.read_full(stream, &mut marker).await?;
        let window_id = frame::parse_frame_header(&marker)?;

        let mut len_buf = [0u8; frame::LENGTH_FIELD_LEN];
        self.read_full(stream, &mut len_buf).await?;
        let payload_len = frame::parse_payload_len(&len_buf) as usize;

        let mut trailer = [0u8; frame::TRAILER_LEN];
        self.read_full(stream, &mut trailer).await?;
        frame::check_trailer(&trailer)?;

        if payload_len > MAX_PAYLOAD_LEN {
            return Err(XtexError::PayloadTooLarge {
                size: payload_len,
                max: MAX_PAYLOAD_LEN,
            });
        }

        // Selection is queried fresh per frame; it changes under us.
        if self.selection.get().matches(window_id) {
            let mut payload = vec![0u8; payload_len];
            self.read_full(stream, &mut payload).await?;
            let pixels = self.decoder.decode(&payload)?;
            self.emit(ClientEvent::WindowImage { window_id, pixels }).await?;
        } else {
            self.discard(stream, payload_len).await?;
        }

        self.discard(stream, frame::padding_after(payload_len)).await
    }

    async fn emit(&self, kind: ClientEvent) -> Result<(), XtexError> {
        self.events
            .send(Event::Client {
                instance: self.instance,
                kind,
            })
            .await
            .map_err(XtexError::from)
    }

    /// Fill `buf` completely, or fail. Cancellation surfaces as
    /// [`XtexError::ConnectionLost`], indistinguishable from the peer
    /// going away; both end the loop with no protocol reason.
    async fn read_full(&self, stream: &mut TcpStream, buf: &mut [u8]) -> Result<(), XtexError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(XtexError::ConnectionLost),
            read = stream.read_exact(buf) => match read {
                Ok(_) => Ok(()),
                Err(_) => Err(XtexError::ConnectionLost),
            },
        }
    }

    /// Consume and drop exactly `count` bytes to keep stream alignment.
    async fn discard(&self, stream: &mut TcpStream, mut count: usize) -> Result<(), XtexError> {
        let mut scratch = [0u8; 4096];
        while count > 0 {
            let want = count.min(scratch.len());
            self.read_full(stream, &mut scratch[..want]).await?;
            count -= want;
        }
        Ok(())
    }
}
