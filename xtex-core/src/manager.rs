//! Connection orchestration.
//!
//! [`ConnectionManager`] is the single control loop that decides whether
//! discovery or a stream client runs, consumes their events, applies the
//! failure policy, and forwards what the consumer cares about. All state
//! mutation happens on this loop; the I/O tasks only send messages.
//!
//! Failure policy: every error tears the current connection down and
//! restarts the cycle from scratch: back to discovery, or straight to a
//! manual address when one is set. Nothing is retried in place and there
//! is no retry limit; a visible failure counter is the only escalation.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::client::StreamClient;
use crate::decode::{ImageDecoder, PixelBuffer};
use crate::discovery::{DiscoveryHandle, DiscoverySpawner};
use crate::error::XtexError;
use crate::event::{ClientEvent, DiscoveryEvent, Event, InstanceId};
use crate::protocol::{Handshake, PLUGIN_PORT};
use crate::session::{PeerSession, Selection, SharedSelection};
use crate::state::ConnectionPhase;

/// Pause before retrying after a failed manual-address resolve.
const RESOLVE_RETRY_DELAY: Duration = Duration::from_secs(5);

// ── Commands and notifications ───────────────────────────────────

/// One of the two selection slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    A,
    B,
}

/// Consumer requests into the control loop.
#[derive(Debug)]
pub enum Command {
    /// Start (or restart) the whole networking cycle.
    Start,
    /// Set the manual address; an empty string returns to discovery.
    /// Always performs the full teardown-and-restart sequence.
    SetManualAddress(String),
    /// Point a selection slot at a window index.
    SelectWindow { slot: Slot, index: usize },
    /// Stop everything and stay down until the next `Start`.
    Shutdown,
}

/// What the control loop tells the consumer.
#[derive(Debug)]
pub enum Notification {
    /// Human-readable connection status for display.
    Status(String),
    /// The window-name sequence of a freshly accepted handshake.
    WindowsChanged(Vec<String>),
    /// A selected window's latest frame.
    WindowImage { window_id: u8, pixels: PixelBuffer },
    /// Selection changed (command or re-clamp); persist it.
    SelectionChanged(Selection),
    /// Manual address changed; persist it.
    ManualAddressChanged(String),
}

/// Startup knobs, usually read from the settings store.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub port: u16,
    /// Empty string = automatic (discovery) mode.
    pub manual_address: String,
    pub selection: Selection,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            port: PLUGIN_PORT,
            manual_address: String::new(),
            selection: Selection::default(),
        }
    }
}

// ── ConnectionManager ────────────────────────────────────────────

/// The connection state machine. Construct with [`new`](Self::new),
/// then drive it by awaiting [`run`](Self::run) on its own task and
/// talking to it through the returned channels.
pub struct ConnectionManager {
    phase: ConnectionPhase,
    manual_address: String,
    shutting_down: bool,
    failures: u32,
    /// Set on the first window image of a session, cleared on restart;
    /// the first image is the success signal that ends a failure streak.
    connect_working: bool,
    port: u16,
    selection: SharedSelection,
    session: Option<PeerSession>,
    connect_address: Option<IpAddr>,

    discovery: Arc<dyn DiscoverySpawner>,
    decoder: Arc<dyn ImageDecoder>,
    listener: Option<(InstanceId, DiscoveryHandle)>,
    client: Option<StreamClient>,
    /// Armed delayed-restart timer, if any; superseded by any teardown.
    pending_retry: Option<InstanceId>,

    events_tx: mpsc::Sender<Event>,
    events_rx: mpsc::Receiver<Event>,
    commands_rx: mpsc::Receiver<Command>,
    notify_tx: mpsc::Sender<Notification>,
}

impl ConnectionManager {
    pub fn new(
        config: ManagerConfig,
        discovery: Arc<dyn DiscoverySpawner>,
        decoder: Arc<dyn ImageDecoder>,
    ) -> (Self, mpsc::Sender<Command>, mpsc::Receiver<Notification>) {
        let (events_tx, events_rx) = mpsc::channel(64);
        let (commands_tx, commands_rx) = mpsc::channel(16);
        let (notify_tx, notify_rx) = mpsc::channel(256);
        let manager = Self {
            phase: ConnectionPhase::Idle,
            manual_address: config.manual_address,
            shutting_down: false,
            failures: 0,
            connect_working: false,
            port: config.port,
            selection: SharedSelection::new(config.selection),
            session: None,
            connect_address: None,
            discovery,
            decoder,
            listener: None,
            client: None,
            pending_retry: None,
            events_tx,
            events_rx,
            commands_rx,
            notify_tx,
        };
        (manager, commands_tx, notify_rx)
    }

    /// Control loop. Exits when the command channel closes.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                cmd = self.commands_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => break,
                },
                Some(event) = self.events_rx.recv() => self.handle_event(event).await,
            }
        }
        self.stop_collaborators();
        info!("connection manager exiting");
    }

    // ── Command handling ─────────────────────────────────────────

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start => {
                self.shutting_down = false;
                self.restart_networking().await;
            }
            Command::SetManualAddress(address) => {
                let address = address.trim().to_string();
                info!("manual address set to [{address}]");
                if address != self.manual_address {
                    self.manual_address = address.clone();
                    self.notify(Notification::ManualAddressChanged(address)).await;
                }
                self.restart_networking().await;
            }
            Command::SelectWindow { slot, index } => {
                let mut selection = self.selection.get();
                match slot {
                    Slot::A => selection.slot_a = index,
                    Slot::B => selection.slot_b = index,
                }
                if let Some(session) = &self.session {
                    selection = selection.clamped(session.windows.len());
                }
                self.selection.set(selection);
                self.notify(Notification::SelectionChanged(selection)).await;
            }
            Command::Shutdown => {
                self.shutting_down = true;
                self.restart_networking().await;
            }
        }
    }

    // ── Event handling ───────────────────────────────────────────

    async fn handle_event(&mut self, event: Event) {
        match event {
            Event::Discovery { instance, kind } => {
                if self.listener.as_ref().map(|(id, _)| *id) != Some(instance) {
                    debug!("dropping event from superseded listener {instance}");
                    return;
                }
                self.handle_discovery(kind).await;
            }
            Event::Client { instance, kind } => {
                if self.client.as_ref().map(|c| c.instance()) != Some(instance) {
                    debug!("dropping event from superseded client {instance}");
                    return;
                }
                self.handle_client(kind).await;
            }
            Event::Retry { instance } => {
                if self.pending_retry != Some(instance) {
                    debug!("dropping stale retry timer {instance}");
                    return;
                }
                self.pending_retry = None;
                self.restart_networking().await;
            }
        }
    }

    async fn handle_discovery(&mut self, kind: DiscoveryEvent) {
        match kind {
            DiscoveryEvent::AddressFound(address) => {
                // The beacon listener replies once; close it down and
                // open the TCP connection.
                if let Some((_, handle)) = self.listener.take() {
                    handle.stop();
                }
                self.status("Found BECN multicast", "", Some(address.to_string()))
                    .await;
                self.start_client(address).await;
            }
            DiscoveryEvent::Timeout => {
                self.failures += 1;
                self.status("Timeout waiting for", "BECN multicast", None).await;
            }
            DiscoveryEvent::Failure(message) => {
                warn!("beacon listener failure: {message}");
                self.failures += 1;
                self.status("No network available", "Cannot listen for BECN", None)
                    .await;
            }
        }
    }

    async fn handle_client(&mut self, kind: ClientEvent) {
        match kind {
            ClientEvent::Connected => {
                // Informational; no session exists until the handshake.
                self.phase = ConnectionPhase::AwaitingHandshake;
            }
            ClientEvent::HandshakeReceived(raw) => self.handle_handshake(raw).await,
            ClientEvent::WindowImage { window_id, pixels } => {
                if !self.phase.is_streaming() {
                    // A current client only sends images after its
                    // handshake was accepted; anything else is bogus.
                    debug!("dropping image outside the streaming phase");
                    return;
                }
                if !self.connect_working {
                    // Actual data is coming back; the failure streak is over.
                    self.connect_working = true;
                    self.failures = 0;
                    let aircraft = self
                        .session
                        .as_ref()
                        .map(|s| s.aircraft.clone())
                        .unwrap_or_default();
                    self.status("XTextureExtractor", &aircraft, self.peer_label()).await;
                }
                self.notify(Notification::WindowImage { window_id, pixels }).await;
            }
            ClientEvent::Disconnected { reason } => {
                if let Some(reason) = &reason {
                    warn!("network failed: {reason}");
                }
                self.failures += 1;
                self.client = None;
                self.restart_networking().await;
            }
        }
    }

    async fn handle_handshake(&mut self, raw: Bytes) {
        let handshake = Handshake::parse(&raw).and_then(|h| {
            h.check_version()?;
            Ok(h)
        });
        let handshake = match handshake {
            Ok(h) => h,
            Err(e) => {
                self.networking_fatal(&e.to_string()).await;
                return;
            }
        };
        let Some(address) = self.connect_address else {
            // Client events only arrive while a client exists, and a
            // client only exists with a connect address on file.
            return;
        };

        let session = PeerSession::new(address, self.port, handshake);
        let clamped = self.selection.get().clamped(session.windows.len());
        self.selection.set(clamped);
        self.notify(Notification::SelectionChanged(clamped)).await;
        self.notify(Notification::WindowsChanged(session.window_names())).await;

        info!(
            "handshake accepted: {} [{}], {} windows",
            session.protocol_version,
            session.aircraft,
            session.windows.len()
        );
        self.phase = ConnectionPhase::Streaming;
        self.connect_working = false;
        let aircraft = session.aircraft.clone();
        self.session = Some(session);
        self.status("Connected to", &aircraft, self.peer_label()).await;
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Tear down both collaborators and start the right one over,
    /// honoring manual-override precedence and the shutdown flag.
    async fn restart_networking(&mut self) {
        self.stop_collaborators();
        self.session = None;
        self.connect_address = None;
        self.connect_working = false;

        if self.shutting_down {
            debug!("not restarting, shutdown in progress");
            self.phase = ConnectionPhase::Disconnected;
            debug_assert!(self.phase.is_stopped());
            self.status("Closed down", "", None).await;
            return;
        }

        if self.manual_address.is_empty() {
            self.phase = ConnectionPhase::Discovering;
            let instance = InstanceId::next();
            let handle = self.discovery.spawn(instance, self.events_tx.clone());
            self.listener = Some((instance, handle));
            self.status("Waiting for X-Plane", "BECN broadcast", None).await;
        } else {
            match resolve(&self.manual_address, self.port).await {
                Ok(address) => {
                    self.status("Manual TCP connect", "Connection in progress", None)
                        .await;
                    self.start_client(address).await;
                }
                Err(e) => {
                    // Transient DNS trouble must not end the retry cycle;
                    // rest in Disconnected with a wakeup timer armed.
                    warn!("cannot resolve [{}]: {e}", self.manual_address);
                    self.failures += 1;
                    self.phase = ConnectionPhase::Disconnected;
                    self.status("Cannot resolve", &self.manual_address.clone(), None)
                        .await;
                    self.schedule_retry();
                }
            }
        }
    }

    async fn start_client(&mut self, address: IpAddr) {
        self.connect_address = Some(address);
        self.phase = ConnectionPhase::Connecting;
        let client = StreamClient::spawn(
            address,
            self.port,
            self.selection.clone(),
            Arc::clone(&self.decoder),
            self.events_tx.clone(),
        );
        debug!("started stream client {} for {address}:{}", client.instance(), self.port);
        self.client = Some(client);
        debug_assert!(self.phase.has_client());
    }

    async fn networking_fatal(&mut self, reason: &str) {
        warn!("network fatal error: {reason}");
        self.failures += 1;
        self.status("Network error", reason, None).await;
        self.restart_networking().await;
    }

    /// Arm a delayed restart. The timer task itself is never cancelled;
    /// disarming makes its event stale, same as a superseded client.
    fn schedule_retry(&mut self) {
        let instance = InstanceId::next();
        self.pending_retry = Some(instance);
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(RESOLVE_RETRY_DELAY).await;
            let _ = events.send(Event::Retry { instance }).await;
        });
    }

    fn stop_collaborators(&mut self) {
        // Both tolerate being stopped when already stopped or absent.
        if let Some(client) = self.client.take() {
            client.stop();
        }
        if let Some((_, handle)) = self.listener.take() {
            handle.stop();
        }
        self.pending_retry = None;
    }

    // ── Reporting ────────────────────────────────────────────────

    fn peer_label(&self) -> Option<String> {
        self.connect_address.map(|a| format!("{a}:{}", self.port))
    }

    async fn status(&mut self, line1: &str, line2: &str, dest: Option<String>) {
        let mut out = format!("{line1}. ");
        if !line2.is_empty() {
            out.push_str(&format!("{line2}. "));
        }
        if let Some(dest) = dest {
            out.push_str(&format!("{dest}."));
        }
        if self.failures > 0 {
            out.push_str(&format!("\nError #{}", self.failures));
        }
        debug!("status: {}", out.replace('\n', " "));
        self.notify(Notification::Status(out)).await;
    }

    async fn notify(&mut self, notification: Notification) {
        // A consumer that went away takes the command channel with it;
        // the run loop exits on its own shortly after.
        let _ = self.notify_tx.send(notification).await;
    }
}

/// Resolve a manual address: literal IP first, DNS second.
async fn resolve(host: &str, port: u16) -> Result<IpAddr, XtexError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }
    let mut addresses = tokio::net::lookup_host((host, port)).await?;
    addresses
        .next()
        .map(|sa| sa.ip())
        .ok_or_else(|| XtexError::DiscoveryFailure(format!("no addresses for [{host}]")))
}

// ── Tests ────────────────────────────────────────────────────────
