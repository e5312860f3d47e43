//! Integration tests: stream client lifecycle and full manager cycle
//! over real TCP connections on localhost.

use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use xtex_core::protocol::{INTRO_HEADER_LEN, frame};
use xtex_core::{
    ClientEvent, Command, ConnectionManager, DiscoveryEvent, DiscoveryHandle, DiscoverySpawner,
    Event, EventSender, ImageDecoder, InstanceId, ManagerConfig, Notification, PixelBuffer,
    PngDecoder, Selection, SharedSelection, StreamClient, XtexError,
};

const LOCALHOST: IpAddr = IpAddr::V4(std::net::Ipv4Addr::LOCALHOST);

// ── Helpers ──────────────────────────────────────────────────────

fn intro_bytes(text: &str) -> Vec<u8> {
    let mut buf = vec![0u8; INTRO_HEADER_LEN];
    buf[..text.len()].copy_from_slice(text.as_bytes());
    buf
}

/// One complete image record: marker, LE length, trailer, payload,
/// NUL padding to the next 1024-byte payload boundary.
fn record(window_id: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&[b'!', b'_', b'_', b'_', b'_', b'_', window_id, b'_']);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(b"____");
    out.extend_from_slice(payload);
    out.extend_from_slice(&vec![0u8; frame::padding_after(payload.len())]);
    out
}

fn tiny_png() -> Vec<u8> {
    use image::{ImageBuffer, Rgba};
    let img: ImageBuffer<Rgba<u8>, _> = ImageBuffer::from_pixel(2, 2, Rgba([1, 2, 3, 255]));
    let mut png = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .unwrap();
    png
}

/// Decoder stub that records every payload it is asked to decode and
/// fails on the literal payload `BAD`.
#[derive(Default)]
struct RecordingDecoder {
    seen: Mutex<Vec<Vec<u8>>>,
}

impl ImageDecoder for RecordingDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<PixelBuffer, XtexError> {
        self.seen.lock().unwrap().push(bytes.to_vec());
        if bytes == b"BAD" {
            return Err(XtexError::PayloadDecode("stub rejected payload".into()));
        }
        Ok(PixelBuffer { width: 1, height: 1, data: vec![0; 4] })
    }
}

const FOUR_WINDOWS: &str = "XTEv3 build\n737-800\n2048 2048\n\
    CAP 0 0 1 1\nFMC 0 0 1 1\nEICAS 0 0 1 1\nCDU 0 0 1 1\n__EOF__\n";

async fn next_event(rx: &mut mpsc::Receiver<Event>) -> ClientEvent {
    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed");
    match event {
        Event::Client { kind, .. } => kind,
        other => panic!("unexpected event {other:?}"),
    }
}

fn spawn_client(
    port: u16,
    selection: Selection,
    decoder: Arc<dyn ImageDecoder>,
) -> (StreamClient, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(64);
    let client = StreamClient::spawn(LOCALHOST, port, SharedSelection::new(selection), decoder, tx);
    (client, rx)
}

// ── Stream client lifecycle ──────────────────────────────────────

#[tokio::test]
async fn selected_windows_decode_others_skip() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream.write_all(&intro_bytes(FOUR_WINDOWS)).await.unwrap();
        for id in 0u8..4 {
            stream.write_all(&record(id, &[id; 10])).await.unwrap();
        }
        // Closing the socket ends the read loop with no reason.
    });

    let decoder = Arc::new(RecordingDecoder::default());
    let (_client, mut rx) =
        spawn_client(port, Selection { slot_a: 0, slot_b: 2 }, decoder.clone());

    assert!(matches!(next_event(&mut rx).await, ClientEvent::Connected));
    match next_event(&mut rx).await {
        ClientEvent::HandshakeReceived(raw) => {
            assert_eq!(raw.len(), INTRO_HEADER_LEN);
            assert!(raw.starts_with(b"XTEv3"));
        }
        other => panic!("expected handshake, got {other:?}"),
    }

    match next_event(&mut rx).await {
        ClientEvent::WindowImage { window_id, .. } => assert_eq!(window_id, 0),
        other => panic!("expected image, got {other:?}"),
    }
    match next_event(&mut rx).await {
        ClientEvent::WindowImage { window_id, .. } => assert_eq!(window_id, 2),
        other => panic!("expected image, got {other:?}"),
    }
    match next_event(&mut rx).await {
        ClientEvent::Disconnected { reason } => assert!(reason.is_none()),
        other => panic!("expected disconnect, got {other:?}"),
    }

    // Windows 1 and 3 were consumed without a decode attempt.
    let seen = decoder.seen.lock().unwrap();
    assert_eq!(*seen, vec![vec![0u8; 10], vec![2u8; 10]]);
}

#[tokio::test]
async fn boundary_sized_payload_keeps_stream_aligned() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream.write_all(&intro_bytes(FOUR_WINDOWS)).await.unwrap();
        // An unselected record whose payload is exactly one block: the
        // full extra 1024 bytes of padding must still be consumed for
        // the next record to parse.
        stream.write_all(&record(3, &[9u8; 1024])).await.unwrap();
        stream.write_all(&record(0, &[7u8; 5])).await.unwrap();
    });

    let decoder = Arc::new(RecordingDecoder::default());
    let (_client, mut rx) =
        spawn_client(port, Selection { slot_a: 0, slot_b: 1 }, decoder.clone());

    assert!(matches!(next_event(&mut rx).await, ClientEvent::Connected));
    assert!(matches!(next_event(&mut rx).await, ClientEvent::HandshakeReceived(_)));
    match next_event(&mut rx).await {
        ClientEvent::WindowImage { window_id, .. } => assert_eq!(window_id, 0),
        other => panic!("expected image, got {other:?}"),
    }
    assert!(matches!(
        next_event(&mut rx).await,
        ClientEvent::Disconnected { reason: None }
    ));
    assert_eq!(*decoder.seen.lock().unwrap(), vec![vec![7u8; 5]]);
}

#[tokio::test]
async fn corrupted_marker_disconnects_with_reason() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream.write_all(&intro_bytes(FOUR_WINDOWS)).await.unwrap();
        stream.write_all(b"?_____\x00_").await.unwrap();
        // Keep the socket open; the client must bail on its own.
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let (_client, mut rx) =
        spawn_client(port, Selection::default(), Arc::new(RecordingDecoder::default()));

    assert!(matches!(next_event(&mut rx).await, ClientEvent::Connected));
    assert!(matches!(next_event(&mut rx).await, ClientEvent::HandshakeReceived(_)));
    match next_event(&mut rx).await {
        ClientEvent::Disconnected { reason } => {
            let reason = reason.expect("protocol violation must carry a reason");
            assert!(reason.contains("image header invalid"));
            assert!(reason.contains('?'));
        }
        other => panic!("expected disconnect, got {other:?}"),
    }
}

#[tokio::test]
async fn decode_failure_is_fatal() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream.write_all(&intro_bytes(FOUR_WINDOWS)).await.unwrap();
        stream.write_all(&record(0, b"BAD")).await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let (_client, mut rx) =
        spawn_client(port, Selection::default(), Arc::new(RecordingDecoder::default()));

    assert!(matches!(next_event(&mut rx).await, ClientEvent::Connected));
    assert!(matches!(next_event(&mut rx).await, ClientEvent::HandshakeReceived(_)));
    match next_event(&mut rx).await {
        ClientEvent::Disconnected { reason } => {
            assert!(reason.unwrap().contains("decode failure"));
        }
        other => panic!("expected disconnect, got {other:?}"),
    }
}

#[tokio::test]
async fn stop_unblocks_pending_read_with_single_disconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream.write_all(&intro_bytes(FOUR_WINDOWS)).await.unwrap();
        // Go silent with the socket open; the client blocks reading the
        // next frame marker until stop() breaks it loose.
        tokio::time::sleep(Duration::from_secs(30)).await;
        drop(stream);
    });

    let (client, mut rx) =
        spawn_client(port, Selection::default(), Arc::new(RecordingDecoder::default()));

    assert!(matches!(next_event(&mut rx).await, ClientEvent::Connected));
    assert!(matches!(next_event(&mut rx).await, ClientEvent::HandshakeReceived(_)));

    client.stop();
    client.stop(); // idempotent

    assert!(matches!(
        next_event(&mut rx).await,
        ClientEvent::Disconnected { reason: None }
    ));
    // Exactly one terminal event, never more.
    assert!(
        tokio::time::timeout(Duration::from_millis(300), rx.recv())
            .await
            .is_err()
    );
    server.abort();
}

#[tokio::test]
async fn connect_failure_emits_only_disconnect() {
    // Bind and drop to get a port with nothing listening.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let (_client, mut rx) =
        spawn_client(port, Selection::default(), Arc::new(RecordingDecoder::default()));

    assert!(matches!(
        next_event(&mut rx).await,
        ClientEvent::Disconnected { reason: None }
    ));
    assert!(
        tokio::time::timeout(Duration::from_millis(300), rx.recv())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn handshake_read_failure_disconnects_without_handshake_event() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        // Half an intro header, then hang up.
        stream.write_all(&vec![0u8; INTRO_HEADER_LEN / 2]).await.unwrap();
    });

    let (_client, mut rx) =
        spawn_client(port, Selection::default(), Arc::new(RecordingDecoder::default()));

    assert!(matches!(next_event(&mut rx).await, ClientEvent::Connected));
    assert!(matches!(
        next_event(&mut rx).await,
        ClientEvent::Disconnected { reason: None }
    ));
}

// ── Manager end-to-end ───────────────────────────────────────────

/// Discovery stub that immediately reports localhost.
struct InstantDiscovery;

impl DiscoverySpawner for InstantDiscovery {
    fn spawn(&self, instance: InstanceId, events: EventSender) -> DiscoveryHandle {
        let cancel = CancellationToken::new();
        tokio::spawn(async move {
            let _ = events
                .send(Event::Discovery {
                    instance,
                    kind: DiscoveryEvent::AddressFound(LOCALHOST),
                })
                .await;
        });
        DiscoveryHandle::new(cancel)
    }
}

#[tokio::test]
async fn manager_discovers_connects_and_streams() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    // Serve one session: two windows, one PNG frame for window 0, then
    // hold the socket open until the test is done with it.
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let intro = intro_bytes("XTEv3\nA320\n1024 1024\nPFD 0 0 1 1\nND 0 0 1 1\n__EOF__\n");
        stream.write_all(&intro).await.unwrap();
        stream.write_all(&record(0, &tiny_png())).await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        drop(stream);
        // Later connection attempts queue in the backlog unanswered.
        tokio::time::sleep(Duration::from_secs(30)).await;
    });

    let (manager, commands, mut notify) = ConnectionManager::new(
        ManagerConfig {
            port,
            manual_address: String::new(),
            selection: Selection { slot_a: 7, slot_b: 9 },
        },
        Arc::new(InstantDiscovery),
        Arc::new(PngDecoder),
    );
    let runner = tokio::spawn(manager.run());
    commands.send(Command::Start).await.unwrap();

    let mut selection = None;
    let mut windows = None;
    let mut image = None;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while (selection.is_none() || windows.is_none() || image.is_none())
        && tokio::time::Instant::now() < deadline
    {
        let Ok(Some(n)) = tokio::time::timeout(Duration::from_secs(5), notify.recv()).await else {
            break;
        };
        match n {
            Notification::SelectionChanged(s) => selection = Some(s),
            Notification::WindowsChanged(w) => windows = Some(w),
            Notification::WindowImage { window_id, pixels } => image = Some((window_id, pixels)),
            Notification::Status(_) | Notification::ManualAddressChanged(_) => {}
        }
    }

    // Stale slots re-clamped against the two-window session.
    assert_eq!(selection, Some(Selection { slot_a: 0, slot_b: 1 }));
    assert_eq!(windows, Some(vec!["PFD".to_string(), "ND".to_string()]));
    let (window_id, pixels) = image.expect("no image arrived");
    assert_eq!(window_id, 0);
    assert_eq!((pixels.width, pixels.height), (2, 2));

    commands.send(Command::Shutdown).await.unwrap();
    drop(commands);
    tokio::time::timeout(Duration::from_secs(5), runner)
        .await
        .expect("manager did not exit")
        .unwrap();
}
