//! BECN beacon listener.
//!
//! X-Plane announces itself with a periodic UDP multicast beacon. The
//! datagram body is ignored here; what matters is the source address of
//! whoever sent it: that is the machine running the plugin. Reports one
//! address and goes quiet, per the discovery contract; timeouts and
//! bind failures are reported as status while the listener keeps trying.

use std::net::Ipv4Addr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use xtex_core::{
    DiscoveryEvent, DiscoveryHandle, DiscoverySpawner, Event, EventSender, InstanceId,
};

/// How long to wait after a listener failure before trying to bind again.
const REBIND_DELAY: Duration = Duration::from_secs(5);

/// Spawner for BECN multicast listeners.
pub struct BecnDiscovery {
    group: Ipv4Addr,
    port: u16,
    timeout: Duration,
}

impl BecnDiscovery {
    pub fn new(group: Ipv4Addr, port: u16, timeout: Duration) -> Self {
        Self { group, port, timeout }
    }
}

impl Default for BecnDiscovery {
    fn default() -> Self {
        Self::new(
            xtex_core::BECN_GROUP,
            xtex_core::BECN_PORT,
            Duration::from_secs(10),
        )
    }
}

impl DiscoverySpawner for BecnDiscovery {
    fn spawn(&self, instance: InstanceId, events: EventSender) -> DiscoveryHandle {
        let cancel = CancellationToken::new();
        let listener = Listener {
            group: self.group,
            port: self.port,
            timeout: self.timeout,
            instance,
            events,
            cancel: cancel.clone(),
        };
        tokio::spawn(listener.run());
        DiscoveryHandle::new(cancel)
    }
}

struct Listener {
    group: Ipv4Addr,
    port: u16,
    timeout: Duration,
    instance: InstanceId,
    events: EventSender,
    cancel: CancellationToken,
}

impl Listener {
    async fn run(self) {
        debug!(
            "beacon listener {} joining {}:{}",
            self.instance, self.group, self.port
        );
        loop {
            let socket = match self.bind().await {
                Ok(s) => s,
                Err(e) => {
                    warn!("beacon bind failed: {e}");
                    if self.report(DiscoveryEvent::Failure(e.to_string())).await.is_err() {
                        return;
                    }
                    tokio::select! {
                        _ = self.cancel.cancelled() => return,
                        _ = tokio::time::sleep(REBIND_DELAY) => continue,
                    }
                }
            };

            if self.listen(&socket).await {
                return;
            }
            // recv error: drop the socket and rebind.
        }
    }

    async fn bind(&self) -> std::io::Result<UdpSocket> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, self.port)).await?;
        // A unicast "group" (loopback in tests) needs no membership.
        if self.group.is_multicast() {
            socket.join_multicast_v4(self.group, Ipv4Addr::UNSPECIFIED)?;
        }
        Ok(socket)
    }

    /// Wait for one beacon. Returns true when the listener is done
    /// (address reported or cancelled), false to rebind.
    async fn listen(&self, socket: &UdpSocket) -> bool {
        let mut buf = [0u8; 1024];
        loop {
            let received = tokio::select! {
                _ = self.cancel.cancelled() => return true,
                r = tokio::time::timeout(self.timeout, socket.recv_from(&mut buf)) => r,
            };
            match received {
                Err(_) => {
                    // No beacon inside the window; say so and keep waiting.
                    if self.report(DiscoveryEvent::Timeout).await.is_err() {
                        return true;
                    }
                }
                Ok(Err(e)) => {
                    warn!("beacon recv failed: {e}");
                    let _ = self.report(DiscoveryEvent::Failure(e.to_string())).await;
                    return false;
                }
                Ok(Ok((len, source))) => {
                    debug!("beacon from {source} ({len} bytes)");
                    let _ = self.report(DiscoveryEvent::AddressFound(source.ip())).await;
                    return true;
                }
            }
        }
    }

    async fn report(&self, kind: DiscoveryEvent) -> Result<(), ()> {
        self.events
            .send(Event::Discovery { instance: self.instance, kind })
            .await
            .map_err(|_| ())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    /// Unicast UDP to an ephemeral port stands in for the multicast
    /// group; the listener only cares about the datagram's source.
    #[tokio::test]
    async fn beacon_reports_source_address_once() {
        let probe = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let placeholder = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = placeholder.local_addr().unwrap().port();
        drop(placeholder);

        let discovery =
            BecnDiscovery::new(Ipv4Addr::LOCALHOST, port, Duration::from_secs(5));
        let (tx, mut rx) = mpsc::channel(8);
        let instance = InstanceId::next();
        let _handle = discovery.spawn(instance, tx);

        // Give the listener a moment to bind, then beacon at it.
        tokio::time::sleep(Duration::from_millis(100)).await;
        probe
            .send_to(b"BECN\0payload ignored", ("127.0.0.1", port))
            .await
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no event")
            .expect("channel closed");
        match event {
            Event::Discovery { instance: got, kind: DiscoveryEvent::AddressFound(ip) } => {
                assert_eq!(got, instance);
                assert_eq!(ip, probe.local_addr().unwrap().ip());
            }
            other => panic!("unexpected event {other:?}"),
        }

        // Replied once; nothing further.
        assert!(
            tokio::time::timeout(Duration::from_millis(300), rx.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn quiet_network_reports_timeout_and_keeps_listening() {
        let placeholder = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = placeholder.local_addr().unwrap().port();
        drop(placeholder);

        let discovery =
            BecnDiscovery::new(Ipv4Addr::LOCALHOST, port, Duration::from_millis(100));
        let (tx, mut rx) = mpsc::channel(8);
        let handle = discovery.spawn(InstanceId::next(), tx);

        // Two consecutive timeouts prove it keeps waiting after the first.
        for _ in 0..2 {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("no event")
                .expect("channel closed");
            assert!(matches!(
                event,
                Event::Discovery { kind: DiscoveryEvent::Timeout, .. }
            ));
        }

        handle.stop();
    }
}
