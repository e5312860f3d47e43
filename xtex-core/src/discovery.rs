//! Discovery collaborator interface.
//!
//! Finding the plugin's address on the local network is the embedding
//! application's job (the reference transport is the X-Plane BECN
//! multicast beacon). The control loop only consumes the three outcomes
//! in [`DiscoveryEvent`](crate::event::DiscoveryEvent) and holds a stop
//! handle; how the listener waits is its own business.

use tokio_util::sync::CancellationToken;

use crate::event::{EventSender, InstanceId};

/// Factory for discovery listener instances.
///
/// Contract for implementations:
/// - run on your own task(s); never block the caller in `spawn`
/// - tag every event with the `instance` you were given
/// - after reporting `Timeout` or `Failure`, keep listening (or retry
///   internally); the control loop treats both as status, not terminal
/// - report `AddressFound` at most once, then go quiet; the control
///   loop stops you promptly afterwards
/// - exit promptly once the handle's token is cancelled
pub trait DiscoverySpawner: Send + Sync {
    fn spawn(&self, instance: InstanceId, events: EventSender) -> DiscoveryHandle;
}

/// Stop handle for one running listener instance.
pub struct DiscoveryHandle {
    cancel: CancellationToken,
}

impl DiscoveryHandle {
    /// Wrap the token the listener task selects on.
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Signal the listener to exit. Idempotent and non-blocking.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}
