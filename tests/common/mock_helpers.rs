//! Mock construction helpers

use crossbeam_channel::Receiver;
use fieldnet::graph::{NetworkEvent, NetworkObserver};
use mockall::mock;
use std::time::Duration;

mock! {
    pub Observer {}

    impl NetworkObserver for Observer {
        fn on_event(&self, event: &NetworkEvent);
    }
}

/// Drain everything currently queued on an event receiver
pub fn drain_events(rx: &Receiver<NetworkEvent>) -> Vec<NetworkEvent> {
    rx.try_iter().collect()
}

/// Wait up to `timeout` for an event matching `pred`
pub fn wait_for_event(
    rx: &Receiver<NetworkEvent>,
    timeout: Duration,
    pred: impl Fn(&NetworkEvent) -> bool,
) -> Option<NetworkEvent> {
    let deadline = std::time::Instant::now() + timeout;
    while let Ok(event) = rx.recv_deadline(deadline) {
        if pred(&event) {
            return Some(event);
        }
    }
    None
}
