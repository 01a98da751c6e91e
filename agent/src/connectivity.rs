//! Online/offline sensor.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::remote::ApiClient;

/// Current connectivity, observable through a watch channel.
#[derive(Debug)]
pub struct Connectivity {
    state: watch::Sender<bool>,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        let (state, _) = watch::channel(online);
        Self { state }
    }

    pub fn new_shared(online: bool) -> Arc<Self> {
        Arc::new(Self::new(online))
    }

    pub fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    /// Record the observed state. Subscribers wake only on a change.
    pub fn set_online(&self, online: bool) {
        let changed = self.state.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            tracing::info!(online, "Connectivity changed");
        }
    }

    /// Subscribe to transitions. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }
}

/// Probe the remote every `interval` and feed the result into `connectivity`.
pub async fn run_probe(connectivity: Arc<Connectivity>, client: ApiClient, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let online = client.probe().await;
        tracing::trace!(online, "Connectivity probe");
        connectivity.set_online(online);
    }
}

/// Spawn the probe loop.
pub fn spawn_probe(
    connectivity: Arc<Connectivity>,
    client: ApiClient,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run_probe(connectivity, client, interval))
}
