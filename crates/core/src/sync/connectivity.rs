//! Connectivity contract used to trigger automatic sync.

use tokio::sync::watch;

/// Reports whether the grade API is reachable.
///
/// Implementations wrap whatever the host platform exposes, from an OS
/// reachability check down to a toggle flipped by a test. The queue only
/// needs the current state and a way to observe transitions.
pub trait ConnectivityWatcher: Send + Sync {
    /// Most recent known state.
    fn is_online(&self) -> bool;

    /// Subscribe to state changes.
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// Watch-channel backed connectivity source.
///
/// Hosts push transitions through [`ConnectivitySignal::set_online`]; the
/// auto-sync listener observes them through [`ConnectivityWatcher`].
#[derive(Debug)]
pub struct ConnectivitySignal {
    sender: watch::Sender<bool>,
}

impl ConnectivitySignal {
    /// Create a signal with an initial state.
    pub fn new(online: bool) -> Self {
        let (sender, _) = watch::channel(online);
        Self { sender }
    }

    /// Publish a connectivity change.
    pub fn set_online(&self, online: bool) {
        self.sender.send_replace(online);
    }
}

impl ConnectivityWatcher for ConnectivitySignal {
    fn is_online(&self) -> bool {
        *self.sender.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}
