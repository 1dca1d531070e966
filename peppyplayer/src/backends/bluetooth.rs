//! Bluetooth A2DP sink.
//!
//! Audio is routed by the system; the adapter only starts and stops the
//! agent service. Transport and volume commands are not available.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::capabilities::{
    BackendIdentity, ClientLifecycle, Player, PlaylistControl, TransportControl, VolumeControl,
};
use crate::listeners::ListenerRegistry;
use crate::model::{Capability, PlayerKind};
use crate::process::CommandRunner;

const SYSTEMCTL: &str = "systemctl";

pub struct BluetoothBackend {
    service: String,
    runner: Arc<dyn CommandRunner>,
    listeners: ListenerRegistry,
    started: Mutex<bool>,
}

impl BluetoothBackend {
    pub fn new(service: impl Into<String>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            service: service.into(),
            runner,
            listeners: ListenerRegistry::new(),
            started: Mutex::new(false),
        }
    }

    fn systemctl(&self, action: &str) -> bool {
        match self.runner.run(SYSTEMCTL, &[action, &self.service]) {
            Ok(_) => true,
            Err(e) => {
                debug!(backend = "bluetooth", action, service = %self.service, error = %e, "systemctl failed");
                false
            }
        }
    }
}

impl BackendIdentity for BluetoothBackend {
    fn kind(&self) -> PlayerKind {
        PlayerKind::Bluetooth
    }
}

impl ClientLifecycle for BluetoothBackend {
    fn start_client(&self) {
        let mut started = self.started.lock();
        if *started {
            return;
        }
        // Left unset on failure so the next start_client tries again.
        if self.systemctl("start") {
            info!(service = %self.service, "Bluetooth sink started");
            *started = true;
        } else {
            warn!(service = %self.service, "⚠️ Bluetooth sink could not be started");
        }
    }

    fn stop_client(&self) {
        let mut started = self.started.lock();
        if !*started {
            return;
        }
        if self.systemctl("stop") {
            info!(service = %self.service, "Bluetooth sink stopped");
        }
        *started = false;
    }
}

impl TransportControl for BluetoothBackend {}

impl VolumeControl for BluetoothBackend {}

impl PlaylistControl for BluetoothBackend {}

impl Player for BluetoothBackend {
    fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    fn capabilities(&self) -> &'static [Capability] {
        &[]
    }

    fn current_url(&self) -> Option<String> {
        None
    }
}
