//! Session registry: opaque handles to live capture sessions.
//!
//! Replaces a process-wide "current camera" pointer. Handles are never
//! reused, so a stale handle fails with `UnknownSession` instead of reaching
//! another camera. The graphics host binding lives here as well and is read
//! afresh on every render event.

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU64;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::{debug, info, trace, warn};

use crate::config::CaptureConfig;
use crate::device::DeviceHandle;
use crate::error::{Error, Result};
use crate::presentation::{GraphicsHost, Presented};
use crate::session::CaptureSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(NonZeroU64);

impl SessionId {
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<CaptureSession>>>,
    host: RwLock<Option<Arc<dyn GraphicsHost>>>,
    next_id: AtomicU64,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            host: RwLock::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Open a session on `device` and register it.
    pub fn create(&self, device: Option<Arc<dyn DeviceHandle>>, config: CaptureConfig) -> SessionId {
        let session = Arc::new(CaptureSession::open(device, config));
        let raw = self.next_id.fetch_add(1, Ordering::Relaxed);
        // counter starts at 1 and only grows
        let id = SessionId(NonZeroU64::MIN.saturating_add(raw - 1));
        info!(session = %id, state = ?session.state(), "session created");
        self.sessions.write().insert(id, session);
        id
    }

    pub fn get(&self, id: SessionId) -> Result<Arc<CaptureSession>> {
        self.sessions
            .read()
            .get(&id)
            .cloned()
            .ok_or(Error::UnknownSession(id.get()))
    }

    /// Unregister and stop a session. The stop runs outside the registry lock.
    pub fn destroy(&self, id: SessionId) -> Result<()> {
        let session = self
            .sessions
            .write()
            .remove(&id)
            .ok_or(Error::UnknownSession(id.get()))?;
        let result = session.stop().map(|_| ());
        info!(session = %id, "session destroyed");
        result
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    pub fn set_host(&self, host: Arc<dyn GraphicsHost>) {
        *self.host.write() = Some(host);
        debug!("graphics host bound");
    }

    pub fn clear_host(&self) {
        *self.host.write() = None;
        debug!("graphics host cleared");
    }

    pub fn has_host(&self) -> bool {
        self.host.read().is_some()
    }

    /// Render callback: present every registered session.
    ///
    /// Returns how many sessions uploaded a frame. Per-session failures are
    /// logged, not propagated; the host has no way to act on them.
    pub fn on_render_event(&self, event_id: i32) -> usize {
        let Some(host) = self.host.read().clone() else {
            trace!(event_id, "render event without a graphics host");
            return 0;
        };
        // snapshot so presentation never runs under the registry lock
        let sessions: Vec<_> = self
            .sessions
            .read()
            .iter()
            .map(|(id, session)| (*id, session.clone()))
            .collect();

        let mut uploaded = 0;
        for (id, session) in sessions {
            match session.present(host.as_ref()) {
                Ok(Presented::Uploaded) => uploaded += 1,
                Ok(skipped) => trace!(session = %id, ?skipped, "nothing presented"),
                Err(e) => warn!(session = %id, event_id, error = %e, "presentation failed"),
            }
        }
        uploaded
    }

    /// Stop and drop every session.
    pub fn shutdown(&self) {
        let sessions: Vec<_> = self.sessions.write().drain().collect();
        for (id, session) in sessions {
            if let Err(e) = session.stop() {
                warn!(session = %id, error = %e, "session did not stop cleanly");
            }
        }
    }
}
