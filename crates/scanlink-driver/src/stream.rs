//! Session + reader with the reconnect policy applied

use crate::config::DeviceConfig;
use crate::error::SessionError;
use crate::metrics::SessionMetrics;
use crate::reader::{ScanOutcome, ScanReader};
use crate::session::{DeviceSession, SessionState};
use scanlink_protocol::DeviceTag;
use scanlink_transport::{ScanDriver, TransportLeases};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// A scanning device ready to be polled
///
/// When the configuration enables `auto_reconnect`, a cycle that loses the
/// link triggers [`DeviceSession::reconnect`] and reports `NoData` for that
/// cycle. Reconnect exhaustion surfaces as `DeviceUnreachable`.
#[derive(Debug)]
pub struct ScanStream {
    session: DeviceSession,
    reader: ScanReader,
    tag: DeviceTag,
}

impl ScanStream {
    /// Configure, open and start a driver
    ///
    /// On failure the half-built session is dropped, which closes it.
    pub fn connect(
        driver: Box<dyn ScanDriver>,
        config: DeviceConfig,
        leases: &TransportLeases,
    ) -> Result<Self, SessionError> {
        let mut session = DeviceSession::with_leases(driver, leases.clone());
        session.configure(config)?;
        session.open()?;
        session.start()?;
        Ok(Self::from_session(session))
    }

    /// Wrap a session the caller brought up
    pub fn from_session(session: DeviceSession) -> Self {
        let tag = session.tag();
        Self {
            session,
            reader: ScanReader::new(),
            tag,
        }
    }

    pub fn tag(&self) -> &DeviceTag {
        &self.tag
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn session(&self) -> &DeviceSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut DeviceSession {
        &mut self.session
    }

    pub fn metrics(&self) -> Arc<SessionMetrics> {
        Arc::clone(self.session.metrics())
    }

    /// One read cycle, reconnecting on link loss if enabled
    pub fn next(&mut self, timeout: Duration) -> Result<ScanOutcome, SessionError> {
        match self.reader.next(&mut self.session, timeout) {
            Err(e) if e.is_transport_disconnect() && self.auto_reconnect() => {
                warn!("{}: {}, reconnecting", self.tag, e);
                self.session.reconnect()?;
                Ok(ScanOutcome::NoData)
            },
            other => other,
        }
    }

    fn auto_reconnect(&self) -> bool {
        self.session.config().is_some_and(|c| c.auto_reconnect)
    }

    pub fn stop(&mut self) -> Result<(), SessionError> {
        self.session.stop()
    }

    pub fn close(&mut self) -> Result<(), SessionError> {
        self.session.close()
    }
}
