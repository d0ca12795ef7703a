//! Transport Session
//!
//! Owns the transport and the connected/disconnected flag. Connects lazily
//! before a transaction and drops the link after connection-class failures so
//! the next attempt starts from a fresh connect. Never retries on its own.

use serde::Serialize;
use std::fmt;
use tokio::sync::Mutex;

use crate::error::{LinkError, Result};
use crate::logger::DeviceLogger;
use crate::transport::RegisterTransport;

/// Session connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connected,
}

impl SessionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Connected)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "DISCONNECTED"),
            SessionState::Connected => write!(f, "CONNECTED"),
        }
    }
}

#[derive(Debug)]
struct SessionInner<T> {
    transport: T,
    state: SessionState,
}

/// One endpoint, one unit id, at most one transaction in flight
#[derive(Debug)]
pub struct TransportSession<T> {
    inner: Mutex<SessionInner<T>>,
    unit_id: u8,
    logger: DeviceLogger,
}

impl<T: RegisterTransport> TransportSession<T> {
    pub fn new(transport: T, unit_id: u8, logger: DeviceLogger) -> Self {
        Self {
            inner: Mutex::new(SessionInner {
                transport,
                state: SessionState::Disconnected,
            }),
            unit_id,
            logger,
        }
    }

    pub fn unit_id(&self) -> u8 {
        self.unit_id
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    pub async fn is_connected(&self) -> bool {
        self.state().await.is_connected()
    }

    /// Open the link; a no-op when already connected.
    ///
    /// Failures are reported as [`LinkError::Connection`], or [`LinkError::Config`] when the
    /// endpoint settings cannot be used, and leave the session disconnected.
    pub async fn connect(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.ensure_connected(&mut inner).await
    }

    /// Close the link if open; always ends disconnected
    pub async fn disconnect(&self) {
        let mut inner = self.inner.lock().await;
        self.drop_link(&mut inner, "disconnect requested").await;
    }

    pub async fn read_registers(&self, address: u16, count: u16) -> Result<Vec<u16>> {
        let mut inner = self.inner.lock().await;
        self.ensure_connected(&mut inner).await?;

        let result = inner
            .transport
            .read_holding(self.unit_id, address, count)
            .await;
        self.settle(&mut inner, result).await
    }

    pub async fn write_register(&self, address: u16, value: u16) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.ensure_connected(&mut inner).await?;

        let result = inner
            .transport
            .write_single(self.unit_id, address, value)
            .await;
        self.settle(&mut inner, result).await
    }

    async fn ensure_connected(&self, inner: &mut SessionInner<T>) -> Result<()> {
        if inner.state.is_connected() {
            return Ok(());
        }

        match inner.transport.open().await {
            Ok(()) => {
                inner.state = SessionState::Connected;
                self.logger.log_connect("connected");
                self.logger.log_status(
                    SessionState::Disconnected,
                    SessionState::Connected,
                    "link opened",
                );
                Ok(())
            },
            Err(e) => {
                self.logger.log_connect(&format!("failed: {e}"));
                Err(match e {
                    LinkError::Connection(_) | LinkError::Config(_) => e,
                    other => LinkError::connection(other.to_string()),
                })
            },
        }
    }

    /// Drop the link after errors that leave it unusable
    async fn settle<R>(&self, inner: &mut SessionInner<T>, result: Result<R>) -> Result<R> {
        if let Err(e) = &result {
            if e.needs_reconnect() {
                self.drop_link(inner, &e.to_string()).await;
            }
        }
        result
    }

    async fn drop_link(&self, inner: &mut SessionInner<T>, reason: &str) {
        if inner.state.is_connected() {
            inner.transport.close().await;
            inner.state = SessionState::Disconnected;
            self.logger.log_disconnect(reason);
            self.logger
                .log_status(SessionState::Connected, SessionState::Disconnected, reason);
        }
    }
}
