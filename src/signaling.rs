//! Signaling channel: lazily-opened persistent transport to the relay.
//!
//! The channel reconnects only when a send finds no open connection. A send
//! attempted while the relay is unreachable is dropped after the reconnect
//! attempt fails; there is no resume or renegotiation path for a connection
//! lost mid-session.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use crate::error::RtcError;
use crate::protocol::SignalMessage;

/// One open connection to the relay.
#[async_trait]
pub trait SignalingConnection: Send + Sync {
    async fn send(&self, message: SignalMessage) -> Result<(), RtcError>;
    fn is_open(&self) -> bool;
}

/// Opens connections to the relay. Implemented by the host runtime.
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    /// Opens a connection. Inbound messages must be pushed into `inbound`
    /// for as long as the connection lives.
    async fn connect(
        &self,
        inbound: mpsc::UnboundedSender<SignalMessage>,
    ) -> Result<Arc<dyn SignalingConnection>, RtcError>;
}

pub struct SignalingChannel {
    transport: Arc<dyn SignalingTransport>,
    inbound: mpsc::UnboundedSender<SignalMessage>,
    conn: Mutex<Option<Arc<dyn SignalingConnection>>>,
}

impl SignalingChannel {
    pub fn new(
        transport: Arc<dyn SignalingTransport>,
        inbound: mpsc::UnboundedSender<SignalMessage>,
    ) -> Self {
        Self {
            transport,
            inbound,
            conn: Mutex::new(None),
        }
    }

    /// Fire-and-forget send. Opens the connection on first use and
    /// reconnects on demand; a message that cannot be delivered is logged
    /// and dropped.
    pub async fn send(&self, message: SignalMessage) {
        let event = message.event_name();
        if let Err(err) = self.try_send(message).await {
            tracing::warn!(event = event, error = %err, "signaling send dropped");
        }
    }

    /// Opens the connection if none is live. Normally implicit in `send`;
    /// exposed so an embedder can receive inbound events (e.g. an incoming
    /// call) before its first outbound send.
    pub async fn ensure_open(&self) {
        if let Err(err) = self.open_conn().await {
            tracing::warn!(error = %err, "signaling open failed");
        }
    }

    async fn try_send(&self, message: SignalMessage) -> Result<(), RtcError> {
        let conn = self.open_conn().await?;
        if let Err(err) = conn.send(message).await {
            // Force a reconnect on the next send.
            *self.conn.lock().await = None;
            return Err(err);
        }
        Ok(())
    }

    async fn open_conn(&self) -> Result<Arc<dyn SignalingConnection>, RtcError> {
        let mut conn = self.conn.lock().await;
        if let Some(c) = conn.as_ref() {
            if c.is_open() {
                return Ok(c.clone());
            }
        }
        let opened = self
            .transport
            .connect(self.inbound.clone())
            .await
            .map_err(|err| RtcError::SignalingUnavailable(err.to_string()))?;
        tracing::debug!("signaling connection opened");
        *conn = Some(opened.clone());
        Ok(opened)
    }
}
