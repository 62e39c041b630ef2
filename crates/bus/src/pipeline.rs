use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, instrument};
use zeromq::{PullSocket, PushSocket, Socket, SocketRecv, SocketSend};

use crate::error::BusError;
use crate::message::Envelope;
use crate::traits::{QueueReceiver, QueueSender};
use crate::transport::Transport;

/// PUSH socket that hands envelopes to the broker frontend.
///
/// When several PULL peers are connected, envelopes are distributed
/// round-robin across them.
pub struct ZmqQueueSender {
    socket: Mutex<PushSocket>,
}

impl ZmqQueueSender {
    /// Connect to a stable PULL endpoint (the usual publisher setup).
    #[instrument(skip_all, fields(endpoint = %transport))]
    pub async fn connect(transport: &Transport) -> Result<Self, BusError> {
        let mut socket = PushSocket::new();
        let endpoint = transport.endpoint();
        info!(endpoint = %endpoint, "connecting PUSH socket");
        socket.connect(&endpoint).await?;
        Ok(Self {
            socket: Mutex::new(socket),
        })
    }

    /// Bind as the stable endpoint that PULL peers connect to.
    #[instrument(skip_all, fields(endpoint = %transport))]
    pub async fn bind(transport: &Transport) -> Result<Self, BusError> {
        transport.prepare_bind()?;
        let mut socket = PushSocket::new();
        let endpoint = transport.endpoint();
        info!(endpoint = %endpoint, "binding PUSH socket");
        socket.bind(&endpoint).await?;
        Ok(Self {
            socket: Mutex::new(socket),
        })
    }
}

#[async_trait]
impl QueueSender for ZmqQueueSender {
    async fn send(&self, envelope: Envelope) -> Result<(), BusError> {
        let bytes = envelope.to_bytes()?;
        let mut socket = self.socket.lock().await;
        socket.send(bytes.into()).await?;
        Ok(())
    }
}

/// PULL socket that receives envelopes from the broker backend.
pub struct ZmqQueueReceiver {
    socket: Mutex<PullSocket>,
}

impl ZmqQueueReceiver {
    /// Connect to a stable PUSH endpoint (the usual consumer setup).
    #[instrument(skip_all, fields(endpoint = %transport))]
    pub async fn connect(transport: &Transport) -> Result<Self, BusError> {
        let mut socket = PullSocket::new();
        let endpoint = transport.endpoint();
        info!(endpoint = %endpoint, "connecting PULL socket");
        socket.connect(&endpoint).await?;
        Ok(Self {
            socket: Mutex::new(socket),
        })
    }

    /// Bind as the stable endpoint that PUSH peers connect to.
    #[instrument(skip_all, fields(endpoint = %transport))]
    pub async fn bind(transport: &Transport) -> Result<Self, BusError> {
        transport.prepare_bind()?;
        let mut socket = PullSocket::new();
        let endpoint = transport.endpoint();
        info!(endpoint = %endpoint, "binding PULL socket");
        socket.bind(&endpoint).await?;
        Ok(Self {
            socket: Mutex::new(socket),
        })
    }
}

#[async_trait]
impl QueueReceiver for ZmqQueueReceiver {
    async fn recv(&self) -> Result<Envelope, BusError> {
        let mut socket = self.socket.lock().await;
        let raw = socket.recv().await?;
        let bytes = raw
            .get(0)
            .ok_or_else(|| BusError::Transport("empty ZMQ frame".into()))?;
        Ok(Envelope::from_bytes(bytes.as_ref())?)
    }
}
