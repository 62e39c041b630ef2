use thiserror::Error;

/// Errors raised by the queue transport layer.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("envelope encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("envelope decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("payload error: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("zeromq error: {0}")]
    Zmq(#[from] zeromq::ZmqError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("no queue bound for exchange '{exchange}' routing key '{routing_key}'")]
    Unroutable {
        exchange: String,
        routing_key: String,
    },

    #[error("queue closed")]
    Closed,
}
