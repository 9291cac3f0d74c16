use thiserror::Error;

/// Inbound event that cannot be turned into an [`crate::InboundMessage`].
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown inbound event '{0}'")]
    UnknownEvent(String),

    #[error("malformed '{event}' payload: {source}")]
    MalformedPayload {
        event: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("execution_output payload carries no error, output or execution_time")]
    EmptyExecutionOutput,
}

/// Failure to hand a message to a transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("transport is closed")]
    Closed,

    #[error("failed to encode '{event}' message: {message}")]
    Encode {
        event: &'static str,
        message: String,
    },
}
