use crate::protocol::error_code;

/// Convenience result type used across the engine.
pub type EngineResult<T> = Result<T, EngineError>;

/// Failures raised by the command protocol layer.
///
/// These are fatal to the command that raised them and are reported back as a rejection; the
/// channel itself stays usable.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The opcode string is not part of any known namespace.
    #[error("unknown opcode '{0}'")]
    UnknownOpcode(String),

    /// A creation command named a handle that already exists.
    #[error("handle collision: '{0}' already exists")]
    HandleCollision(String),

    /// A command targeted a handle that does not exist.
    #[error("unknown handle '{0}'")]
    UnknownHandle(String),

    /// The opcode-specific payload could not be decoded.
    #[error("invalid payload for {opcode}: {reason}")]
    InvalidPayload {
        /// Opcode whose payload failed to decode.
        opcode: String,
        /// Decoder message.
        reason: String,
    },

    /// A command from one backend namespace targeted an engine created in another.
    #[error("namespace mismatch: engine '{engine}' belongs to {expected}, command uses {got}")]
    NamespaceMismatch {
        /// Target engine handle.
        engine: String,
        /// Namespace the engine was created in.
        expected: String,
        /// Namespace of the offending command.
        got: String,
    },

    /// The ordered channel observed an out-of-order or missing reply.
    #[error("channel faulted: {0}")]
    ChannelFaulted(String),
}

/// Top-level error taxonomy used by engine APIs.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    /// Operation attempted on a disposed object, or a second disposal.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The backend refused to produce a resource and nothing idle could be recycled.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// A pooled resource failed revalidation and could not be recreated.
    #[error("context invalidated: {0}")]
    ContextInvalidated(String),

    /// Command protocol failure.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Non-positive or out-of-range image dimensions.
    #[error("dimension error: {0}")]
    Dimension(String),

    /// Errors when serializing or deserializing data structures.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    /// Build an [`EngineError::InvalidState`] value.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Build an [`EngineError::ResourceExhausted`] value.
    pub fn exhausted(msg: impl Into<String>) -> Self {
        Self::ResourceExhausted(msg.into())
    }

    /// Build an [`EngineError::ContextInvalidated`] value.
    pub fn context_invalidated(msg: impl Into<String>) -> Self {
        Self::ContextInvalidated(msg.into())
    }

    /// Build an [`EngineError::Dimension`] value.
    pub fn dimension(msg: impl Into<String>) -> Self {
        Self::Dimension(msg.into())
    }

    /// Build an [`EngineError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// Stable numeric code reported in command rejections.
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidState(_) => error_code::INVALID_STATE,
            Self::ResourceExhausted(_) => error_code::RESOURCE_EXHAUSTED,
            Self::ContextInvalidated(_) => error_code::CONTEXT_INVALIDATED,
            Self::Protocol(p) => match p {
                ProtocolError::UnknownOpcode(_) => error_code::UNKNOWN_OPCODE,
                ProtocolError::HandleCollision(_) => error_code::HANDLE_COLLISION,
                ProtocolError::UnknownHandle(_) => error_code::UNKNOWN_HANDLE,
                ProtocolError::InvalidPayload { .. } => error_code::INVALID_PAYLOAD,
                ProtocolError::NamespaceMismatch { .. } => error_code::NAMESPACE_MISMATCH,
                ProtocolError::ChannelFaulted(_) => error_code::CHANNEL_FAULTED,
            },
            Self::Dimension(_) => error_code::DIMENSION,
            Self::Serde(_) => error_code::PARSE_ERROR,
            Self::Other(_) => error_code::INTERNAL_ERROR,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
