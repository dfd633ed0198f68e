//! Cross-boundary command protocol.
//!
//! Commands are JSON objects `{ "opcode": ..., "handle": ..., ...payload }`. They are wrapped in
//! sequenced [`command::Envelope`]s, applied in order by a [`dispatch::Dispatcher`] and answered
//! with [`command::Reply`]s. [`channel`] runs a dispatcher on its own thread behind an ordered
//! message channel.

pub mod channel;
/// Commands, envelopes, replies and the command log.
pub mod command;
/// Applying commands to engines.
pub mod dispatch;
pub mod opcode;

/// Stable error codes reported in rejected replies.
pub mod error_code {
    // JSON-RPC compatible

    /// The command line is not valid JSON.
    pub const PARSE_ERROR: i32 = -32700;
    /// Opcode not part of any namespace.
    pub const UNKNOWN_OPCODE: i32 = -32601;
    /// Opcode-specific payload failed to decode.
    pub const INVALID_PAYLOAD: i32 = -32602;
    /// Lower-level failure while applying the command.
    pub const INTERNAL_ERROR: i32 = -32603;

    // Engine-specific

    /// Creation of an existing handle.
    pub const HANDLE_COLLISION: i32 = -1001;
    /// Target handle does not exist.
    pub const UNKNOWN_HANDLE: i32 = -1002;
    /// Target is disposed, or the operation is not allowed in its state.
    pub const INVALID_STATE: i32 = -1003;
    /// Bad image dimensions or coordinates.
    pub const DIMENSION: i32 = -1004;
    /// No backend resource could be produced or recycled.
    pub const RESOURCE_EXHAUSTED: i32 = -1005;
    /// A revoked GPU context could not be recreated.
    pub const CONTEXT_INVALIDATED: i32 = -1006;
    /// Command namespace differs from the target engine's.
    pub const NAMESPACE_MISMATCH: i32 = -1007;
    /// The ordered channel lost or misordered a reply.
    pub const CHANNEL_FAULTED: i32 = -1008;
}
