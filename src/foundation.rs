/// Sizes, colors and resource ids.
pub mod core;
/// Engine and protocol errors.
pub mod error;
