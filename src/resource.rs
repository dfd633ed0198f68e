/// Least-recently-used ordering of idle resources.
pub mod order;
/// Keyed pool with freeze/defrost hooks.
pub mod pool;
/// Releasing backend resources without disposing the owner.
pub mod release;
