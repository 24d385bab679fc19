pub mod dsl;
pub mod compiler;
pub mod runtime;
pub mod migration;
pub mod scenario;

/// Every entity in the engine (definitions, element instances, jobs, subscriptions, ...) is
/// addressed by a partition-unique key.
pub type Key = i64;
