pub mod backoff;
pub mod config;
mod error;
pub mod finalizer;

pub use backoff::with_conflict_retry;
pub use config::Config;
pub use error::Error;

/// Name of the finalizer this controller adds to every `AccessRequest`
/// before issuing any project mutation (invariant I4).
pub const FINALIZER_NAME: &str = "access.platform.io/finalizer";

/// Name of the field manager used for every patch this controller issues.
pub const MANAGER_NAME: &str = "access-controller";
