//! The Plugin Facade (spec §4.5): a transport-agnostic decision point the
//! reconciler consults before mutating the project. A nil plugin means
//! "grant all"; a configured plugin's null response is an error, never a
//! silent grant or deny.

#[cfg(feature = "metrics")]
pub mod metered;
pub mod nil;
pub mod process;

use access_types::{AccessRequest, Application};
use async_trait::async_trait;

use crate::util::Error;

#[cfg(feature = "metrics")]
pub use metered::MeteredPlugin;
pub use nil::NilPlugin;
pub use process::ProcessPlugin;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantStatus {
    Granted,
    Pending,
    Denied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeStatus {
    Revoked,
    Pending,
}

#[derive(Debug, Clone)]
pub struct GrantResponse {
    pub status: GrantStatus,
    pub message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RevokeResponse {
    pub status: RevokeStatus,
    pub message: Option<String>,
}

/// The contract every transport (in-process, subprocess, eventually a
/// network RPC) implements identically, per spec §4.5.
#[async_trait]
pub trait Plugin: Send + Sync {
    async fn init(&self) -> Result<(), Error>;
    async fn grant_access(&self, request: &AccessRequest, app: &Application) -> Result<GrantResponse, Error>;
    async fn revoke_access(&self, request: &AccessRequest, app: &Application) -> Result<RevokeResponse, Error>;
}

/// Builds the configured plugin, or `None` when no plugin binary is
/// configured — the reconciler then treats every grant decision as
/// `Granted` (spec §4.1 step 11: "Absent plugin → treat as Granted").
pub fn from_config(config: &crate::util::config::PluginConfig) -> Option<Box<dyn Plugin>> {
    config
        .binary_path
        .clone()
        .map(|path| Box::new(ProcessPlugin::new(path)) as Box<dyn Plugin>)
}
