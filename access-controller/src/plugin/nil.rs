//! The "no plugin configured" stand-in. Kept as a real [`Plugin`]
//! implementation, rather than folding `Option<Box<dyn Plugin>>` handling
//! into the reconciler, so every call site goes through the same trait
//! object regardless of configuration.

use access_types::{AccessRequest, Application};
use async_trait::async_trait;

use super::{GrantResponse, GrantStatus, Plugin, RevokeResponse, RevokeStatus};
use crate::util::Error;

#[derive(Debug, Default, Clone, Copy)]
pub struct NilPlugin;

#[async_trait]
impl Plugin for NilPlugin {
    async fn init(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn grant_access(&self, _request: &AccessRequest, _app: &Application) -> Result<GrantResponse, Error> {
        Ok(GrantResponse {
            status: GrantStatus::Granted,
            message: None,
        })
    }

    async fn revoke_access(&self, _request: &AccessRequest, _app: &Application) -> Result<RevokeResponse, Error> {
        Ok(RevokeResponse {
            status: RevokeStatus::Revoked,
            message: None,
        })
    }
}
