//! The Persistence Port (spec §4, Design Notes: "an interface with one
//! variant per kind"). `Persister` is the single seam every other
//! component reads and writes resources through, so it can be swapped for
//! an in-memory fake in tests without touching reconciler/policy/resolver
//! logic.

pub mod kube_backend;
#[cfg(test)]
pub mod memory;

use access_types::{AccessBinding, AccessRequest, AccessRequestSpec, AppProject, Application, RoleTemplate};
use async_trait::async_trait;

use crate::util::Error;

pub use kube_backend::KubePersister;

/// Preconditioned patch to `AppProject.spec.roles[<managed role>]`. Carries
/// the resource version the caller observed so the backing store can
/// reject the write if the project moved under it (spec §4.2's "patch
/// discipline").
#[derive(Debug, Clone)]
pub struct ProjectRolePatch {
    pub role_name: String,
    pub description: String,
    pub policies: Vec<String>,
    /// `None` leaves `groups` untouched (used by `sync`, spec §4.2).
    pub groups: Option<Vec<String>>,
}

#[async_trait]
pub trait Persister: Send + Sync {
    async fn get_access_request(&self, namespace: &str, name: &str) -> Result<Option<AccessRequest>, Error>;

    /// All `AccessRequest`s in `namespace`. Used by the Indexed Query
    /// Layer's rehydration and by the Service's listing surface.
    async fn list_access_requests(&self, namespace: &str) -> Result<Vec<AccessRequest>, Error>;

    async fn create_access_request(&self, request: AccessRequest) -> Result<AccessRequest, Error>;

    /// Applies `new_spec` to the named request after checking invariant I1
    /// (spec §3) against the currently stored spec. This is the
    /// "admission boundary" spec §8 scenario 3 requires.
    async fn update_access_request_spec(
        &self,
        namespace: &str,
        name: &str,
        new_spec: AccessRequestSpec,
    ) -> Result<AccessRequest, Error>;

    /// Applies `f` to the latest observed status, retrying on optimistic
    /// lock conflict per the bounded-attempt schedule (spec §4.1).
    async fn patch_access_request_status(
        &self,
        namespace: &str,
        name: &str,
        f: &(dyn Fn(&mut AccessRequest) + Send + Sync),
    ) -> Result<AccessRequest, Error>;

    async fn add_access_request_finalizer(&self, namespace: &str, name: &str) -> Result<AccessRequest, Error>;
    async fn remove_access_request_finalizer(&self, namespace: &str, name: &str) -> Result<AccessRequest, Error>;
    async fn delete_access_request(&self, namespace: &str, name: &str) -> Result<(), Error>;

    async fn get_role_template(&self, namespace: &str, name: &str) -> Result<Option<RoleTemplate>, Error>;

    async fn get_access_binding(&self, namespace: &str, name: &str) -> Result<Option<AccessBinding>, Error>;
    async fn list_access_bindings(&self, namespace: &str) -> Result<Vec<AccessBinding>, Error>;

    async fn get_application(&self, namespace: &str, name: &str) -> Result<Option<Application>, Error>;

    async fn get_app_project(&self, namespace: &str, name: &str) -> Result<Option<AppProject>, Error>;

    /// Patches the managed role inside `AppProject.spec.roles[]`, creating
    /// the role entry if absent, retrying on optimistic lock conflict
    /// (spec §4.2's patch discipline, the only sanctioned concurrency
    /// primitive for the shared project).
    async fn patch_app_project_role(
        &self,
        namespace: &str,
        project_name: &str,
        patch: ProjectRolePatch,
    ) -> Result<(), Error>;

    /// Removes `subject` from the managed role's `groups` and re-applies
    /// description/policies/jwtTokens from the template (spec §4.2's
    /// "Revoke semantics"). A missing project or missing role is success
    /// (nothing to remove).
    async fn revoke_app_project_role(
        &self,
        namespace: &str,
        project_name: &str,
        role_name: &str,
        subject: &str,
        template: Option<&access_types::template::RenderedTemplate>,
    ) -> Result<(), Error>;
}
