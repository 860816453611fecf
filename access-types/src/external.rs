//! Partial shapes of the two resource kinds owned by the external
//! continuous-delivery platform (spec §3, §6). Only the fields this system
//! reads or patches are modeled; everything else is opaque to it. This
//! system never writes `Application`, and writes only the managed role's
//! `description`/`policies`/`groups`/`jwtTokens` inside `AppProject.spec.roles`
//! (spec §3's Ownership rule).

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "argoproj.io",
    version = "v1alpha1",
    kind = "Application",
    plural = "applications",
    derive = "PartialEq",
    namespaced
)]
pub struct ApplicationSpec {
    /// The `AppProject` this application belongs to.
    pub project: String,
}

/// One role entry inside `AppProject.spec.roles[]`. The managed role is
/// the single entry whose `name` equals
/// [`managed_role_name`](crate::managed_role_name)'s output; every other
/// entry is read-only to this system.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct AppProjectRole {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub policies: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(rename = "jwtTokens", default)]
    pub jwt_tokens: Vec<serde_json::Value>,
}

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "argoproj.io",
    version = "v1alpha1",
    kind = "AppProject",
    plural = "appprojects",
    derive = "PartialEq",
    namespaced
)]
pub struct AppProjectSpec {
    #[serde(default)]
    pub roles: Vec<AppProjectRole>,
}

impl AppProjectSpec {
    pub fn find_role(&self, name: &str) -> Option<&AppProjectRole> {
        self.roles.iter().find(|r| r.name == name)
    }

    pub fn find_role_mut(&mut self, name: &str) -> Option<&mut AppProjectRole> {
        self.roles.iter_mut().find(|r| r.name == name)
    }
}
