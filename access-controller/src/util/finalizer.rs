//! Finalizer add/remove, generalized from the teacher's
//! `vpn-operator::util::finalizer` to this crate's [`Error`](super::Error)
//! type. Kept as a direct JSON merge patch rather than switching to
//! `kube::runtime::finalizer`'s helper, since that helper assumes the
//! finalizer is the *only* top-level action in the reconcile function —
//! here the finalizer gate is one of several ordered gates (spec §4.1).

use kube::{
    api::{Patch, PatchParams, Resource},
    core::NamespaceResourceScope,
    Api, Client, ResourceExt,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use std::fmt::Debug;

use super::{Error, FINALIZER_NAME, MANAGER_NAME};

/// Adds [`FINALIZER_NAME`] to `name`/`namespace`. No-op if already present.
pub async fn add<T>(client: Client, name: &str, namespace: &str) -> Result<T, Error>
where
    T: Clone + Resource<Scope = NamespaceResourceScope> + Serialize + DeserializeOwned + Debug,
    T::DynamicType: Default,
{
    let api: Api<T> = Api::namespaced(client, namespace);
    let patch: Value = json!({ "metadata": { "finalizers": [FINALIZER_NAME] } });
    let patch = Patch::Merge(&patch);
    Ok(api
        .patch(name, &PatchParams::apply(MANAGER_NAME), &patch)
        .await?)
}

/// Removes [`FINALIZER_NAME`] from `name`/`namespace`. No-op if absent.
pub async fn remove<T>(client: Client, name: &str, namespace: &str) -> Result<T, Error>
where
    T: Clone + Resource<Scope = NamespaceResourceScope> + Serialize + DeserializeOwned + Debug,
    T::DynamicType: Default,
{
    let api: Api<T> = Api::namespaced(client, namespace);
    let patch: Value = json!({ "metadata": { "finalizers": [] } });
    let patch = Patch::Merge(&patch);
    Ok(api
        .patch(name, &PatchParams::apply(MANAGER_NAME), &patch)
        .await?)
}

pub fn has_finalizer<T: Resource>(obj: &T) -> bool {
    obj.finalizers().iter().any(|f| f == FINALIZER_NAME)
}
