//! Real `Persister` backed by a live `kube::Client`. Generalizes the
//! teacher's `util::patch`/`util::finalizer` JSON-merge-patch style to all
//! five resource kinds, and adds the optimistic-lock precondition spec
//! §4.2 requires: every merge patch that mutates shared state embeds the
//! `resourceVersion` it observed, so the API server rejects (409) a patch
//! built against a stale read.

use access_types::{
    template::RenderedTemplate, AccessBinding, AccessRequest, AccessRequestSpec, AppProject,
    AppProjectRole, Application, RoleTemplate,
};
use async_trait::async_trait;
use kube::{
    api::{ListParams, Patch, PatchParams, PostParams},
    Api, Client, ResourceExt,
};
use serde_json::json;

use super::{Persister, ProjectRolePatch};
use crate::util::{with_conflict_retry, Error, MANAGER_NAME};

#[derive(Clone)]
pub struct KubePersister {
    client: Client,
}

impl KubePersister {
    pub fn new(client: Client) -> Self {
        KubePersister { client }
    }

    fn ar_api(&self, namespace: &str) -> Api<AccessRequest> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn rt_api(&self, namespace: &str) -> Api<RoleTemplate> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn ab_api(&self, namespace: &str) -> Api<AccessBinding> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn app_api(&self, namespace: &str) -> Api<Application> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn proj_api(&self, namespace: &str) -> Api<AppProject> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

async fn get_opt<K>(api: &Api<K>, name: &str) -> Result<Option<K>, Error>
where
    K: kube::Resource + Clone + serde::de::DeserializeOwned + std::fmt::Debug,
{
    match api.get(name).await {
        Ok(obj) => Ok(Some(obj)),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl Persister for KubePersister {
    async fn get_access_request(&self, namespace: &str, name: &str) -> Result<Option<AccessRequest>, Error> {
        get_opt(&self.ar_api(namespace), name).await
    }

    async fn list_access_requests(&self, namespace: &str) -> Result<Vec<AccessRequest>, Error> {
        Ok(self.ar_api(namespace).list(&ListParams::default()).await?.items)
    }

    async fn create_access_request(&self, request: AccessRequest) -> Result<AccessRequest, Error> {
        let namespace = request.namespace().unwrap_or_default();
        Ok(self.ar_api(&namespace).create(&PostParams::default(), &request).await?)
    }

    async fn update_access_request_spec(
        &self,
        namespace: &str,
        name: &str,
        new_spec: AccessRequestSpec,
    ) -> Result<AccessRequest, Error> {
        let api = self.ar_api(namespace);
        with_conflict_retry(|| {
            let api = api.clone();
            let new_spec = new_spec.clone();
            let name = name.to_string();
            async move {
                let current = api.get(&name).await?;
                access_types::request::validate_immutable_update(&current.spec, &new_spec)
                    .map_err(|_| Error::UserInput("attempted to mutate an immutable AccessRequest field".into()))?;
                let rv = current.resource_version();
                let patch = json!({
                    "metadata": { "resourceVersion": rv },
                    "spec": new_spec,
                });
                Ok(api
                    .patch(&name, &PatchParams::apply(MANAGER_NAME), &Patch::Merge(&patch))
                    .await?)
            }
        })
        .await
    }

    async fn patch_access_request_status(
        &self,
        namespace: &str,
        name: &str,
        f: &(dyn Fn(&mut AccessRequest) + Send + Sync),
    ) -> Result<AccessRequest, Error> {
        let api = self.ar_api(namespace);
        with_conflict_retry(|| {
            let api = api.clone();
            let name = name.to_string();
            async move {
                let mut current = api.get(&name).await?;
                let rv = current.resource_version();
                f(&mut current);
                let patch = json!({
                    "metadata": { "resourceVersion": rv },
                    "status": current.status,
                });
                Ok(api
                    .patch_status(&name, &PatchParams::apply(MANAGER_NAME), &Patch::Merge(&patch))
                    .await?)
            }
        })
        .await
    }

    async fn add_access_request_finalizer(&self, namespace: &str, name: &str) -> Result<AccessRequest, Error> {
        crate::util::finalizer::add(self.client.clone(), name, namespace).await
    }

    async fn remove_access_request_finalizer(&self, namespace: &str, name: &str) -> Result<AccessRequest, Error> {
        crate::util::finalizer::remove(self.client.clone(), name, namespace).await
    }

    async fn delete_access_request(&self, namespace: &str, name: &str) -> Result<(), Error> {
        match self.ar_api(namespace).delete(name, &Default::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_role_template(&self, namespace: &str, name: &str) -> Result<Option<RoleTemplate>, Error> {
        get_opt(&self.rt_api(namespace), name).await
    }

    async fn get_access_binding(&self, namespace: &str, name: &str) -> Result<Option<AccessBinding>, Error> {
        get_opt(&self.ab_api(namespace), name).await
    }

    async fn list_access_bindings(&self, namespace: &str) -> Result<Vec<AccessBinding>, Error> {
        Ok(self.ab_api(namespace).list(&ListParams::default()).await?.items)
    }

    async fn get_application(&self, namespace: &str, name: &str) -> Result<Option<Application>, Error> {
        get_opt(&self.app_api(namespace), name).await
    }

    async fn get_app_project(&self, namespace: &str, name: &str) -> Result<Option<AppProject>, Error> {
        get_opt(&self.proj_api(namespace), name).await
    }

    async fn patch_app_project_role(
        &self,
        namespace: &str,
        project_name: &str,
        patch: ProjectRolePatch,
    ) -> Result<(), Error> {
        let api = self.proj_api(namespace);
        with_conflict_retry(|| {
            let api = api.clone();
            let project_name = project_name.to_string();
            let patch = patch.clone();
            async move {
                let current = api.get(&project_name).await?;
                let rv = current.resource_version();
                let mut roles = current.spec.roles.clone();
                match roles.iter_mut().find(|r| r.name == patch.role_name) {
                    Some(role) => {
                        role.description = patch.description.clone();
                        role.policies = patch.policies.clone();
                        role.jwt_tokens.clear();
                        if let Some(groups) = &patch.groups {
                            role.groups = groups.clone();
                        }
                    }
                    None => roles.push(AppProjectRole {
                        name: patch.role_name.clone(),
                        description: patch.description.clone(),
                        policies: patch.policies.clone(),
                        groups: patch.groups.clone().unwrap_or_default(),
                        jwt_tokens: Vec::new(),
                    }),
                }
                let body = json!({
                    "metadata": { "resourceVersion": rv },
                    "spec": { "roles": roles },
                });
                api.patch(
                    &project_name,
                    &PatchParams::apply(MANAGER_NAME),
                    &Patch::Merge(&body),
                )
                .await?;
                Ok(())
            }
        })
        .await
    }

    async fn revoke_app_project_role(
        &self,
        namespace: &str,
        project_name: &str,
        role_name: &str,
        subject: &str,
        template: Option<&RenderedTemplate>,
    ) -> Result<(), Error> {
        let api = self.proj_api(namespace);
        with_conflict_retry(|| {
            let api = api.clone();
            let project_name = project_name.to_string();
            let role_name = role_name.to_string();
            let subject = subject.to_string();
            async move {
                let current = match get_opt(&api, &project_name).await? {
                    Some(p) => p,
                    // Missing project: nothing to remove (spec §4.2).
                    None => return Ok(()),
                };
                let rv = current.resource_version();
                let mut roles = current.spec.roles.clone();
                let Some(role) = roles.iter_mut().find(|r| r.name == role_name) else {
                    // Managed role already gone: nothing to remove.
                    return Ok(());
                };
                role.groups.retain(|g| g != &subject);
                if let Some(t) = &template {
                    role.description = t.description.clone();
                    role.policies = t.policies.clone();
                }
                role.jwt_tokens.clear();
                let body = json!({
                    "metadata": { "resourceVersion": rv },
                    "spec": { "roles": roles },
                });
                api.patch(
                    &project_name,
                    &PatchParams::apply(MANAGER_NAME),
                    &Patch::Merge(&body),
                )
                .await?;
                Ok(())
            }
        })
        .await
    }
}
