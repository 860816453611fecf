//! In-memory fake [`Persister`] used by reconciler/policy/service unit
//! tests so the control-flow logic can be exercised without a cluster
//! (spec §8's testable properties are asserted directly against this
//! fake).

use std::collections::HashMap;
use std::sync::Mutex;

use access_types::{
    template::RenderedTemplate, AccessBinding, AccessRequest, AccessRequestSpec, AppProject,
    AppProjectRole, Application, RoleTemplate,
};
use async_trait::async_trait;
use kube::api::ObjectMeta;
use kube::ResourceExt;

use super::{Persister, ProjectRolePatch};
use crate::util::Error;

type Key = (String, String);

#[derive(Default)]
pub struct MemoryPersister {
    requests: Mutex<HashMap<Key, AccessRequest>>,
    templates: Mutex<HashMap<Key, RoleTemplate>>,
    bindings: Mutex<HashMap<Key, AccessBinding>>,
    applications: Mutex<HashMap<Key, Application>>,
    projects: Mutex<HashMap<Key, AppProject>>,
    next_rv: Mutex<u64>,
}

impl MemoryPersister {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump_rv(&self) -> String {
        let mut rv = self.next_rv.lock().unwrap();
        *rv += 1;
        rv.to_string()
    }

    pub fn put_request(&self, mut req: AccessRequest) {
        if req.resource_version().is_none() {
            req.meta_mut().resource_version = Some(self.bump_rv());
        }
        let key = (req.namespace().unwrap_or_default(), req.name_any());
        self.requests.lock().unwrap().insert(key, req);
    }

    pub fn put_template(&self, tpl: RoleTemplate) {
        let key = (tpl.namespace().unwrap_or_default(), tpl.name_any());
        self.templates.lock().unwrap().insert(key, tpl);
    }

    pub fn put_binding(&self, b: AccessBinding) {
        let key = (b.namespace().unwrap_or_default(), b.name_any());
        self.bindings.lock().unwrap().insert(key, b);
    }

    pub fn put_application(&self, a: Application) {
        let key = (a.namespace().unwrap_or_default(), a.name_any());
        self.applications.lock().unwrap().insert(key, a);
    }

    pub fn put_project(&self, p: AppProject) {
        let key = (p.namespace().unwrap_or_default(), p.name_any());
        self.projects.lock().unwrap().insert(key, p);
    }

    pub fn get_project(&self, namespace: &str, name: &str) -> Option<AppProject> {
        self.projects
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }
}

#[async_trait]
impl Persister for MemoryPersister {
    async fn get_access_request(&self, namespace: &str, name: &str) -> Result<Option<AccessRequest>, Error> {
        Ok(self
            .requests
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn list_access_requests(&self, namespace: &str) -> Result<Vec<AccessRequest>, Error> {
        Ok(self
            .requests
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.namespace().as_deref() == Some(namespace))
            .cloned()
            .collect())
    }

    async fn create_access_request(&self, mut request: AccessRequest) -> Result<AccessRequest, Error> {
        request.meta_mut().resource_version = Some(self.bump_rv());
        let key = (request.namespace().unwrap_or_default(), request.name_any());
        self.requests.lock().unwrap().insert(key, request.clone());
        Ok(request)
    }

    async fn update_access_request_spec(
        &self,
        namespace: &str,
        name: &str,
        new_spec: AccessRequestSpec,
    ) -> Result<AccessRequest, Error> {
        let mut guard = self.requests.lock().unwrap();
        let key = (namespace.to_string(), name.to_string());
        let current = guard
            .get(&key)
            .ok_or_else(|| Error::UserInput("not found".into()))?;
        access_types::request::validate_immutable_update(&current.spec, &new_spec)
            .map_err(|_| Error::UserInput("attempted to mutate an immutable AccessRequest field".into()))?;
        let mut updated = current.clone();
        updated.spec = new_spec;
        updated.meta_mut().resource_version = Some(self.bump_rv());
        guard.insert(key, updated.clone());
        Ok(updated)
    }

    async fn patch_access_request_status(
        &self,
        namespace: &str,
        name: &str,
        f: &(dyn Fn(&mut AccessRequest) + Send + Sync),
    ) -> Result<AccessRequest, Error> {
        let mut guard = self.requests.lock().unwrap();
        let key = (namespace.to_string(), name.to_string());
        let mut current = guard
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::UserInput("not found".into()))?;
        f(&mut current);
        current.meta_mut().resource_version = Some(self.bump_rv());
        guard.insert(key, current.clone());
        Ok(current)
    }

    async fn add_access_request_finalizer(&self, namespace: &str, name: &str) -> Result<AccessRequest, Error> {
        let mut guard = self.requests.lock().unwrap();
        let key = (namespace.to_string(), name.to_string());
        let mut current = guard
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::UserInput("not found".into()))?;
        if !current.finalizers().iter().any(|f| f == crate::util::FINALIZER_NAME) {
            current.meta_mut().finalizers.get_or_insert_with(Vec::new).push(crate::util::FINALIZER_NAME.to_string());
        }
        guard.insert(key, current.clone());
        Ok(current)
    }

    async fn remove_access_request_finalizer(&self, namespace: &str, name: &str) -> Result<AccessRequest, Error> {
        let mut guard = self.requests.lock().unwrap();
        let key = (namespace.to_string(), name.to_string());
        let mut current = guard
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::UserInput("not found".into()))?;
        if let Some(fins) = current.meta_mut().finalizers.as_mut() {
            fins.retain(|f| f != crate::util::FINALIZER_NAME);
        }
        guard.insert(key, current.clone());
        Ok(current)
    }

    async fn delete_access_request(&self, namespace: &str, name: &str) -> Result<(), Error> {
        self.requests
            .lock()
            .unwrap()
            .remove(&(namespace.to_string(), name.to_string()));
        Ok(())
    }

    async fn get_role_template(&self, namespace: &str, name: &str) -> Result<Option<RoleTemplate>, Error> {
        Ok(self
            .templates
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn get_access_binding(&self, namespace: &str, name: &str) -> Result<Option<AccessBinding>, Error> {
        Ok(self
            .bindings
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn list_access_bindings(&self, namespace: &str) -> Result<Vec<AccessBinding>, Error> {
        Ok(self
            .bindings
            .lock()
            .unwrap()
            .values()
            .filter(|b| b.namespace().as_deref() == Some(namespace))
            .cloned()
            .collect())
    }

    async fn get_application(&self, namespace: &str, name: &str) -> Result<Option<Application>, Error> {
        Ok(self
            .applications
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn get_app_project(&self, namespace: &str, name: &str) -> Result<Option<AppProject>, Error> {
        Ok(self
            .projects
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn patch_app_project_role(
        &self,
        namespace: &str,
        project_name: &str,
        patch: ProjectRolePatch,
    ) -> Result<(), Error> {
        let mut guard = self.projects.lock().unwrap();
        let key = (namespace.to_string(), project_name.to_string());
        let mut project = guard.get(&key).cloned().unwrap_or_else(|| AppProject {
            metadata: ObjectMeta {
                name: Some(project_name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            spec: Default::default(),
        });
        match project.spec.find_role_mut(&patch.role_name) {
            Some(role) => {
                role.description = patch.description.clone();
                role.policies = patch.policies.clone();
                role.jwt_tokens.clear();
                if let Some(groups) = &patch.groups {
                    role.groups = groups.clone();
                }
            }
            None => project.spec.roles.push(AppProjectRole {
                name: patch.role_name.clone(),
                description: patch.description.clone(),
                policies: patch.policies.clone(),
                groups: patch.groups.clone().unwrap_or_default(),
                jwt_tokens: Vec::new(),
            }),
        }
        guard.insert(key, project);
        Ok(())
    }

    async fn revoke_app_project_role(
        &self,
        namespace: &str,
        project_name: &str,
        role_name: &str,
        subject: &str,
        template: Option<&RenderedTemplate>,
    ) -> Result<(), Error> {
        let mut guard = self.projects.lock().unwrap();
        let key = (namespace.to_string(), project_name.to_string());
        let Some(project) = guard.get_mut(&key) else {
            return Ok(());
        };
        let Some(role) = project.spec.find_role_mut(role_name) else {
            return Ok(());
        };
        role.groups.retain(|g| g != subject);
        if let Some(t) = template {
            role.description = t.description.clone();
            role.policies = t.policies.clone();
        }
        role.jwt_tokens.clear();
        Ok(())
    }
}
