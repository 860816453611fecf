//! The Service (spec §4.6): the query surface the out-of-scope HTTP layer
//! calls. Thin orchestration over the Persister and the Binding Resolver —
//! no state machine logic lives here, only listing, lookup, and creation.

use access_types::{
    managed_role_name, AccessBinding, AccessRequest, AccessRequestSpec, ApplicationRef, AppProject, Application,
    RequestState, RoleRef, Subject, TemplateRef,
};
use kube::api::ObjectMeta;
use kube::Resource;
use uuid::Uuid;

use crate::persistence::Persister;
use crate::resolver::{self, Granting};
use crate::util::Error;

/// `(namespace, applicationName, applicationNamespace, username)` — the
/// HTTP layer's trusted-header tuple, carried everywhere the Service needs
/// to scope a query to one caller.
#[derive(Debug, Clone)]
pub struct RequestKey {
    pub namespace: String,
    pub app_name: String,
    pub app_namespace: String,
    pub username: String,
}

/// Optional sort applied by [`list_access_requests`] (spec §4.6: "sort by
/// state priority ascending, ordinal ascending, template-name ascending,
/// createdAt descending").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sort {
    None,
    Default,
}

pub async fn list_access_requests<P: Persister + ?Sized>(
    persister: &P,
    key: &RequestKey,
    sort: Sort,
) -> Result<Vec<AccessRequest>, Error> {
    let mut requests: Vec<AccessRequest> = persister
        .list_access_requests(&key.namespace)
        .await?
        .into_iter()
        .filter(|r| {
            r.spec.subject.username == key.username
                && r.spec.application.name == key.app_name
                && r.spec.application.namespace == key.app_namespace
        })
        .filter(|r| r.status.as_ref().and_then(|s| s.request_state) != Some(RequestState::Expired))
        .collect();

    if sort == Sort::Default {
        requests.sort_by(|a, b| {
            let state_a = RequestState::sort_priority(a.status.as_ref().and_then(|s| s.request_state));
            let state_b = RequestState::sort_priority(b.status.as_ref().and_then(|s| s.request_state));
            state_a
                .cmp(&state_b)
                .then_with(|| a.spec.role.ordinal.cmp(&b.spec.role.ordinal))
                .then_with(|| a.spec.role.template_ref.name.cmp(&b.spec.role.template_ref.name))
                .then_with(|| {
                    let created_a = a.meta().creation_timestamp.as_ref().map(|t| t.0);
                    let created_b = b.meta().creation_timestamp.as_ref().map(|t| t.0);
                    created_b.cmp(&created_a)
                })
        });
    }
    Ok(requests)
}

pub async fn get_access_request_by_role<P: Persister + ?Sized>(
    persister: &P,
    key: &RequestKey,
    template_name: &str,
) -> Result<Option<AccessRequest>, Error> {
    let requests = list_access_requests(persister, key, Sort::Default).await?;
    Ok(requests.into_iter().find(|r| r.spec.role.template_ref.name == template_name))
}

pub async fn get_granting_access_binding<P: Persister + ?Sized>(
    persister: &P,
    request_namespace: &str,
    home_namespace: &str,
    template_name: &str,
    user_groups: &[String],
    application: &Application,
    project: &AppProject,
) -> Result<Option<Granting>, Error> {
    resolver::find_granting_binding(
        persister,
        request_namespace,
        home_namespace,
        template_name,
        user_groups,
        application,
        project,
    )
    .await
}

pub async fn get_application<P: Persister + ?Sized>(
    persister: &P,
    namespace: &str,
    name: &str,
) -> Result<Option<Application>, Error> {
    persister.get_application(namespace, name).await
}

pub async fn get_app_project<P: Persister + ?Sized>(
    persister: &P,
    namespace: &str,
    name: &str,
) -> Result<Option<AppProject>, Error> {
    persister.get_app_project(namespace, name).await
}

/// Constructs and persists a fresh `AccessRequest` from a granting binding
/// (spec §4.6: "role derived from the binding (templateName, ordinal,
/// friendlyName), the configured default duration, and subject/application
/// from the key").
pub async fn create_access_request<P: Persister + ?Sized>(
    persister: &P,
    key: &RequestKey,
    binding: &AccessBinding,
    default_duration_seconds: i64,
) -> Result<AccessRequest, Error> {
    let name = format!(
        "{}-{}",
        managed_role_name(&binding.spec.role_template_ref.name, &key.app_namespace, &key.app_name).to_lowercase(),
        short_suffix()
    );
    let request = AccessRequest {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: Some(key.namespace.clone()),
            ..Default::default()
        },
        spec: AccessRequestSpec {
            duration_seconds: default_duration_seconds,
            role: RoleRef {
                template_ref: TemplateRef {
                    name: binding.spec.role_template_ref.name.clone(),
                    namespace: binding.meta().namespace.clone().unwrap_or_default(),
                },
                ordinal: binding.spec.ordinal,
                friendly_name: binding.spec.friendly_name.clone(),
            },
            application: ApplicationRef {
                name: key.app_name.clone(),
                namespace: key.app_namespace.clone(),
            },
            subject: Subject {
                username: key.username.clone(),
            },
        },
        status: None,
    };
    persister.create_access_request(request).await
}

fn short_suffix() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}
