//! The reconciler (spec §4.1): the level-triggered state machine that
//! turns an `AccessRequest` plus its collaborators (`RoleTemplate`,
//! `Application`, `AppProject`) into a sequence of gated steps, each of
//! which either mutates status and returns or falls through to the next
//! gate. Every persisted transition goes through
//! [`AccessRequestStatus::push_transition`], so duplicate transitions are
//! suppressed for free (invariant P1).
//!
//! This module is transport-agnostic: it knows nothing about
//! `kube_runtime::Controller`. The dispatcher in `bin/controller.rs` wraps
//! [`reconcile`] to satisfy that trait's `reconcile_fn` signature and maps
//! [`Requeue`] onto `kube::runtime::controller::Action`.

use std::time::Duration as StdDuration;

use access_types::template::RenderedTemplate;
use access_types::{managed_role_name, AccessRequest, AccessRequestStatus, Application, RequestState};
use chrono::{DateTime, Utc};
use kube::Resource;

use crate::index::Index;
use crate::persistence::Persister;
use crate::plugin::{GrantStatus, Plugin};
use crate::util::config::ControllerConfig;
use crate::util::{finalizer, Error};

/// What the dispatcher should do once this reconcile invocation returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requeue {
    /// No further reconcile is scheduled absent an external change.
    None,
    /// Requeue after a relative delay (used for the plugin-poll cadence).
    After(StdDuration),
    /// Requeue at an absolute instant (used for expiry and TTL deadlines).
    At(DateTime<Utc>),
}

pub struct ReconcileDeps<'a> {
    pub persister: &'a dyn Persister,
    pub plugin: Option<&'a dyn Plugin>,
    pub index: &'a Index,
    pub config: &'a ControllerConfig,
    /// The controller's own namespace, consulted as the global policy
    /// bucket by the Binding Resolver. Unused directly by the reconciler,
    /// but threaded through so callers share one deps struct end to end.
    pub home_namespace: &'a str,
}

/// Runs one reconcile pass for `(namespace, name)`. Returns `Ok(None)`-ish
/// behavior (via `Requeue::None`) when the object no longer exists — the
/// dispatcher's watch will simply not fire again for it.
pub async fn reconcile(deps: &ReconcileDeps<'_>, namespace: &str, name: &str, now: DateTime<Utc>) -> Result<Requeue, Error> {
    let Some(request) = deps.persister.get_access_request(namespace, name).await? else {
        return Ok(Requeue::None);
    };

    // 2. Finalizer gate.
    if request.meta().deletion_timestamp.is_some() {
        let already_expired = request
            .status
            .as_ref()
            .and_then(|s| s.request_state)
            == Some(RequestState::Expired);
        if !already_expired {
            revoke(deps, &request).await?;
        }
        if finalizer::has_finalizer(&request) {
            deps.persister.remove_access_request_finalizer(namespace, name).await?;
        }
        return Ok(Requeue::None);
    }
    if !finalizer::has_finalizer(&request) {
        deps.persister.add_access_request_finalizer(namespace, name).await?;
        return Ok(Requeue::After(StdDuration::ZERO));
    }

    let mut status = request.status.clone().unwrap_or_default();

    // 3. TTL gate.
    if let Some(ttl) = deps.config.request_ttl {
        if status.is_concluded(now) {
            if let Some(last) = status.last_transition_time() {
                if now > last + to_chrono(ttl) {
                    deps.persister.delete_access_request(namespace, name).await?;
                    return Ok(Requeue::None);
                }
            }
        }
    }

    // 4. Terminal gate.
    if status.is_concluded(now) {
        let requeue = match (deps.config.request_ttl, status.last_transition_time()) {
            (Some(ttl), Some(last)) => Requeue::At(last + to_chrono(ttl)),
            _ => Requeue::None,
        };
        return Ok(requeue);
    }

    // 5. Duplicate validation.
    if let Some(detail) = find_conflict(deps, &request, now).await? {
        persist_transition(deps.persister, namespace, name, &mut status, now, RequestState::Invalid, Some(detail)).await?;
        return Ok(Requeue::None);
    }

    // 6. Resolve collaborators.
    let app = match deps
        .persister
        .get_application(&request.spec.application.namespace, &request.spec.application.name)
        .await?
    {
        Some(app) => app,
        None => {
            if status.target_project.is_some() {
                revoke(deps, &request).await?;
            }
            persist_transition(
                deps.persister,
                namespace,
                name,
                &mut status,
                now,
                RequestState::Invalid,
                Some("referenced application was not found".to_string()),
            )
            .await?;
            return Ok(Requeue::None);
        }
    };

    let role_name = managed_role_name(
        &request.spec.role.template_ref.name,
        &request.spec.application.namespace,
        &request.spec.application.name,
    );
    let rendered = match render_template(deps, &request, &app, &role_name).await? {
        TemplateLookup::Found(rendered) => rendered,
        TemplateLookup::Missing => {
            if status.target_project.is_none() {
                persist_transition(
                    deps.persister,
                    namespace,
                    name,
                    &mut status,
                    now,
                    RequestState::Invalid,
                    Some("referenced role template was not found".to_string()),
                )
                .await?;
                return Ok(Requeue::None);
            }
            return Err(Error::UserInput("referenced role template was not found".to_string()));
        }
        TemplateLookup::RenderFailed(e) => {
            persist_transition(
                deps.persister,
                namespace,
                name,
                &mut status,
                now,
                RequestState::Invalid,
                Some(format!("template render failed: {e}")),
            )
            .await?;
            return Ok(Requeue::None);
        }
    };

    // 7. Project required.
    if app.spec.project.is_empty() {
        persist_transition(
            deps.persister,
            namespace,
            name,
            &mut status,
            now,
            RequestState::Invalid,
            Some("application has no project".to_string()),
        )
        .await?;
        return Ok(Requeue::None);
    }

    // 8. Expiry check.
    if let Some(expires_at) = status.expires_at {
        if now >= expires_at {
            revoke(deps, &request).await?;
            persist_transition(deps.persister, namespace, name, &mut status, now, RequestState::Expired, None).await?;
            return Ok(Requeue::None);
        }
    }

    // 9. Initialize status.
    if status.request_state.is_none() {
        status.target_project = Some(app.spec.project.clone());
        status.role_name = Some(rendered.role_name.clone());
        status.role_template_hash = Some(rendered.content_hash());
        persist_transition(deps.persister, namespace, name, &mut status, now, RequestState::Initiated, None).await?;
    }

    // 10. Granted short-circuit.
    if status.request_state == Some(RequestState::Granted) {
        crate::policy::sync_role(deps.persister, &request.spec.application.namespace, &app.spec.project, &rendered).await?;
        let hash = rendered.content_hash();
        if status.role_template_hash.as_deref() != Some(hash.as_str()) {
            status.role_template_hash = Some(hash);
            write_status(deps.persister, namespace, name, status.clone()).await?;
        }
        return Ok(Requeue::At(status.expires_at.unwrap_or(now)));
    }

    // 12. Timeout gate. Checked against the status as last persisted
    // (before this round's plugin call) so a perpetually-Pending plugin
    // cannot keep re-writing `Requested` and dodging the timeout forever
    // (spec §8 scenario 6).
    if let Some(timeout) = deps.config.request_timeout {
        let in_flight = matches!(status.request_state, Some(RequestState::Initiated) | Some(RequestState::Requested));
        if in_flight {
            if let Some(last) = status.last_transition_time() {
                if now >= last + to_chrono(timeout) {
                    persist_transition(
                        deps.persister,
                        namespace,
                        name,
                        &mut status,
                        now,
                        RequestState::Timeout,
                        Some("timed out waiting for a grant decision".to_string()),
                    )
                    .await?;
                    return Ok(Requeue::None);
                }
            }
        }
    }

    // 11. Plugin decision.
    if let Some(plugin) = deps.plugin {
        let mut snapshot = request.clone();
        snapshot.status = Some(status.clone());
        let response = plugin.grant_access(&snapshot, &app).await?;
        match response.status {
            GrantStatus::Granted => {}
            GrantStatus::Pending => {
                persist_transition(deps.persister, namespace, name, &mut status, now, RequestState::Requested, response.message).await?;
                return Ok(Requeue::After(deps.config.requeue_interval));
            }
            GrantStatus::Denied => {
                persist_transition(deps.persister, namespace, name, &mut status, now, RequestState::Denied, response.message).await?;
                return Ok(Requeue::None);
            }
        }
    }

    // 13. Mutation.
    crate::policy::grant(
        deps.persister,
        &request.spec.application.namespace,
        &app.spec.project,
        &request.spec.subject.username,
        &rendered,
    )
    .await?;
    let expires_at = now + request.spec.duration();
    status.expires_at = Some(expires_at);
    persist_transition(deps.persister, namespace, name, &mut status, now, RequestState::Granted, None).await?;
    Ok(Requeue::At(expires_at))
}

enum TemplateLookup {
    Found(RenderedTemplate),
    Missing,
    RenderFailed(access_types::RenderError),
}

async fn render_template(
    deps: &ReconcileDeps<'_>,
    request: &AccessRequest,
    app: &Application,
    role_name: &str,
) -> Result<TemplateLookup, Error> {
    let Some(template) = deps
        .persister
        .get_role_template(&request.spec.role.template_ref.namespace, &request.spec.role.template_ref.name)
        .await?
    else {
        return Ok(TemplateLookup::Missing);
    };
    match template.spec.render(
        role_name,
        &app.spec.project,
        &request.spec.application.name,
        &request.spec.application.namespace,
    ) {
        Ok(rendered) => Ok(TemplateLookup::Found(rendered)),
        Err(e) => Ok(TemplateLookup::RenderFailed(e)),
    }
}

async fn find_conflict(deps: &ReconcileDeps<'_>, request: &AccessRequest, _now: DateTime<Utc>) -> Result<Option<String>, Error> {
    let namespace = request.meta().namespace.clone().unwrap_or_default();
    let name = request.meta().name.clone().unwrap_or_default();
    let keys = deps.index.requests_for_subject_app(
        &namespace,
        &request.spec.subject.username,
        &request.spec.application.name,
        &request.spec.application.namespace,
    );
    let this_created = request.meta().creation_timestamp.as_ref().map(|t| t.0);
    for (other_ns, other_name) in keys {
        if other_ns == namespace && other_name == name {
            continue;
        }
        let Some(other) = deps.persister.get_access_request(&other_ns, &other_name).await? else {
            continue;
        };
        if other.spec.role.template_ref != request.spec.role.template_ref {
            continue;
        }
        let other_state = other.status.as_ref().and_then(|s| s.request_state);
        if matches!(other_state, Some(RequestState::Requested) | Some(RequestState::Granted)) {
            return Ok(Some(format!("found conflicting request {other_name} in state {other_state:?}")));
        }
        if other_state.is_none() && request.status.as_ref().and_then(|s| s.request_state).is_none() {
            let other_created = other.meta().creation_timestamp.as_ref().map(|t| t.0);
            if other_created < this_created {
                return Ok(Some(format!("found older uninitialized request {other_name}")));
            }
        }
    }
    Ok(None)
}

async fn revoke(deps: &ReconcileDeps<'_>, request: &AccessRequest) -> Result<(), Error> {
    let Some(status) = &request.status else { return Ok(()) };
    let (Some(project), Some(role_name)) = (status.target_project.clone(), status.role_name.clone()) else {
        return Ok(());
    };
    let template = match deps
        .persister
        .get_role_template(&request.spec.role.template_ref.namespace, &request.spec.role.template_ref.name)
        .await
    {
        Ok(Some(template)) => template
            .spec
            .render(&role_name, &project, &request.spec.application.name, &request.spec.application.namespace)
            .ok(),
        _ => None,
    };
    crate::policy::remove_managed_access(
        deps.persister,
        &request.spec.application.namespace,
        &project,
        &role_name,
        &request.spec.subject.username,
        template.as_ref(),
    )
    .await
}

async fn persist_transition(
    persister: &dyn Persister,
    namespace: &str,
    name: &str,
    status: &mut AccessRequestStatus,
    now: DateTime<Utc>,
    state: RequestState,
    detail: Option<String>,
) -> Result<(), Error> {
    status.push_transition(now, state, detail);
    write_status(persister, namespace, name, status.clone()).await
}

async fn write_status(persister: &dyn Persister, namespace: &str, name: &str, status: AccessRequestStatus) -> Result<(), Error> {
    persister
        .patch_access_request_status(namespace, name, &move |r: &mut AccessRequest| {
            r.status = Some(status.clone());
        })
        .await?;
    Ok(())
}

fn to_chrono(d: StdDuration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::zero())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::memory::MemoryPersister;
    use crate::plugin::NilPlugin;
    use crate::util::config::ControllerConfig;
    use access_types::{
        AccessRequestSpec, ApplicationRef, ApplicationSpec, AppProject, AppProjectSpec, RoleRef, RoleTemplate,
        RoleTemplateSpec, Subject, TemplateRef,
    };
    use kube::api::ObjectMeta;
    use std::time::Duration as StdDuration;

    fn deps<'a>(persister: &'a MemoryPersister, index: &'a Index, config: &'a ControllerConfig, plugin: &'a NilPlugin) -> ReconcileDeps<'a> {
        ReconcileDeps {
            persister,
            plugin: Some(plugin),
            index,
            config,
            home_namespace: "ns",
        }
    }

    fn deps_with_plugin<'a>(
        persister: &'a MemoryPersister,
        index: &'a Index,
        config: &'a ControllerConfig,
        plugin: &'a dyn crate::plugin::Plugin,
    ) -> ReconcileDeps<'a> {
        ReconcileDeps {
            persister,
            plugin: Some(plugin),
            index,
            config,
            home_namespace: "ns",
        }
    }

    /// Returns a fixed sequence of `GrantAccess` responses, repeating the
    /// last one once exhausted — stands in for a real plugin transport in
    /// scenario 5/6 tests (spec §8).
    struct StubPlugin {
        responses: std::sync::Mutex<Vec<crate::plugin::GrantStatus>>,
    }

    #[async_trait::async_trait]
    impl crate::plugin::Plugin for StubPlugin {
        async fn init(&self) -> Result<(), Error> {
            Ok(())
        }

        async fn grant_access(
            &self,
            _request: &AccessRequest,
            _app: &Application,
        ) -> Result<crate::plugin::GrantResponse, Error> {
            let mut responses = self.responses.lock().unwrap();
            let status = if responses.len() > 1 { responses.remove(0) } else { responses[0] };
            Ok(crate::plugin::GrantResponse { status, message: None })
        }

        async fn revoke_access(
            &self,
            _request: &AccessRequest,
            _app: &Application,
        ) -> Result<crate::plugin::RevokeResponse, Error> {
            Ok(crate::plugin::RevokeResponse {
                status: crate::plugin::RevokeStatus::Revoked,
                message: None,
            })
        }
    }

    fn base_request(name: &str) -> AccessRequest {
        AccessRequest {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("ns".to_string()),
                finalizers: Some(vec![crate::util::FINALIZER_NAME.to_string()]),
                creation_timestamp: Some(kube::core::Time(Utc::now())),
                ..Default::default()
            },
            spec: AccessRequestSpec {
                duration_seconds: 300,
                role: RoleRef {
                    template_ref: TemplateRef {
                        name: "T".to_string(),
                        namespace: "ns".to_string(),
                    },
                    ordinal: 0,
                    friendly_name: None,
                },
                application: ApplicationRef {
                    name: "frontend".to_string(),
                    namespace: "apps".to_string(),
                },
                subject: Subject {
                    username: "alice".to_string(),
                },
            },
            status: None,
        }
    }

    fn template() -> RoleTemplate {
        RoleTemplate {
            metadata: ObjectMeta {
                name: Some("T".to_string()),
                namespace: Some("ns".to_string()),
                ..Default::default()
            },
            spec: RoleTemplateSpec {
                description: "d".to_string(),
                policies: vec!["p".to_string()],
            },
        }
    }

    fn application() -> access_types::Application {
        access_types::Application {
            metadata: ObjectMeta {
                name: Some("frontend".to_string()),
                namespace: Some("apps".to_string()),
                ..Default::default()
            },
            spec: ApplicationSpec {
                project: "p1".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn missing_finalizer_is_added_before_anything_else() {
        let p = MemoryPersister::new();
        let mut req = base_request("r1");
        req.meta_mut().finalizers = None;
        p.put_request(req);
        let index = Index::new();
        let config = ControllerConfig::default();
        let plugin = NilPlugin;
        let d = deps(&p, &index, &config, &plugin);
        let result = reconcile(&d, "ns", "r1", Utc::now()).await.unwrap();
        assert_eq!(result, Requeue::After(StdDuration::ZERO));
        let stored = p.get_access_request("ns", "r1").await.unwrap().unwrap();
        assert!(finalizer::has_finalizer(&stored));
    }

    #[tokio::test]
    async fn full_happy_path_grants_then_expires() {
        let p = MemoryPersister::new();
        p.put_request(base_request("r1"));
        p.put_template(template());
        p.put_application(application());
        p.put_project(AppProject {
            metadata: ObjectMeta {
                name: Some("p1".to_string()),
                namespace: Some("apps".to_string()),
                ..Default::default()
            },
            spec: AppProjectSpec::default(),
        });
        let index = Index::new();
        let config = ControllerConfig::default();
        let plugin = NilPlugin;
        let d = deps(&p, &index, &config, &plugin);

        let now = Utc::now();
        let result = reconcile(&d, "ns", "r1", now).await.unwrap();
        let req = p.get_access_request("ns", "r1").await.unwrap().unwrap();
        assert_eq!(req.status.as_ref().unwrap().request_state, Some(RequestState::Granted));
        assert!(matches!(result, Requeue::At(_)));

        let project = p.get_project("apps", "p1").unwrap();
        let role = project.spec.find_role("ephemeral-T-apps-frontend").unwrap();
        assert_eq!(role.groups, vec!["alice".to_string()]);

        let later = now + chrono::Duration::seconds(301);
        reconcile(&d, "ns", "r1", later).await.unwrap();
        let req = p.get_access_request("ns", "r1").await.unwrap().unwrap();
        assert_eq!(req.status.as_ref().unwrap().request_state, Some(RequestState::Expired));
        let project = p.get_project("apps", "p1").unwrap();
        let role = project.spec.find_role("ephemeral-T-apps-frontend").unwrap();
        assert!(role.groups.is_empty());
    }

    #[tokio::test]
    async fn missing_application_at_initialization_marks_invalid() {
        let p = MemoryPersister::new();
        p.put_request(base_request("r1"));
        p.put_template(template());
        let index = Index::new();
        let config = ControllerConfig::default();
        let plugin = NilPlugin;
        let d = deps(&p, &index, &config, &plugin);
        reconcile(&d, "ns", "r1", Utc::now()).await.unwrap();
        let req = p.get_access_request("ns", "r1").await.unwrap().unwrap();
        assert_eq!(req.status.as_ref().unwrap().request_state, Some(RequestState::Invalid));
    }

    #[tokio::test]
    async fn race_dedup_leaves_exactly_one_non_invalid() {
        let p = MemoryPersister::new();
        let mut r1 = base_request("r1");
        r1.meta_mut().creation_timestamp = Some(kube::core::Time(Utc::now() - chrono::Duration::seconds(1)));
        let r2 = base_request("r2");
        p.put_request(r1);
        p.put_request(r2);
        p.put_template(template());
        p.put_application(application());
        p.put_project(AppProject {
            metadata: ObjectMeta {
                name: Some("p1".to_string()),
                namespace: Some("apps".to_string()),
                ..Default::default()
            },
            spec: AppProjectSpec::default(),
        });
        let index = Index::new();
        index.seed(&p.list_access_requests("ns").await.unwrap());
        let config = ControllerConfig::default();
        let plugin = NilPlugin;
        let d = deps(&p, &index, &config, &plugin);

        reconcile(&d, "ns", "r1", Utc::now()).await.unwrap();
        reconcile(&d, "ns", "r2", Utc::now()).await.unwrap();

        let r1 = p.get_access_request("ns", "r1").await.unwrap().unwrap();
        let r2 = p.get_access_request("ns", "r2").await.unwrap().unwrap();
        let states = [
            r1.status.as_ref().and_then(|s| s.request_state),
            r2.status.as_ref().and_then(|s| s.request_state),
        ];
        assert_eq!(states.iter().filter(|s| **s == Some(RequestState::Invalid)).count(), 1);
        assert_eq!(states.iter().filter(|s| **s != Some(RequestState::Invalid)).count(), 1);
    }

    #[tokio::test]
    async fn immutable_field_change_is_rejected_at_the_persister_boundary() {
        let p = MemoryPersister::new();
        p.put_request(base_request("r1"));
        let mut new_spec = base_request("r1").spec;
        new_spec.role.template_ref.name = "Other".to_string();
        let result = p.update_access_request_spec("ns", "r1", new_spec).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn template_policy_change_propagates_to_granted_requests() {
        let p = MemoryPersister::new();
        p.put_request(base_request("r1"));
        p.put_template(template());
        p.put_application(application());
        p.put_project(AppProject {
            metadata: ObjectMeta {
                name: Some("p1".to_string()),
                namespace: Some("apps".to_string()),
                ..Default::default()
            },
            spec: AppProjectSpec::default(),
        });
        let index = Index::new();
        let config = ControllerConfig::default();
        let plugin = NilPlugin;
        let d = deps(&p, &index, &config, &plugin);
        let now = Utc::now();
        reconcile(&d, "ns", "r1", now).await.unwrap();

        let mut updated_template = template();
        updated_template.spec.policies = vec!["p2".to_string()];
        p.put_template(updated_template);

        reconcile(&d, "ns", "r1", now).await.unwrap();
        let project = p.get_project("apps", "p1").unwrap();
        let role = project.spec.find_role("ephemeral-T-apps-frontend").unwrap();
        assert_eq!(role.policies, vec!["p2".to_string()]);
        assert_eq!(role.groups, vec!["alice".to_string()]);
    }

    #[tokio::test]
    async fn plugin_pending_then_granted_reaches_granted() {
        // Spec §8 scenario 5: Pending x3, then Granted.
        let p = MemoryPersister::new();
        p.put_request(base_request("r1"));
        p.put_template(template());
        p.put_application(application());
        p.put_project(AppProject {
            metadata: ObjectMeta {
                name: Some("p1".to_string()),
                namespace: Some("apps".to_string()),
                ..Default::default()
            },
            spec: AppProjectSpec::default(),
        });
        let index = Index::new();
        let config = ControllerConfig::default();
        let plugin = StubPlugin {
            responses: std::sync::Mutex::new(vec![
                crate::plugin::GrantStatus::Pending,
                crate::plugin::GrantStatus::Pending,
                crate::plugin::GrantStatus::Pending,
                crate::plugin::GrantStatus::Granted,
            ]),
        };
        let d = deps_with_plugin(&p, &index, &config, &plugin);

        let now = Utc::now();
        // First reconcile initializes status (Initiated) and, in the same
        // invocation, consults the plugin for the first time (Pending),
        // landing on Requested.
        reconcile(&d, "ns", "r1", now).await.unwrap();
        let req = p.get_access_request("ns", "r1").await.unwrap().unwrap();
        assert_eq!(req.status.as_ref().unwrap().request_state, Some(RequestState::Requested));

        // Two more Pending responses keep it at Requested, deduplicated in
        // history (same state, same absent message).
        for _ in 0..2 {
            reconcile(&d, "ns", "r1", now).await.unwrap();
            let req = p.get_access_request("ns", "r1").await.unwrap().unwrap();
            assert_eq!(req.status.as_ref().unwrap().request_state, Some(RequestState::Requested));
        }

        // Fourth plugin call returns Granted.
        reconcile(&d, "ns", "r1", now).await.unwrap();
        let req = p.get_access_request("ns", "r1").await.unwrap().unwrap();
        assert_eq!(req.status.as_ref().unwrap().request_state, Some(RequestState::Granted));
        assert_eq!(req.status.as_ref().unwrap().history.len(), 3);
    }

    #[tokio::test]
    async fn perpetually_pending_plugin_times_out_with_no_project_mutation() {
        // Spec §8 scenario 6: timeout configured at 1s, plugin always
        // Pending; the request reaches Timeout and no project mutation
        // occurs (regression test for the step-11/step-12 ordering bug).
        let p = MemoryPersister::new();
        p.put_request(base_request("r1"));
        p.put_template(template());
        p.put_application(application());
        p.put_project(AppProject {
            metadata: ObjectMeta {
                name: Some("p1".to_string()),
                namespace: Some("apps".to_string()),
                ..Default::default()
            },
            spec: AppProjectSpec::default(),
        });
        let index = Index::new();
        let mut config = ControllerConfig::default();
        config.request_timeout = Some(StdDuration::from_secs(1));
        let plugin = StubPlugin {
            responses: std::sync::Mutex::new(vec![crate::plugin::GrantStatus::Pending]),
        };
        let d = deps_with_plugin(&p, &index, &config, &plugin);

        let now = Utc::now();
        // First call initializes status and immediately consults the
        // perpetually-Pending plugin, landing on Requested; the second call
        // re-consults it and stays Requested (deduplicated in history).
        reconcile(&d, "ns", "r1", now).await.unwrap();
        reconcile(&d, "ns", "r1", now).await.unwrap();
        let req = p.get_access_request("ns", "r1").await.unwrap().unwrap();
        assert_eq!(req.status.as_ref().unwrap().request_state, Some(RequestState::Requested));

        let after_timeout = now + chrono::Duration::seconds(2);
        let result = reconcile(&d, "ns", "r1", after_timeout).await.unwrap();
        assert_eq!(result, Requeue::None);
        let req = p.get_access_request("ns", "r1").await.unwrap().unwrap();
        assert_eq!(req.status.as_ref().unwrap().request_state, Some(RequestState::Timeout));
        assert!(req.status.as_ref().unwrap().expires_at.is_none());

        let project = p.get_project("apps", "p1").unwrap();
        assert!(project.spec.find_role("ephemeral-T-apps-frontend").is_none());
    }
}
