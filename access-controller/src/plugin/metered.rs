//! Wraps any [`Plugin`] with the `(plugin_operation, outcome)` counter
//! named in spec §6, so metrics collection is orthogonal to which
//! transport is configured (spec §4.5's additions in `SPEC_FULL.md`).
//! Decorator rather than a built-in of `ProcessPlugin`/`NilPlugin` so
//! either can be metered identically.

use access_types::{AccessRequest, Application};
use async_trait::async_trait;

use super::{GrantResponse, GrantStatus, Plugin, RevokeResponse, RevokeStatus};
use crate::metrics::ControllerMetrics;
use crate::util::Error;

pub struct MeteredPlugin<P> {
    inner: P,
    metrics: &'static ControllerMetrics,
}

impl<P> MeteredPlugin<P> {
    pub fn new(inner: P, metrics: &'static ControllerMetrics) -> Self {
        MeteredPlugin { inner, metrics }
    }
}

#[async_trait]
impl<P: Plugin> Plugin for MeteredPlugin<P> {
    async fn init(&self) -> Result<(), Error> {
        self.inner.init().await
    }

    async fn grant_access(&self, request: &AccessRequest, app: &Application) -> Result<GrantResponse, Error> {
        let result = self.inner.grant_access(request, app).await;
        let outcome = match &result {
            Ok(r) => match r.status {
                GrantStatus::Granted => "granted",
                GrantStatus::Pending => "pending",
                GrantStatus::Denied => "denied",
            },
            Err(_) => "error",
        };
        self.metrics
            .plugin_call_counter
            .with_label_values(&["grant", outcome])
            .inc();
        result
    }

    async fn revoke_access(&self, request: &AccessRequest, app: &Application) -> Result<RevokeResponse, Error> {
        let result = self.inner.revoke_access(request, app).await;
        let outcome = match &result {
            Ok(r) => match r.status {
                RevokeStatus::Revoked => "revoked",
                RevokeStatus::Pending => "pending",
            },
            Err(_) => "error",
        };
        self.metrics
            .plugin_call_counter
            .with_label_values(&["revoke", outcome])
            .inc();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::NilPlugin;
    use access_types::{AccessRequestSpec, ApplicationRef, ApplicationSpec, RoleRef, Subject, TemplateRef};
    use kube::api::ObjectMeta;

    fn request() -> AccessRequest {
        AccessRequest {
            metadata: ObjectMeta::default(),
            spec: AccessRequestSpec {
                duration_seconds: 60,
                role: RoleRef {
                    template_ref: TemplateRef {
                        name: "T".into(),
                        namespace: "ns".into(),
                    },
                    ordinal: 0,
                    friendly_name: None,
                },
                application: ApplicationRef {
                    name: "frontend".into(),
                    namespace: "apps".into(),
                },
                subject: Subject { username: "alice".into() },
            },
            status: None,
        }
    }

    fn app() -> Application {
        Application {
            metadata: ObjectMeta::default(),
            spec: ApplicationSpec { project: "p1".into() },
        }
    }

    #[tokio::test]
    async fn wraps_without_changing_the_decision() {
        let metrics: &'static ControllerMetrics = Box::leak(Box::new(ControllerMetrics::new("test_metered")));
        let metered = MeteredPlugin::new(NilPlugin, metrics);
        let response = metered.grant_access(&request(), &app()).await.unwrap();
        assert_eq!(response.status, GrantStatus::Granted);
        assert_eq!(
            metrics
                .plugin_call_counter
                .with_label_values(&["grant", "granted"])
                .get(),
            1.0
        );
    }
}
