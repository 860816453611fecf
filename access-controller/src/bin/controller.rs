//! Dispatcher entrypoint: wires `kube::runtime::Controller` over
//! `AccessRequest`, watching `RoleTemplate` and `AppProject` for the two
//! cross-resource trigger sources spec §4.1 names, and delegates every
//! invocation to the transport-agnostic [`access_controller::reconcile`].
//!
//! Generalizes the teacher's `reservations::run`/`masks::run` shape (one
//! `Controller::new(...).run(reconcile, on_error, context)` loop per
//! managed kind) to accept injected collaborators (`Persister`, `Plugin`,
//! `Index`) instead of constructing a bare `Client` inside the reconcile
//! function itself.

use std::sync::Arc;
use std::time::Duration;

use access_controller::index::Index;
use access_controller::persistence::KubePersister;
use access_controller::plugin::{self, Plugin};
use access_controller::reconciler::{reconcile, ReconcileDeps, Requeue};
use access_controller::util::config::{ControllerConfig, LogFormat, LogLevel, LoggingConfig};
use access_controller::util::{Config, Error};
use access_types::{AccessRequest, AppProject, RoleTemplate};
use chrono::Utc;
use futures::StreamExt;
use kube::runtime::{controller::Action, reflector::ObjectRef, watcher, Controller};
use kube::{Api, Client, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

#[cfg(feature = "metrics")]
use access_controller::metrics::ControllerMetrics;

struct Context {
    persister: KubePersister,
    plugin: Option<Box<dyn Plugin>>,
    index: Index,
    config: ControllerConfig,
    home_namespace: String,
    #[cfg(feature = "metrics")]
    metrics: &'static ControllerMetrics,
}

async fn reconcile_fn(obj: Arc<AccessRequest>, ctx: Arc<Context>) -> Result<Action, Error> {
    let namespace = obj.namespace().unwrap_or_default();
    let name = obj.name_any();
    let deps = ReconcileDeps {
        persister: &ctx.persister,
        plugin: ctx.plugin.as_deref(),
        index: &ctx.index,
        config: &ctx.config,
        home_namespace: &ctx.home_namespace,
    };
    let now = Utc::now();
    let requeue = reconcile(&deps, &namespace, &name, now).await?;

    #[cfg(feature = "metrics")]
    {
        if let Ok(Some(after)) = ctx.persister.get_access_request(&namespace, &name).await {
            let state = after
                .status
                .and_then(|s| s.request_state)
                .map(|s| format!("{s:?}"))
                .unwrap_or_else(|| "empty".to_string());
            ctx.metrics.reconcile_state_counter.with_label_values(&[&state]).inc();
        }
    }

    tracing::info!(%namespace, %name, ?requeue, "reconciled");
    Ok(match requeue {
        Requeue::None => Action::await_change(),
        Requeue::After(d) => Action::requeue(d),
        Requeue::At(t) => Action::requeue((t - now).to_std().unwrap_or(Duration::from_secs(1))),
    })
}

fn error_policy(obj: Arc<AccessRequest>, err: &Error, _ctx: Arc<Context>) -> Action {
    tracing::error!(request = %obj.name_any(), error = %err, "reconcile failed, requeuing");
    Action::requeue(Duration::from_secs(5))
}

fn init_tracing(cfg: &LoggingConfig) {
    let level = match cfg.level {
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Error => "error",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    match cfg.format {
        LogFormat::Json => fmt().with_env_filter(filter).json().init(),
        LogFormat::Text => fmt().with_env_filter(filter).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config.logging);

    let client = Client::try_default().await?;
    let namespace = config.backend.namespace.clone();

    let cancel = CancellationToken::new();
    let index = Index::new();
    index.start(client.clone(), Some(namespace.clone()), cancel.clone()).await?;

    let persister = KubePersister::new(client.clone());
    let raw_plugin = plugin::from_config(&config.plugin);

    #[cfg(feature = "metrics")]
    let metrics: &'static ControllerMetrics = Box::leak(Box::new(ControllerMetrics::new("controller")));
    #[cfg(feature = "metrics")]
    let plugin: Option<Box<dyn Plugin>> = raw_plugin
        .map(|p| Box::new(plugin::MeteredPlugin::new(p, metrics)) as Box<dyn Plugin>);
    #[cfg(not(feature = "metrics"))]
    let plugin = raw_plugin;

    if let Some(p) = &plugin {
        p.init().await?;
    }

    let context = Arc::new(Context {
        persister,
        plugin,
        index: index.clone(),
        config: config.controller.clone(),
        home_namespace: namespace.clone(),
        #[cfg(feature = "metrics")]
        metrics,
    });

    let requests: Api<AccessRequest> = Api::namespaced(client.clone(), &namespace);
    let templates: Api<RoleTemplate> = Api::namespaced(client.clone(), &namespace);
    let projects: Api<AppProject> = Api::namespaced(client.clone(), &namespace);

    let index_for_templates = index.clone();
    let index_for_projects = index.clone();

    tracing::info!(%namespace, "starting access request controller");

    Controller::new(requests, watcher::Config::default())
        .shutdown_on_signal()
        .watches(templates, watcher::Config::default(), move |template| {
            let ns = template.namespace().unwrap_or_default();
            index_for_templates
                .requests_for_template(&ns, &template.name_any())
                .into_iter()
                .map(|(ns, name)| ObjectRef::<AccessRequest>::new(&name).within(&ns))
                .collect::<Vec<_>>()
        })
        .watches(projects, watcher::Config::default(), move |project| {
            let ns = project.namespace().unwrap_or_default();
            index_for_projects
                .requests_for_project(&ns, &project.name_any())
                .into_iter()
                .map(|(ns, name)| ObjectRef::<AccessRequest>::new(&name).within(&ns))
                .collect::<Vec<_>>()
        })
        .run(reconcile_fn, error_policy, context)
        .for_each(|result| async move {
            if let Err(e) = result {
                tracing::error!(error = %e, "controller stream error");
            }
        })
        .await;

    cancel.cancel();
    Ok(())
}
