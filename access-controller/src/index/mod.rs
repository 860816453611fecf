//! The Indexed Query Layer (spec §4.4): field-indexed lookups over a
//! watch-fed local cache of `AccessRequest`s, used both by the reconciler's
//! duplicate-validation step (spec §4.1 step 5) and by the two
//! cross-resource watches that re-enqueue affected requests when a
//! `RoleTemplate` or `AppProject` changes (spec §4.1's trigger sources b/c).
//!
//! Maintained the same way `kube_runtime::indexer` maintains a generic
//! index (`apply`/`delete`/`rehydrate` on a watch stream), adapted here
//! into a concrete struct rather than that trait, since the exact generic
//! indexer API is tied to a newer kube-rs release than the one this crate
//! targets.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use access_types::AccessRequest;
use futures::StreamExt;
use kube::runtime::{watcher, watcher::Event};
use kube::{Api, Client, ResourceExt};
use tokio_util::sync::CancellationToken;

/// `(namespace, name)` — enough to re-fetch the full object from the
/// Persister before reconciling it.
pub type RequestKey = (String, String);

#[derive(Default)]
struct IndexState {
    by_subject_app: HashMap<(String, String, String, String), HashSet<RequestKey>>,
    by_project: HashMap<(String, String), HashSet<RequestKey>>,
    by_template: HashMap<(String, String), HashSet<RequestKey>>,
    /// Last known identity of each request, so `delete`/re-`apply` can find
    /// and clear its old index entries even after its fields changed.
    known: HashMap<RequestKey, IndexedFields>,
}

#[derive(Clone, PartialEq, Eq)]
struct IndexedFields {
    subject_app: (String, String, String, String),
    project: Option<(String, String)>,
    template: (String, String),
}

fn fields_of(req: &AccessRequest) -> (RequestKey, IndexedFields) {
    let ns = req.namespace().unwrap_or_default();
    let key = (ns.clone(), req.name_any());
    let fields = IndexedFields {
        subject_app: (
            ns.clone(),
            req.spec.subject.username.clone(),
            req.spec.application.name.clone(),
            req.spec.application.namespace.clone(),
        ),
        project: req
            .status
            .as_ref()
            .and_then(|s| s.target_project.clone())
            .map(|p| (ns.clone(), p)),
        template: (
            req.spec.role.template_ref.namespace.clone(),
            req.spec.role.template_ref.name.clone(),
        ),
    };
    (key, fields)
}

impl IndexState {
    fn remove(&mut self, key: &RequestKey) {
        if let Some(old) = self.known.remove(key) {
            if let Some(set) = self.by_subject_app.get_mut(&old.subject_app) {
                set.remove(key);
            }
            if let Some((_, proj)) = &old.project {
                if let Some(set) = self.by_project.get_mut(&(old.subject_app.0.clone(), proj.clone())) {
                    set.remove(key);
                }
            }
            if let Some(set) = self.by_template.get_mut(&old.template) {
                set.remove(key);
            }
        }
    }

    fn apply(&mut self, req: &AccessRequest) {
        let (key, fields) = fields_of(req);
        self.remove(&key);
        self.by_subject_app.entry(fields.subject_app.clone()).or_default().insert(key.clone());
        if let Some((ns, proj)) = &fields.project {
            self.by_project.entry((ns.clone(), proj.clone())).or_default().insert(key.clone());
        }
        self.by_template.entry(fields.template.clone()).or_default().insert(key.clone());
        self.known.insert(key, fields);
    }

    fn delete(&mut self, req: &AccessRequest) {
        let (key, _) = fields_of(req);
        self.remove(&key);
    }

    fn rehydrate(&mut self, reqs: &[AccessRequest]) {
        *self = IndexState::default();
        for r in reqs {
            self.apply(r);
        }
    }
}

#[derive(Clone)]
pub struct Index {
    state: Arc<RwLock<IndexState>>,
}

impl Index {
    pub fn new() -> Self {
        Index {
            state: Arc::new(RwLock::new(IndexState::default())),
        }
    }

    /// Starts the background watcher that keeps this index up to date.
    /// Must be called before the index is trusted to answer queries (spec
    /// §4.4: "must be started before serving traffic"). Performs an initial
    /// list against the backing store first; a failure there is fatal to
    /// the process (spec §7 "Cache-start failure — fatal to the process"),
    /// so it is returned rather than only logged. Once that check passes,
    /// the long-running watch loop is spawned and runs until `cancel` fires.
    pub async fn start(&self, client: Client, namespace: Option<String>, cancel: CancellationToken) -> Result<(), crate::util::Error> {
        let api: Api<AccessRequest> = match &namespace {
            Some(ns) => Api::namespaced(client, ns),
            None => Api::all(client),
        };
        api.list(&Default::default())
            .await
            .map_err(|e| crate::util::Error::CacheStart(e.to_string()))?;

        let state = self.state.clone();
        tokio::spawn(async move {
            let mut stream = Box::pin(watcher::watcher(api, watcher::Config::default()));
            let mut init_buffer = Vec::new();
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!("index watcher shutting down");
                        break;
                    }
                    next = stream.next() => {
                        match next {
                            Some(Ok(Event::Apply(obj))) => {
                                state.write().unwrap().apply(&obj);
                            }
                            Some(Ok(Event::Delete(obj))) => {
                                state.write().unwrap().delete(&obj);
                            }
                            Some(Ok(Event::Init)) => {
                                init_buffer.clear();
                            }
                            Some(Ok(Event::InitApply(obj))) => {
                                init_buffer.push(obj);
                            }
                            Some(Ok(Event::InitDone)) => {
                                state.write().unwrap().rehydrate(&init_buffer);
                                init_buffer.clear();
                            }
                            Some(Err(e)) => {
                                tracing::error!(error = %e, "index watcher error");
                            }
                            None => break,
                        }
                    }
                }
            }
        });
        Ok(())
    }

    /// Requests sharing `(namespace, subject, app name, app namespace)`
    /// (spec §4.1 step 5's duplicate-validation query).
    pub fn requests_for_subject_app(
        &self,
        namespace: &str,
        subject: &str,
        app_name: &str,
        app_namespace: &str,
    ) -> Vec<RequestKey> {
        self.state
            .read()
            .unwrap()
            .by_subject_app
            .get(&(
                namespace.to_string(),
                subject.to_string(),
                app_name.to_string(),
                app_namespace.to_string(),
            ))
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Non-concluded requests in `namespace` whose `status.targetProject`
    /// equals `project` (spec §4.1 trigger source c). Callers still need to
    /// filter by concluded-ness against freshly-fetched objects, since the
    /// index only tracks identity, not live state.
    pub fn requests_for_project(&self, namespace: &str, project: &str) -> Vec<RequestKey> {
        self.state
            .read()
            .unwrap()
            .by_project
            .get(&(namespace.to_string(), project.to_string()))
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Synchronously loads `initial` into the cache without starting a
    /// watcher. Used by tests, and by any bootstrap path that wants the
    /// cache warm before the first watch event arrives.
    pub fn seed(&self, initial: &[AccessRequest]) {
        self.state.write().unwrap().rehydrate(initial);
    }

    /// Requests referencing `(template_namespace, template_name)` (spec
    /// §4.1 trigger source b).
    pub fn requests_for_template(&self, template_namespace: &str, template_name: &str) -> Vec<RequestKey> {
        self.state
            .read()
            .unwrap()
            .by_template
            .get(&(template_namespace.to_string(), template_name.to_string()))
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for Index {
    fn default() -> Self {
        Self::new()
    }
}
