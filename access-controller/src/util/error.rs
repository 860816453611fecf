//! Error taxonomy (spec §7). Each variant names the failure mode the spec
//! uses to decide how the reconciler surfaces it: validation conflicts and
//! template-render failures become `Invalid` and are not retried; optimistic
//! lock conflicts retry automatically up to a bounded schedule before
//! escalating; plugin errors and cache-start failures are always transient
//! (or fatal, for the cache) regardless of retry count.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("optimistic lock conflict exhausted after {attempts} attempts")]
    ConflictExhausted { attempts: u32 },

    #[error("template render failed: {0}")]
    Render(#[from] access_types::RenderError),

    #[error("plugin error: {0}")]
    Plugin(String),

    #[error("plugin returned a null response")]
    PluginNullResponse,

    #[error("invalid input: {0}")]
    UserInput(String),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cache failed to start: {0}")]
    CacheStart(String),
}

impl Error {
    /// True when this error represents an optimistic-concurrency conflict
    /// from the Kubernetes API server (HTTP 409), the only error the patch
    /// discipline (spec §4.2) retries inline rather than surfacing.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Kube(kube::Error::Api(ae)) if ae.code == 409)
    }
}
