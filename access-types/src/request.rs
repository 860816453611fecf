//! `AccessRequest`: the unit of work (spec §3).

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// `status.requestState`. The spec's `(empty)` state is represented by
/// `status.request_state: Option<RequestState>` being `None` rather than as
/// a variant here, matching how Kubernetes status subresources usually
/// model "not yet observed."
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum RequestState {
    Initiated,
    Requested,
    Granted,
    Expired,
    Denied,
    Invalid,
    Timeout,
}

impl RequestState {
    /// *Concluded* per spec §3: a state from which no further project
    /// mutations are issued absent external change. `Granted` is
    /// deliberately excluded — it only concludes once observed past
    /// `expiresAt`, which callers must check separately.
    pub fn is_concluded(self) -> bool {
        matches!(
            self,
            RequestState::Expired | RequestState::Denied | RequestState::Invalid | RequestState::Timeout
        )
    }

    /// Sort priority used by `listAccessRequests` (spec §4.6): empty≡Requested
    /// < Granted < Denied < Invalid < Expired.
    pub fn sort_priority(state: Option<RequestState>) -> u8 {
        match state {
            None | Some(RequestState::Initiated) | Some(RequestState::Requested) => 0,
            Some(RequestState::Granted) => 1,
            Some(RequestState::Denied) => 2,
            Some(RequestState::Invalid) => 3,
            Some(RequestState::Timeout) => 3,
            Some(RequestState::Expired) => 4,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub struct TemplateRef {
    pub name: String,
    pub namespace: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub struct RoleRef {
    #[serde(rename = "templateRef")]
    pub template_ref: TemplateRef,

    /// Integer priority for display / tie-break.
    pub ordinal: i32,

    /// Optional display string.
    #[serde(rename = "friendlyName", skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub struct ApplicationRef {
    pub name: String,
    pub namespace: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub struct Subject {
    pub username: String,
}

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[kube(
    group = "access.platform.io",
    version = "v1alpha1",
    kind = "AccessRequest",
    plural = "accessrequests",
    derive = "PartialEq",
    status = "AccessRequestStatus",
    namespaced
)]
#[kube(printcolumn = r#"{"jsonPath": ".status.requestState", "name": "STATE", "type": "string"}"#)]
#[kube(printcolumn = r#"{"jsonPath": ".status.expiresAt", "name": "EXPIRES", "type": "date"}"#)]
pub struct AccessRequestSpec {
    /// Requested grant duration, in whole seconds. A duration of `0` means
    /// the request expires immediately upon being granted (spec §8
    /// boundary behavior).
    #[serde(rename = "durationSeconds")]
    pub duration_seconds: i64,

    pub role: RoleRef,
    pub application: ApplicationRef,
    pub subject: Subject,
}

impl AccessRequestSpec {
    pub fn duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.duration_seconds.max(0))
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct HistoryEntry {
    #[serde(rename = "transitionTime")]
    pub transition_time: DateTime<Utc>,
    pub state: RequestState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct AccessRequestStatus {
    #[serde(rename = "requestState", skip_serializing_if = "Option::is_none")]
    pub request_state: Option<RequestState>,

    /// Project name captured at first reconcile (spec §3).
    #[serde(rename = "targetProject", skip_serializing_if = "Option::is_none")]
    pub target_project: Option<String>,

    /// Rendered managed-role name.
    #[serde(rename = "roleName", skip_serializing_if = "Option::is_none")]
    pub role_name: Option<String>,

    /// Absolute expiry time. Set exactly when transitioning into `Granted`
    /// and never cleared afterwards (invariant I2).
    #[serde(rename = "expiresAt", skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Content hash of the template fields that affect the project
    /// mutation, computed at initialization and compared on every
    /// reconcile of a `Granted` request.
    #[serde(rename = "roleTemplateHash", skip_serializing_if = "Option::is_none")]
    pub role_template_hash: Option<String>,

    /// Append-only transition log (invariant I3).
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl AccessRequestStatus {
    /// *Concluded* per spec §3, including the "Granted and past expiresAt"
    /// clause. `now` is passed in rather than read internally so the
    /// reconciler's notion of "now" is the single source of truth used
    /// throughout one invocation.
    pub fn is_concluded(&self, now: DateTime<Utc>) -> bool {
        match self.request_state {
            Some(RequestState::Granted) => self.expires_at.map_or(false, |exp| now >= exp),
            Some(state) => state.is_concluded(),
            None => false,
        }
    }

    pub fn last_transition_time(&self) -> Option<DateTime<Utc>> {
        self.history.last().map(|h| h.transition_time)
    }

    /// Appends a transition, suppressing a duplicate if the new entry would
    /// be identical in state, details, and the caller-supplied hash marker
    /// (spec §4.1: "duplicate transitions ... are suppressed"). Returns
    /// whether an entry was actually appended.
    pub fn push_transition(
        &mut self,
        now: DateTime<Utc>,
        state: RequestState,
        details: Option<String>,
    ) -> bool {
        if let Some(last) = self.history.last() {
            if last.state == state && last.details == details {
                return false;
            }
        }
        self.request_state = Some(state);
        self.history.push(HistoryEntry {
            transition_time: now,
            state,
            details,
        });
        true
    }
}

/// The immutable triple from invariant I1, plus the subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImmutableFields<'a> {
    pub template_ref: &'a TemplateRef,
    pub application: &'a ApplicationRef,
    pub username: &'a str,
}

impl AccessRequestSpec {
    pub fn immutable_fields(&self) -> ImmutableFields<'_> {
        ImmutableFields {
            template_ref: &self.role.template_ref,
            application: &self.application,
            username: &self.subject.username,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("attempted to mutate an immutable AccessRequest field after creation")]
pub struct ImmutabilityViolation;

/// Admission-boundary check for invariant I1 (spec §3: "the triple
/// (templateRef, application, subject) is immutable after creation") and
/// scenario 3 of spec §8. Not an admission webhook itself — that
/// machinery is out of scope — but the pure predicate such a webhook, or
/// this crate's own `Persister::update_spec`, calls before persisting an
/// update.
pub fn validate_immutable_update(
    old: &AccessRequestSpec,
    new: &AccessRequestSpec,
) -> Result<(), ImmutabilityViolation> {
    if old.immutable_fields() == new.immutable_fields() {
        Ok(())
    } else {
        Err(ImmutabilityViolation)
    }
}
