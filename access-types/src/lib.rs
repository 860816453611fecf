#![deny(unsafe_code)]
#![warn(clippy::all)]

//! Schema and pure-function layer shared by every component of the
//! ephemeral access controller: the three CRDs this system owns
//! (`AccessRequest`, `RoleTemplate`, `AccessBinding`), the two partial
//! shapes it reads from the external CD platform (`Application`,
//! `AppProject`), the managed-role naming convention, and the
//! `{{ .field }}` template-rendering engine. Nothing in this crate talks
//! to a cluster.

pub mod binding;
pub mod external;
pub mod naming;
pub mod render;
pub mod request;
pub mod template;

pub use binding::{AccessBinding, AccessBindingSpec, BindingTemplateRef};
pub use external::{AppProject, AppProjectRole, AppProjectSpec, Application, ApplicationSpec};
pub use naming::managed_role_name;
pub use render::{render_str, RenderError};
pub use request::{
    AccessRequest, AccessRequestSpec, AccessRequestStatus, ApplicationRef, HistoryEntry,
    RequestState, RoleRef, Subject, TemplateRef,
};
pub use template::{RoleTemplate, RoleTemplateSpec};
