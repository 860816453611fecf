//! `AccessBinding`: declares which user groups may claim which template,
//! optionally gated by a condition (spec §3).

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub struct BindingTemplateRef {
    pub name: String,
}

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "access.platform.io",
    version = "v1alpha1",
    kind = "AccessBinding",
    plural = "accessbindings",
    derive = "PartialEq",
    namespaced
)]
pub struct AccessBindingSpec {
    #[serde(rename = "roleTemplateRef")]
    pub role_template_ref: BindingTemplateRef,

    /// Text templates producing group names, rendered with
    /// `{application, project, app}` where `app` aliases `application`
    /// (spec §4.3).
    #[serde(default)]
    pub subjects: Vec<String>,

    /// Boolean expression over `{application, project}`. Absent means
    /// "always applicable."
    #[serde(rename = "if", skip_serializing_if = "Option::is_none")]
    pub if_expr: Option<String>,

    pub ordinal: i32,

    #[serde(rename = "friendlyName", skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
}
