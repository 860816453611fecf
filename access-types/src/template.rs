//! `RoleTemplate`: a parameterized role definition (spec §3).

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::naming::role_template_hash;
use crate::render::{render_str, RenderError};

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "access.platform.io",
    version = "v1alpha1",
    kind = "RoleTemplate",
    plural = "roletemplates",
    derive = "PartialEq",
    namespaced
)]
pub struct RoleTemplateSpec {
    #[serde(default)]
    pub description: String,

    /// Multi-line template strings, each substituted independently.
    #[serde(default)]
    pub policies: Vec<String>,
}

/// Variables available to a `RoleTemplate`'s description/policy templates
/// (spec §4.2): `{role, project, application, namespace}`. `role` is
/// pre-computed as `proj:<project>:<managedRoleName>` before rendering, so
/// policy lines can reference it directly.
#[derive(Debug, Clone, Serialize)]
pub struct RenderVars {
    pub role: String,
    pub project: String,
    pub application: String,
    pub namespace: String,
}

/// The materialized role after substituting project/application/namespace
/// into a `RoleTemplate`'s strings (spec's "Rendered template" glossary
/// entry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedTemplate {
    pub role_name: String,
    pub description: String,
    pub policies: Vec<String>,
}

impl RenderedTemplate {
    pub fn content_hash(&self) -> String {
        role_template_hash(&self.role_name, &self.description, &self.policies)
    }
}

impl RoleTemplateSpec {
    /// Renders this template's description and policies against
    /// `(managed_role_name, project, application, namespace)`.
    pub fn render(
        &self,
        role_name: &str,
        project: &str,
        application: &str,
        namespace: &str,
    ) -> Result<RenderedTemplate, RenderError> {
        let vars = RenderVars {
            role: format!("proj:{project}:{role_name}"),
            project: project.to_string(),
            application: application.to_string(),
            namespace: namespace.to_string(),
        };
        let description = render_str(&self.description, &vars)?;
        let policies = self
            .policies
            .iter()
            .map(|line| render_str(line, &vars))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RenderedTemplate {
            role_name: role_name.to_string(),
            description,
            policies,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> RoleTemplateSpec {
        RoleTemplateSpec {
            description: "ephemeral access for {{ .application }}".to_string(),
            policies: vec!["p, {{ .role }}, applications, get, {{ .project }}/{{ .application }}, allow".to_string()],
        }
    }

    #[test]
    fn render_substitutes_all_fields() {
        let rendered = template().render("ephemeral-T-apps-frontend", "p1", "frontend", "apps").unwrap();
        assert_eq!(rendered.description, "ephemeral access for frontend");
        assert_eq!(
            rendered.policies[0],
            "p, proj:p1:ephemeral-T-apps-frontend, applications, get, p1/frontend, allow"
        );
    }

    #[test]
    fn render_is_idempotent_round_trip() {
        let t = template();
        let a = t.render("r", "p1", "frontend", "apps").unwrap();
        let b = t.render("r", "p1", "frontend", "apps").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn hash_is_insensitive_to_unrelated_template_metadata() {
        let a = template().render("r", "p1", "frontend", "apps").unwrap();
        let b = template().render("r", "p1", "frontend", "apps").unwrap();
        assert_eq!(a.content_hash(), b.content_hash());
    }
}
