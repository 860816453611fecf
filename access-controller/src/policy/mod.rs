//! The Policy/Mutation Service (spec §4.2): the only component that writes
//! to the shared `AppProject`. `grant`/`sync`/`revoke` differ only in
//! whether `groups` is touched and whether the subject is added or
//! removed — everything else (patch discipline, drift repair) is shared.

use access_types::template::RenderedTemplate;

use crate::persistence::{Persister, ProjectRolePatch};
use crate::util::Error;

/// Adds `subject` to the managed role's `groups` (idempotent) and
/// overwrites `description`/`policies`, clearing `jwtTokens` (spec §4.2
/// "Grant semantics").
pub async fn grant<P: Persister + ?Sized>(
    persister: &P,
    project_namespace: &str,
    project_name: &str,
    subject: &str,
    template: &RenderedTemplate,
) -> Result<(), Error> {
    let mut groups = existing_groups(persister, project_namespace, project_name, &template.role_name).await?;
    if !groups.iter().any(|g| g == subject) {
        groups.push(subject.to_string());
    }
    persister
        .patch_app_project_role(
            project_namespace,
            project_name,
            ProjectRolePatch {
                role_name: template.role_name.clone(),
                description: template.description.clone(),
                policies: template.policies.clone(),
                groups: Some(groups),
            },
        )
        .await
}

/// Overwrites `description`/`policies`, clears `jwtTokens`, leaves `groups`
/// untouched (spec §4.2 "Sync semantics") — used on the Granted
/// short-circuit and whenever a template's content hash has drifted.
pub async fn sync_role<P: Persister + ?Sized>(
    persister: &P,
    project_namespace: &str,
    project_name: &str,
    template: &RenderedTemplate,
) -> Result<(), Error> {
    persister
        .patch_app_project_role(
            project_namespace,
            project_name,
            ProjectRolePatch {
                role_name: template.role_name.clone(),
                description: template.description.clone(),
                policies: template.policies.clone(),
                groups: None,
            },
        )
        .await
}

/// Removes `subject` from the managed role's `groups` and, when `template`
/// is available, repairs `description`/`policies`/`jwtTokens` from it (spec
/// §4.2 "Revoke semantics"). A missing project or role is success.
pub async fn remove_managed_access<P: Persister + ?Sized>(
    persister: &P,
    project_namespace: &str,
    project_name: &str,
    role_name: &str,
    subject: &str,
    template: Option<&RenderedTemplate>,
) -> Result<(), Error> {
    persister
        .revoke_app_project_role(project_namespace, project_name, role_name, subject, template)
        .await
}

async fn existing_groups<P: Persister + ?Sized>(
    persister: &P,
    project_namespace: &str,
    project_name: &str,
    role_name: &str,
) -> Result<Vec<String>, Error> {
    Ok(persister
        .get_app_project(project_namespace, project_name)
        .await?
        .and_then(|p| p.spec.find_role(role_name).map(|r| r.groups.clone()))
        .unwrap_or_default())
}
