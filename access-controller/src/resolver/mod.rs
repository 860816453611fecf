//! The Binding Resolver (spec §4.3): given a template reference and a
//! requesting subject's group memberships, finds the single `AccessBinding`
//! that grants access, if any.

pub mod expr;

use std::collections::HashMap;

use access_types::{AccessBinding, AppProject, Application};
use kube::Resource;
use serde_json::{json, Value};

use crate::persistence::Persister;
use crate::util::Error;

/// The granting binding, or `None` if no applicable binding's subjects
/// matched. First match wins, in listing order: namespace-scoped bindings
/// are evaluated before global ones, and ties within a scope are resolved
/// by the order the backing store returns them in. `ordinal` is a §4.6 UI
/// sort concern, not a selection key here.
#[derive(Debug, Clone)]
pub struct Granting {
    pub binding: AccessBinding,
    pub matched_subject: String,
}

/// Looks up the `AccessBinding` that grants `template_name` to `subject`
/// for `application`/`project`, per spec §4.3's algorithm:
///
/// 1. List `AccessBinding`s in both the request's own namespace and the
///    controller's home namespace, namespace-scoped first, then global.
/// 2. Keep only bindings referencing `template_name`.
/// 3. For each, evaluate `spec.if` (if present) against
///    `{application, project}`; skip bindings whose condition is absent-false
///    or whose expression errors (logged, not fatal).
/// 4. Render each `spec.subjects[i]` template with `{application, project,
///    app}` (`app` aliases `application`) and check membership against
///    `subject`'s groups.
/// 5. First match, in listing order, wins.
pub async fn find_granting_binding<P: Persister + ?Sized>(
    persister: &P,
    request_namespace: &str,
    home_namespace: &str,
    template_name: &str,
    subject_groups: &[String],
    application: &Application,
    project: &AppProject,
) -> Result<Option<Granting>, Error> {
    let mut candidates: Vec<(bool, AccessBinding)> = persister
        .list_access_bindings(request_namespace)
        .await?
        .into_iter()
        .map(|b| (false, b))
        .collect();
    if home_namespace != request_namespace {
        candidates.extend(
            persister
                .list_access_bindings(home_namespace)
                .await?
                .into_iter()
                .map(|b| (true, b)),
        );
    }

    let app_vars = application_vars(application);
    let project_vars = project_vars(project);
    let mut vars = HashMap::new();
    vars.insert("application".to_string(), app_vars.clone());
    vars.insert("app".to_string(), app_vars);
    vars.insert("project".to_string(), project_vars);

    // `candidates` is already namespace-scoped bindings followed by global
    // ones (built in that order above), so returning the first match here
    // preserves spec §4.3's "namespace-scoped bindings outrank global ones"
    // without any further tie-break key.
    for (_is_global, binding) in candidates {
        if binding.spec.role_template_ref.name != template_name {
            continue;
        }
        if let Some(cond) = &binding.spec.if_expr {
            match expr::eval_bool(cond, &vars) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    tracing::warn!(
                        binding = %binding.meta().name.clone().unwrap_or_default(),
                        error = %e,
                        "binding condition did not evaluate cleanly, skipping",
                    );
                    continue;
                }
            }
        }
        if let Some(matched) = matching_subject(&binding, &vars, subject_groups)? {
            return Ok(Some(Granting {
                binding: binding.clone(),
                matched_subject: matched,
            }));
        }
    }
    Ok(None)
}

fn matching_subject(
    binding: &AccessBinding,
    vars: &HashMap<String, Value>,
    subject_groups: &[String],
) -> Result<Option<String>, Error> {
    for template in &binding.spec.subjects {
        let rendered = render_subject(template, vars)?;
        if subject_groups.iter().any(|g| g == &rendered) {
            return Ok(Some(rendered));
        }
    }
    Ok(None)
}

fn render_subject(template: &str, vars: &HashMap<String, Value>) -> Result<String, Error> {
    #[derive(serde::Serialize)]
    struct Ctx<'a> {
        application: &'a Value,
        project: &'a Value,
        app: &'a Value,
    }
    let ctx = Ctx {
        application: vars.get("application").unwrap_or(&Value::Null),
        project: vars.get("project").unwrap_or(&Value::Null),
        app: vars.get("app").unwrap_or(&Value::Null),
    };
    access_types::render_str(template, &ctx).map_err(Error::from)
}

fn application_vars(app: &Application) -> Value {
    json!({
        "name": app.meta().name.clone().unwrap_or_default(),
        "namespace": app.meta().namespace.clone().unwrap_or_default(),
        "project": app.spec.project,
    })
}

fn project_vars(project: &AppProject) -> Value {
    json!({
        "name": project.meta().name.clone().unwrap_or_default(),
        "namespace": project.meta().namespace.clone().unwrap_or_default(),
    })
}
