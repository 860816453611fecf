//! The `{{ .field }}` text-substitution engine used by both
//! [`RoleTemplate`](crate::RoleTemplate) policy lines/description and
//! [`AccessBinding`](crate::AccessBinding) subject lines (spec §9).
//!
//! Template authors write Go-style dotted-field references
//! (`{{ .project }}`, `{{ .application.metadata.name }}`). Internally this
//! is rewritten to handlebars' own `{{ field }}` syntax before compiling,
//! so the public surface matches the spec exactly while the implementation
//! reuses a real templating crate rather than hand-rolling one.

use handlebars::Handlebars;
use serde::Serialize;
use std::sync::OnceLock;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("template render error: {0}")]
    Render(String),
}

fn engine() -> &'static Handlebars<'static> {
    static ENGINE: OnceLock<Handlebars<'static>> = OnceLock::new();
    ENGINE.get_or_init(|| {
        let mut hb = Handlebars::new();
        hb.set_strict_mode(false);
        hb
    })
}

/// Rewrites `{{ .foo.bar }}` (and `{{.foo.bar}}`) into handlebars'
/// `{{ foo.bar }}` so Go-style templates compile unmodified. Only a
/// leading dot directly after the opening braces is stripped; handlebars
/// helpers/partials (`{{#if}}`, `{{> partial}}`) are untouched because they
/// never start with a dot.
fn rewrite_go_style(template: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if template[i..].starts_with("{{") {
            let close = template[i..].find("}}").map(|p| i + p + 2);
            if let Some(close) = close {
                let inner = &template[i + 2..close - 2];
                let trimmed = inner.trim_start();
                if let Some(rest) = trimmed.strip_prefix('.') {
                    out.push_str("{{");
                    out.push_str(rest);
                    out.push_str("}}");
                } else {
                    out.push_str(&template[i..close]);
                }
                i = close;
                continue;
            }
        }
        // push a single (possibly multi-byte) char
        let ch_len = template[i..].chars().next().map(char::len_utf8).unwrap_or(1);
        out.push_str(&template[i..i + ch_len]);
        i += ch_len;
    }
    out
}

/// Renders `template` against `vars`, substituting each `{{ .field }}`
/// reference with the corresponding value from `vars`.
pub fn render_str<T: Serialize>(template: &str, vars: &T) -> Result<String, RenderError> {
    let rewritten = rewrite_go_style(template);
    let hb = engine();
    hb.render_template(&rewritten, vars)
        .map_err(|e| RenderError::Render(e.to_string()))
}
