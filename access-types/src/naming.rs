//! The managed-role naming convention (spec §3) and the role-template
//! content hash (spec §4.2) used to detect when a `Granted` request's
//! role needs to be re-synced.
//!
//! The naming order is a persistent schema commitment (spec §9's Open
//! Question): `ephemeral-<template>-<app-namespace>-<app-name>`. Changing
//! the order later strands every role already written under the old name,
//! so this is the single call site that knows the order.

use sha2::{Digest, Sha256};

/// Returns the name of the managed role for a given role template and
/// application. At most one such role exists per (template, application)
/// pair (spec §3).
pub fn managed_role_name(template_name: &str, app_namespace: &str, app_name: &str) -> String {
    format!("ephemeral-{template_name}-{app_namespace}-{app_name}")
}

/// Content hash of the fields of a rendered role template that affect the
/// project mutation: name, description, and policies. Two templates that
/// render identically hash identically regardless of unrelated metadata
/// (spec §4.2's template-hash invariant).
pub fn role_template_hash(name: &str, description: &str, policies: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update([0u8]);
    hasher.update(description.as_bytes());
    hasher.update([0u8]);
    for line in policies {
        hasher.update(line.as_bytes());
        hasher.update([b'\n']);
    }
    hex::encode(hasher.finalize())
}
