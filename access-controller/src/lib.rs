#![warn(clippy::all)]

//! The ephemeral access controller: reconciliation engine, policy/mutation
//! service, binding resolver, indexed query layer, plugin facade, and the
//! query service consumed by the out-of-scope HTTP layer. See each
//! module's docs for the corresponding component of the design.

pub mod index;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod persistence;
pub mod plugin;
pub mod policy;
pub mod reconciler;
pub mod resolver;
pub mod service;
pub mod util;

pub use reconciler::{reconcile, ReconcileDeps, Requeue};
pub use util::{Config, Error};
