//! Kyma operator: converges sub-component configuration resources from Kyma resources

#![deny(missing_docs)]

pub mod config;
pub mod controller;
pub mod dependents;
pub mod dispatch;
pub mod store;
pub mod watch;

pub use controller::{Reconcile, ReconcileAction, Reconciler};
pub use dispatch::{DispatchConfig, Dispatcher};
