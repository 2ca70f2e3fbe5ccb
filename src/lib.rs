#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! # media-server-operator
//!
//! Kubernetes operator that runs a Flussonic streamer on every eligible node
//! for each `MediaServer` resource.
//!
//! The reconciliation core lives in `mso-reconciler` and the resource schema
//! in `mso-api`; this crate wires them to the API server and the CLI.

pub mod cli;
pub mod controller;
pub mod kube_store;

pub use mso_api as api;
pub use mso_reconciler as reconciler;
