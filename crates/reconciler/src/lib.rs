//! Level-triggered reconciliation of `MediaServer` dependents.
//!
//! Every `MediaServer` owns six objects, named after it:
//!
//! | Object | Name | Drift handling |
//! |---|---|---|
//! | ServiceAccount | `<name>-sa` | write-once |
//! | Role | `<name>-role` | write-once |
//! | RoleBinding | `<name>-rb` | write-once |
//! | Secret | `<name>-license-storage` | write-once |
//! | ConfigMap | `<name>-configmap` | replaced on drift |
//! | DaemonSet | `<name>-streamer` | selected fields patched |
//!
//! # Passes
//!
//! A pass reads the `MediaServer` once, derives the canonical shape of every
//! dependent ([`Blueprint`]) and walks them in the order above. The first
//! object that has to be created ends the pass with
//! [`ReconcileOutcome::Requeue`]; the next pass starts from a fresh read of
//! the store. A converged pass performs no writes.
//!
//! Deleting dependents is left to the store: each carries a controller owner
//! reference to its `MediaServer`.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use mso_reconciler::{InMemoryStore, ObjectKey, Reconciler, ReconcileOutcome};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = InMemoryStore::new_arc();
//!     let reconciler = Reconciler::with_ulid_ids(store.clone());
//!
//!     let key = ObjectKey::new("streaming", "cam1");
//!     while reconciler.reconcile(&key).await == Ok(ReconcileOutcome::Requeue) {}
//! }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod desired;
pub mod ensure;
pub mod error;
pub mod names;
pub mod object;
pub mod reconciler;
pub mod steps;
pub mod store;
pub mod types;

// Re-export main types
pub use desired::Blueprint;
pub use error::{Error, Result, StoreError, StoreResult};
pub use names::ChildNames;
pub use object::{Managed, ManagedObject, ObjectKey, ObjectKind};
pub use reconciler::{CorrelationIds, Reconciler, ReconcilerBuilder, UlidIds};
pub use store::{InMemoryStore, Mutation, ObjectStore, StoreOp, TracingStore};
pub use types::{ReconcileOutcome, StepOutcome};
