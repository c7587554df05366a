//! Crate with reconciler runtime components
//!
//! This crate contains the building blocks for controllers that drive objects
//! in a declarative store towards their spec: a lister cache fed by watch events,
//! the generic [`Reconciler`] that wraps user business logic with finalizer and
//! status handling, event recording, and a [`Controller`] that runs it all over a
//! de-duplicating work queue.
//!
//! Newcomers should generally get started by implementing [`ReconcileKind`] for their
//! business logic and handing a [`Reconciler`] to a [`Controller`].

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
// Types are re-exported at the crate root, so their module prefix is not repeated by users
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod controller;
pub mod events;
pub mod finalizer;
pub mod memory;
pub mod reconciler;
pub mod reflector;
pub mod status;
pub mod watcher;

#[cfg(test)] mod test_utils;

pub use async_trait::async_trait;
pub use client::ResourceClient;
pub use config::{Config, ConfigError, RequeuePolicy, RetryPolicy};
pub use controller::{trigger_self, Controller, Reconcile, WorkQueue};
pub use events::{EventType, NewEvent, Recorder, TracingRecorder};
pub use reconciler::{Outcome, ReconcileKind, Reconciler, ReconcilerEvent};
pub use reflector::{reflector, Lister, ObjectRef, Store};
