//! Reconciler is an umbrella-crate for building controllers on top of a declarative store.
//!
//! # Overview
//!
//! A controller watches objects that carry a desired `spec`, does whatever work the spec asks
//! for, and records what it observed in the object's `status`. This crate supplies everything
//! around the business logic:
//!
//! - [`core`](crate::core) with the resource model: [`ObjectMeta`], [`Resource`], [`HasStatus`],
//!   merge [`Patch`](crate::core::Patch)es and store errors
//! - [`runtime`](crate::runtime) with the [`Reconciler`] engine, the lister
//!   [`Store`](crate::runtime::Store), event recording, [`Config`], the work queue and the
//!   [`Controller`], plus an in-memory store to run it all against
//!
//! # Writing a reconciler
//!
//! Business logic implements [`ReconcileKind`]. It receives a private copy of the object and
//! returns an [`Outcome`]; the engine then writes back any finalizer and status changes,
//! retrying status writes that lose a version race, and turns the outcome into events.
//!
//! ```
//! use reconciler::{
//!     core::{HasStatus, ObjectMeta, Resource, ResourceExt},
//!     runtime::{async_trait, Outcome, ReconcileKind},
//! };
//! use std::convert::Infallible;
//!
//! #[derive(Clone, Debug)]
//! struct Widget {
//!     metadata: ObjectMeta,
//!     status: Option<i64>,
//! }
//!
//! impl Resource for Widget {
//!     const KIND: &'static str = "Widget";
//!     const PLURAL: &'static str = "widgets";
//!     fn meta(&self) -> &ObjectMeta { &self.metadata }
//!     fn meta_mut(&mut self) -> &mut ObjectMeta { &mut self.metadata }
//! }
//!
//! impl HasStatus for Widget {
//!     type Status = i64;
//!     fn status(&self) -> Option<&i64> { self.status.as_ref() }
//!     fn status_mut(&mut self) -> &mut Option<i64> { &mut self.status }
//! }
//!
//! struct ObserveGeneration;
//!
//! #[async_trait]
//! impl ReconcileKind<Widget> for ObserveGeneration {
//!     type Error = Infallible;
//!
//!     async fn reconcile_kind(&self, widget: &mut Widget) -> Outcome<Infallible> {
//!         widget.status = Some(widget.generation());
//!         Outcome::Success
//!     }
//! }
//! ```
//!
//! See the `demos` directory for a controller running end to end against the in-memory store.
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![forbid(unsafe_code)]

/// Re-exports from [`reconciler_core`]
#[doc(inline)]
pub use reconciler_core as core;

/// Re-exports from [`reconciler_runtime`]
#[doc(inline)]
pub use reconciler_runtime as runtime;

pub use crate::core::{Error, HasSpec, HasStatus, ObjectMeta, Resource, ResourceExt};
pub use crate::runtime::{Config, Controller, Outcome, ReconcileKind, Reconciler, ReconcilerEvent};

#[cfg(test)] mod mock_tests;
