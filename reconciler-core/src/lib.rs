//! Crate with types and traits shared by reconcilers and the stores they reconcile against
//!
//! This crate has no opinion on where resources are stored and carries no client.
//! The same information here is always re-exported from `reconciler` under `reconciler::core`.
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod metadata;
pub use metadata::ObjectMeta;

pub mod object;
pub use object::{HasSpec, HasStatus, ObjectReference};

pub mod params;
pub use params::Patch;

mod resource;
pub use resource::{Resource, ResourceExt};

pub mod response;

mod error;
pub use error::{Error, ErrorResponse};

/// Convient alias for `Result<T, Error>`
pub type Result<T, E = Error> = std::result::Result<T, E>;
