//! Cascading denormalization over a document store.
//!
//! This crate is the core of the denorm project and provides:
//!
//! - **Document traits** ([`document`]) - Records, their identity, and the cascading capability query
//! - **Change tracking** ([`tracking`]) - Snapshots and schema-driven field diffs
//! - **Cascade engine** ([`cascade`]) - Directives and their translation into partial updates
//! - **Background propagation** ([`queue`]) - A worker queue for eventually consistent cascades
//! - **Store backend abstraction** ([`backend`]) - The narrow collection accessor backends implement
//! - **Filters and updates** ([`query`], [`update`]) - Target selection and set/unset/pull/push operations
//! - **Path helpers** ([`path`]) - Dotted-path addressing and property projection
//! - **Collections and store** ([`collection`], [`store`]) - Write-then-cascade record access
//! - **Configuration** ([`config`]) and **errors** ([`error`])
//!
//! # Example
//!
//! ```ignore
//! use denorm::{Document, DocumentStore};
//! use bson::Uuid;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct Parent {
//!     pub id: Uuid,
//!     pub name: String,
//! }
//!
//! impl Document for Parent {
//!     fn id(&self) -> &Uuid {
//!         &self.id
//!     }
//!
//!     fn collection_name() -> &'static str {
//!         "parents"
//!     }
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as denorm_core;

pub mod backend;
pub mod cascade;
pub mod collection;
pub mod config;
pub mod document;
pub mod error;
pub mod path;
pub mod query;
pub mod queue;
pub mod store;
pub mod tracking;
pub mod update;
