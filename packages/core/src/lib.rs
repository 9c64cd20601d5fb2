//! Navigation Tree Core
//!
//! Assembles flat, relationally linked records (containers, groups, arcs,
//! sessions, leaves and external resources) into one in-memory hierarchy,
//! keeps it indexed by id and exposes UI state and validated mutations over it.
//!
//! # Architecture
//!
//! - **Rebuild, don't patch**: every successful write triggers a full rebuild
//! - **Index + tree**: nodes live in a flat id map; `children` holds ids
//! - **Asymmetric ancestry**: `parent_id` only for real leaf nesting, virtual
//!   group membership resolved through the children lists
//! - **Collaborator seams**: all I/O goes through async traits
//!
//! # Modules
//!
//! - [`models`] - tree node and flat record types
//! - [`services`] - index, builder, UI state, mutations and the facade
//! - [`collaborators`] - data-source, writer, storage and context traits
//! - [`storage`] - client storage implementations
//! - [`config`] - tree configuration

pub mod collaborators;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod storage;

pub use config::TreeConfig;
pub use error::{CollaboratorError, TreeError, TreeResult};
pub use models::*;
pub use services::*;
