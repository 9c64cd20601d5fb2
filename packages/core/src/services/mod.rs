//! Tree Services
//!
//! - [`NodeIndex`] - id lookup and root ordering, shared as [`SharedIndex`]
//! - [`TreeBuilder`] - assembles the tree from flat records
//! - [`TreeUiState`] - selection, expansion and search filter
//! - [`TreeMutations`] - validated create/move/delete through the writer
//! - [`TreeStateService`] - facade wiring the above together

pub mod node_index;
pub mod tree_builder;
pub mod tree_mutations;
pub mod tree_state_service;
pub mod tree_ui_state;

pub use node_index::{shared, IntegrityViolation, NodeIndex, SharedIndex};
pub use tree_builder::{virtual_group_id, BuildResult, TreeBuilder};
pub use tree_mutations::{MovePlan, TreeMutations};
pub use tree_state_service::{Collaborators, TreeStateService};
pub use tree_ui_state::{PathSelection, TreeUiState};
