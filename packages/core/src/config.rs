/// Configuration for the navigation tree
use serde::{Deserialize, Serialize};

use crate::error::TreeError;

/// Upper bound accepted for `max_ancestor_depth`
const MAX_SUPPORTED_DEPTH: usize = 100_000;

/// Display titles for the synthesized virtual groups
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupLabels {
    pub groups: String,
    pub characters: String,
    pub content: String,
    pub external_resources: String,
    pub uncategorized: String,
    /// Root-level group for leaves with neither container nor parent
    pub unassigned: String,
}

impl Default for GroupLabels {
    fn default() -> Self {
        Self {
            groups: "Groups".to_string(),
            characters: "Characters".to_string(),
            content: "Content".to_string(),
            external_resources: "External Resources".to_string(),
            uncategorized: "Uncategorized".to_string(),
            unassigned: "Unassigned Items".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Client storage key holding the expanded-node set
    pub expanded_nodes_key: String,

    pub labels: GroupLabels,

    /// Bound on every ancestor walk; stops runaway walks over cyclic data
    pub max_ancestor_depth: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            expanded_nodes_key: "navtree_expanded_nodes".to_string(),
            labels: GroupLabels::default(),
            max_ancestor_depth: 1000,
        }
    }
}

impl TreeConfig {
    /// Defaults overlaid with `NAVTREE_EXPANDED_KEY` and `NAVTREE_MAX_DEPTH`
    pub fn from_env() -> Result<Self, TreeError> {
        let mut config = Self::default();

        if let Ok(key) = std::env::var("NAVTREE_EXPANDED_KEY") {
            config.expanded_nodes_key = key;
        }

        if let Ok(depth) = std::env::var("NAVTREE_MAX_DEPTH") {
            config.max_ancestor_depth = depth.trim().parse().map_err(|_| {
                TreeError::config(format!("NAVTREE_MAX_DEPTH is not a number: {depth}"))
            })?;
        }

        config.validate().map_err(TreeError::config)?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.expanded_nodes_key.trim().is_empty() {
            return Err("expanded_nodes_key cannot be empty".to_string());
        }

        if self.max_ancestor_depth == 0 {
            return Err("max_ancestor_depth must be greater than 0".to_string());
        }

        if self.max_ancestor_depth > MAX_SUPPORTED_DEPTH {
            return Err(format!(
                "max_ancestor_depth cannot exceed {}",
                MAX_SUPPORTED_DEPTH
            ));
        }

        Ok(())
    }
}
