//! Tree Dump
//!
//! Builds the navigation tree from a JSON fixture and prints it as an
//! indented outline. Useful for checking placement rules against real exports
//! without a running backend.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin tree-dump -- packages/dev-tools/fixtures/sample.json
//!
//! # Only show matches (and their ancestors) for a query
//! cargo run --bin tree-dump -- fixture.json --search backstory
//!
//! # Expand the path to a node and mark it selected
//! cargo run --bin tree-dump -- fixture.json --select <uuid>
//!
//! # Every flag
//! cargo run --bin tree-dump -- --help
//! ```
//!
//! Log level follows `RUST_LOG`, defaulting to `info`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use navtree_core::collaborators::{
    MemoryDataSource, MemoryLeafWriter, StaticAppContext, TreeFixture,
};
use navtree_core::services::{Collaborators, NodeIndex, PathSelection, TreeStateService};
use navtree_core::storage::MemoryStorage;
use navtree_core::{NodeId, TreeConfig, TreeNode};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "tree-dump",
    about = "Build the navigation tree from a JSON fixture and print it"
)]
struct Args {
    /// Fixture file with containers, groups, arcs, sessions and leaves
    fixture: PathBuf,
    /// Only show leaves whose title contains this text
    #[arg(long)]
    search: Option<String>,
    /// Expand the path to this node id and select it
    #[arg(long)]
    select: Option<NodeId>,
    /// Print children of collapsed nodes too
    #[arg(long)]
    all: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let raw = tokio::fs::read_to_string(&args.fixture)
        .await
        .with_context(|| format!("reading {}", args.fixture.display()))?;
    let fixture: TreeFixture = serde_json::from_str(&raw).context("parsing fixture")?;

    let source = Arc::new(MemoryDataSource::from_fixture(fixture));
    let service = TreeStateService::new(
        Collaborators {
            source: source.clone(),
            writer: Arc::new(MemoryLeafWriter::new(source)),
            storage: Arc::new(MemoryStorage::new()),
            context: Arc::new(StaticAppContext::default()),
        },
        TreeConfig::from_env()?,
    );
    service.initialize().await?;

    if let Some(id) = args.select {
        if service.expand_path_and_select(id) == PathSelection::NotFound {
            warn!(node_id = %id, "Node not in tree");
        }
    }
    if let Some(query) = &args.search {
        service.set_search_query(query);
    }

    service.with_index(|index| {
        let mut out = String::new();
        for root in index.root_nodes() {
            render(index, root, 0, args.all, &mut out);
        }
        print!("{out}");

        let violations = index.check_integrity();
        if violations.is_empty() {
            info!(nodes = index.len(), "Tree is consistent");
        } else {
            for violation in &violations {
                warn!(?violation, "Integrity violation");
            }
        }
    });

    Ok(())
}

/// Visible nodes only; children of collapsed nodes are skipped unless `all`
fn render(index: &NodeIndex, node: &TreeNode, depth: usize, all: bool, out: &mut String) {
    if !node.is_visible {
        return;
    }

    let marker = match (node.has_children(), node.is_expanded || all) {
        (false, _) => ' ',
        (true, true) => 'v',
        (true, false) => '>',
    };
    let selected = if node.is_selected { " *" } else { "" };
    out.push_str(&format!(
        "{:indent$}{marker} {} [{:?}]{selected}\n",
        "",
        display_title(node),
        node.node_type,
        indent = depth * 2
    ));

    if node.is_expanded || all {
        for child in index.children_of(node.id) {
            render(index, child, depth + 1, all, out);
        }
    }
}

fn display_title(node: &TreeNode) -> &str {
    if node.title.is_empty() {
        "(untitled)"
    } else {
        &node.title
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn test_parses_flags() {
        let id = NodeId::new_v4();
        let args = Args::try_parse_from([
            "tree-dump",
            "sample.json",
            "--search",
            "backstory",
            "--select",
            &id.to_string(),
            "--all",
        ])
        .expect("flags should parse");

        assert_eq!(args.fixture, PathBuf::from("sample.json"));
        assert_eq!(args.search.as_deref(), Some("backstory"));
        assert_eq!(args.select, Some(id));
        assert!(args.all);
    }

    #[test]
    fn test_rejects_bad_node_id_and_missing_fixture() {
        let bad = Args::try_parse_from(["tree-dump", "sample.json", "--select", "nope"])
            .expect_err("non-uuid id should fail");
        assert_eq!(bad.kind(), ErrorKind::ValueValidation);

        let missing = Args::try_parse_from(["tree-dump"]).expect_err("fixture is required");
        assert_eq!(missing.kind(), ErrorKind::MissingRequiredArgument);
    }
}
