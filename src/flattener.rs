use crate::error::{BalanceSheetError, Result};
use crate::tree::{Node, NodeKind};
use crate::validator::ValidationReport;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Dimension key carrying the name of the nearest enclosing category.
pub const CATEGORY_DIMENSION: &str = "category";
/// Dimension key carrying the identifier of the nearest identified category.
pub const CATEGORY_ID_DIMENSION: &str = "category_id";

/// One warehouse row: a leaf account plus the context inherited from its
/// ancestors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatAccountRecord {
    pub account_id: Option<String>,
    pub account_name: String,
    pub value: f64,
    /// Names of the enclosing categories, root first.
    pub path: Vec<String>,
    pub dimensions: BTreeMap<String, String>,
}

impl FlatAccountRecord {
    pub fn path_string(&self) -> String {
        self.path.join("/")
    }
}

enum Frame<'a> {
    Visit(&'a Node),
    Leave(Vec<(String, Option<String>)>),
}

/// Collapses a validated tree into one record per leaf, in root-first,
/// left-to-right order.
///
/// Refuses to run without a passing report for this same tree.
pub fn flatten(root: &Node, report: Option<&ValidationReport>) -> Result<Vec<FlatAccountRecord>> {
    let report = report.ok_or_else(|| {
        BalanceSheetError::PreconditionViolated(
            "no validation report was supplied for the tree".to_string(),
        )
    })?;

    if !report.passed {
        return Err(BalanceSheetError::PreconditionViolated(format!(
            "validation found {} discrepancies; unbalanced data cannot be flattened",
            report.discrepancies.len()
        )));
    }

    let node_count = root.node_count();
    if report.nodes_visited != node_count {
        return Err(BalanceSheetError::PreconditionViolated(format!(
            "validation report covers {} nodes but the tree has {}",
            report.nodes_visited, node_count
        )));
    }

    if report.tree_fingerprint != root.fingerprint() {
        return Err(BalanceSheetError::PreconditionViolated(format!(
            "validation report does not match the tree under '{}'",
            root.name
        )));
    }

    let mut records = Vec::with_capacity(root.leaf_count());
    let mut dimensions: BTreeMap<String, String> = BTreeMap::new();
    let mut path: Vec<String> = Vec::new();
    let mut stack = vec![Frame::Visit(root)];

    while let Some(frame) = stack.pop() {
        match frame {
            Frame::Visit(node) => match &node.kind {
                NodeKind::Leaf => {
                    let mut row_dimensions = dimensions.clone();
                    for (key, value) in &node.attributes {
                        row_dimensions.insert(key.clone(), value.clone());
                    }

                    records.push(FlatAccountRecord {
                        account_id: node.id.clone(),
                        account_name: node.name.clone(),
                        value: node.declared_value,
                        path: path.clone(),
                        dimensions: row_dimensions,
                    });
                }
                NodeKind::Category { children, .. } => {
                    let saved = enter_category(node, &mut dimensions);
                    path.push(node.name.clone());
                    stack.push(Frame::Leave(saved));
                    stack.extend(children.iter().rev().map(Frame::Visit));
                }
            },
            Frame::Leave(saved) => {
                path.pop();
                for (key, previous) in saved.into_iter().rev() {
                    match previous {
                        Some(value) => dimensions.insert(key, value),
                        None => dimensions.remove(&key),
                    };
                }
            }
        }
    }

    debug!("Flattened {} nodes under '{}'", node_count, root.name);
    info!("Produced {} account rows from '{}'", records.len(), root.name);

    Ok(records)
}

/// Overlays the category's own context and returns what it replaced.
fn enter_category(
    node: &Node,
    dimensions: &mut BTreeMap<String, String>,
) -> Vec<(String, Option<String>)> {
    let mut overlay = vec![(CATEGORY_DIMENSION.to_string(), node.name.clone())];
    if let Some(id) = &node.id {
        overlay.push((CATEGORY_ID_DIMENSION.to_string(), id.clone()));
    }
    overlay.extend(
        node.attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.clone())),
    );

    overlay
        .into_iter()
        .map(|(key, value)| {
            let previous = dimensions.insert(key.clone(), value);
            (key, previous)
        })
        .collect()
}
