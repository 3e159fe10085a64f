use crate::error::{BalanceSheetError, Result};
use crate::schema::{check_statement_shape, STATEMENT_SECTIONS};
use crate::tree::Node;
use log::debug;
use serde_json::Value;

pub const STATEMENT_NAME: &str = "Balance Sheet";
pub const LIABILITIES_AND_EQUITY: &str = "Liabilities and Equity";
/// Dimension key recording which top-level section a row came from.
pub const SECTION_DIMENSION: &str = "section";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentShape {
    /// A single hierarchy whose root is a node object.
    Tree,
    /// An object with `assets`, `liabilities` and `equity` hierarchies.
    Statement,
}

impl DocumentShape {
    /// A statement is a nameless object with at least one object-valued
    /// section; a node object with a scalar `equity` attribute stays a tree.
    pub fn detect(document: &Value) -> Self {
        match document.as_object() {
            Some(object)
                if !object.contains_key("name")
                    && STATEMENT_SECTIONS
                        .iter()
                        .any(|s| matches!(object.get(*s), Some(Value::Object(_)))) =>
            {
                Self::Statement
            }
            _ => Self::Tree,
        }
    }
}

/// Builds the in-memory tree for either document shape.
pub fn build_tree(document: &Value) -> Result<Node> {
    match DocumentShape::detect(document) {
        DocumentShape::Tree => Node::from_value(document),
        DocumentShape::Statement => build_statement_tree(document),
    }
}

/// Combines the three sections into one tree that encodes the accounting
/// identity:
///
/// ```text
/// Balance Sheet (equation, declared = total assets)
/// ├── assets
/// └── Liabilities and Equity (sum, declared = liabilities + equity)
///     ├── liabilities
///     └── equity
/// ```
///
/// The equation root then reports Assets != Liabilities + Equity like any
/// other discrepancy.
pub fn build_statement_tree(document: &Value) -> Result<Node> {
    check_statement_shape(document)?;

    let assets = build_section(document, "assets")?;
    let liabilities = build_section(document, "liabilities")?;
    let equity = build_section(document, "equity")?;

    debug!(
        "Statement totals: assets = {}, liabilities = {}, equity = {}",
        assets.declared_value, liabilities.declared_value, equity.declared_value
    );

    let funding_total = liabilities.declared_value + equity.declared_value;
    let funding = Node::category(LIABILITIES_AND_EQUITY, funding_total, vec![liabilities, equity]);

    Ok(Node::equation(
        STATEMENT_NAME,
        assets.declared_value,
        vec![assets, funding],
    ))
}

fn build_section(document: &Value, section: &str) -> Result<Node> {
    let node = Node::from_value(&document[section]).map_err(|e| match e {
        BalanceSheetError::MalformedHierarchy { path, details } => {
            BalanceSheetError::MalformedHierarchy {
                path: format!("{}/{}", section, path),
                details,
            }
        }
        other => other,
    })?;

    Ok(node.with_attribute(SECTION_DIMENSION, section))
}
