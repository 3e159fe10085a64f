use crate::error::{BalanceSheetError, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Top-level sections of a statement document, in output order.
pub const STATEMENT_SECTIONS: [&str; 3] = ["assets", "liabilities", "equity"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum NodeKindHint {
    #[schemars(description = "A postable account. Must not declare children.")]
    Leaf,

    #[schemars(description = "A subtotal whose value must equal the sum of its children. Must declare at least one child.")]
    Category,
}

/// How a category's declared value relates to its children.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AggregationRule {
    #[schemars(description = "The declared value must equal the sum of the children's values. The default for every category.")]
    Sum,

    #[schemars(
        description = "Each child is one side of an accounting equation and must individually equal the declared value (e.g., a statement total whose children are 'Assets' and 'Liabilities and Equity')."
    )]
    Equation,
}

impl Default for AggregationRule {
    fn default() -> Self {
        Self::Sum
    }
}

/// Wire shape of one node of a balance sheet hierarchy.
///
/// Fields are optional at this level so that structural problems can be
/// reported with the path of the offending node instead of a bare decode error.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DocumentNode {
    #[serde(default)]
    #[schemars(description = "Human readable label of the category or account (e.g., 'Current Assets', 'Cash at Bank'). Required.")]
    pub name: Option<String>,

    #[serde(default)]
    #[schemars(
        description = "Declared monetary value. A number or a numeric string. Required on every node, including categories, where it is the claimed subtotal."
    )]
    pub value: Option<Value>,

    #[serde(default)]
    #[schemars(description = "Account identifier. String or number; null for most categories.")]
    pub account_id: Option<Value>,

    #[serde(default)]
    #[schemars(description = "Alternative key for the node identifier, used when account_id is absent.")]
    pub id: Option<Value>,

    #[serde(default)]
    #[schemars(description = "Optional explicit node kind. When absent the kind follows from the presence of children.")]
    pub kind: Option<NodeKindHint>,

    #[serde(default)]
    #[schemars(description = "Aggregation rule for categories. Defaults to sum.")]
    pub rule: Option<AggregationRule>,

    #[serde(default)]
    #[schemars(with = "Option<Vec<DocumentNode>>")]
    #[schemars(description = "Child nodes. A node with a non-empty items list is a category.")]
    pub items: Option<Vec<Value>>,

    #[serde(default)]
    #[schemars(with = "Option<Vec<DocumentNode>>")]
    #[schemars(description = "Alternative key for child nodes. Must not be combined with items.")]
    pub children: Option<Vec<Value>>,

    // Any other scalar field is a descriptive attribute.
    #[serde(flatten)]
    pub attributes: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BalanceSheetDocument {
    #[schemars(description = "Root of the asset hierarchy")]
    pub assets: DocumentNode,

    #[schemars(description = "Root of the liability hierarchy")]
    pub liabilities: DocumentNode,

    #[schemars(description = "Root of the equity hierarchy")]
    pub equity: DocumentNode,
}

impl BalanceSheetDocument {
    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(BalanceSheetDocument)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

/// Top-level gate for sectioned documents: an object whose `assets`,
/// `liabilities` and `equity` members are all present and are objects.
pub fn check_statement_shape(document: &Value) -> Result<()> {
    let object = document.as_object().ok_or_else(|| {
        BalanceSheetError::SchemaViolation("document root must be an object".to_string())
    })?;

    for section in STATEMENT_SECTIONS {
        match object.get(section) {
            Some(Value::Object(_)) => {}
            Some(other) => {
                return Err(BalanceSheetError::SchemaViolation(format!(
                    "section '{}' must be an object, found {}",
                    section,
                    json_type_name(other)
                )))
            }
            None => {
                return Err(BalanceSheetError::SchemaViolation(format!(
                    "missing required section '{}'",
                    section
                )))
            }
        }
    }

    Ok(())
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
