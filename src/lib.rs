//! # Balance Sheet Flattener
//!
//! A library for checking that a hierarchical balance sheet adds up at every
//! level, and for collapsing a checked hierarchy into flat, account-level rows
//! ready for warehousing.
//!
//! ## Core Concepts
//!
//! - **Category**: A node whose declared value is a claim about its children
//!   (their sum, or for an equation category, each side of the equation)
//! - **Leaf Account**: A postable account whose declared value is ground truth
//! - **Discrepancy**: A category whose claim does not hold within an absolute tolerance.
//!   Every discrepancy in the document is reported, never corrected
//! - **Flattening**: One row per leaf, carrying ancestor categories as dimensions.
//!   Only performed after a clean validation
//! - **Statements**: Documents split into `assets`, `liabilities` and `equity` sections
//!   are also checked against Assets = Liabilities + Equity
//!
//! ## Example
//!
//! ```rust,ignore
//! use balance_sheet_flattener::*;
//! use serde_json::json;
//!
//! let document = json!({
//!     "name": "Assets",
//!     "value": 100,
//!     "items": [
//!         {"name": "Cash", "value": 60, "account_id": "1000"},
//!         {"name": "Accounts Receivable", "value": 40, "account_id": "1100"}
//!     ]
//! });
//!
//! let outcome = process_document(&document, &ValidationConfig::default()).unwrap();
//! assert!(outcome.report.passed);
//! assert_eq!(outcome.records.unwrap().len(), 2);
//! ```

pub mod config;
pub mod error;
pub mod export;
pub mod flattener;
pub mod schema;
pub mod statement;
pub mod tree;
pub mod validator;

pub use config::{ValidationConfig, DEFAULT_TOLERANCE};
pub use error::{BalanceSheetError, Result};
pub use export::{dimension_columns, records_to_csv, records_to_json};
pub use flattener::{flatten, FlatAccountRecord, CATEGORY_DIMENSION, CATEGORY_ID_DIMENSION};
pub use schema::*;
pub use statement::{build_statement_tree, build_tree, DocumentShape, SECTION_DIMENSION};
pub use tree::{Node, NodeKind};
pub use validator::{validate_tree, DiscrepancyRecord, EquationValidator, ValidationReport};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutcome {
    pub report: ValidationReport,
    /// Present only when the report passed.
    pub records: Option<Vec<FlatAccountRecord>>,
}

impl PipelineOutcome {
    pub fn passed(&self) -> bool {
        self.report.passed
    }
}

pub struct BalanceSheetProcessor;

impl BalanceSheetProcessor {
    /// Builds, validates and, when balanced, flattens one document.
    ///
    /// Structural problems abort with an error. Discrepancies do not: the
    /// outcome carries the full report and no records.
    pub fn process(document: &Value, config: &ValidationConfig) -> Result<PipelineOutcome> {
        config.validate()?;

        info!("Building balance sheet hierarchy");
        let tree = build_tree(document)?;
        debug!(
            "Hierarchy '{}' has {} nodes, {} leaf accounts, depth {}",
            tree.name,
            tree.node_count(),
            tree.leaf_count(),
            tree.depth()
        );

        info!("Validating the values of the balance sheet");
        let report = validate_tree(&tree, config)?;

        if !report.passed {
            info!("{}", report.summary());
            return Ok(PipelineOutcome {
                report,
                records: None,
            });
        }

        info!("Converting balance sheet to tabular format");
        let records = flatten(&tree, Some(&report))?;

        Ok(PipelineOutcome {
            report,
            records: Some(records),
        })
    }

    pub fn process_json_str(json: &str, config: &ValidationConfig) -> Result<PipelineOutcome> {
        let document: Value = serde_json::from_str(json)?;
        Self::process(&document, config)
    }
}

pub fn process_document(document: &Value, config: &ValidationConfig) -> Result<PipelineOutcome> {
    BalanceSheetProcessor::process(document, config)
}

pub fn process_json_str(json: &str, config: &ValidationConfig) -> Result<PipelineOutcome> {
    BalanceSheetProcessor::process_json_str(json, config)
}
