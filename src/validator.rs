use crate::config::{ValidationConfig, DEFAULT_TOLERANCE};
use crate::error::{BalanceSheetError, Result};
use crate::schema::AggregationRule;
use crate::tree::{Node, NodeKind};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

/// A category whose declared value disagrees with what its children add up
/// to (or, for an equation category, with one of its sides).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscrepancyRecord {
    pub node_id: Option<String>,
    pub node_name: String,
    pub declared_value: f64,
    pub computed_value: f64,
    /// `declared_value - computed_value`
    pub difference: f64,
    /// Names from the root down to and including the offending node.
    pub path: Vec<String>,
}

impl DiscrepancyRecord {
    pub fn path_string(&self) -> String {
        self.path.join("/")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub passed: bool,
    /// Ordered by the position of the offending node in a root-first,
    /// left-to-right walk.
    pub discrepancies: Vec<DiscrepancyRecord>,
    pub nodes_visited: usize,
    /// Effective value of the root, i.e. its declared value.
    pub root_value: f64,
    pub tolerance: f64,
    /// [`Node::fingerprint`] of the validated tree.
    pub tree_fingerprint: u64,
}

impl ValidationReport {
    pub fn summary(&self) -> String {
        if self.passed {
            format!(
                "Balanced: {} nodes checked, root value {:.2}",
                self.nodes_visited, self.root_value
            )
        } else {
            format!(
                "Unbalanced: {} discrepancies across {} nodes checked (tolerance {})",
                self.discrepancies.len(),
                self.nodes_visited,
                self.tolerance
            )
        }
    }

    pub fn to_markdown(&self) -> String {
        let mut output = String::new();
        output.push_str(&format!("**{}**\n\n", self.summary()));

        if self.discrepancies.is_empty() {
            return output;
        }

        output.push_str("| Path | Declared | Computed | Difference |\n");
        output.push_str("|---|---:|---:|---:|\n");
        for d in &self.discrepancies {
            output.push_str(&format!(
                "| {} | {:.2} | {:.2} | {:.2} |\n",
                d.path_string(),
                d.declared_value,
                d.computed_value,
                d.difference
            ));
        }

        output
    }
}

enum Step<'a> {
    Enter(&'a Node),
    Exit {
        node: &'a Node,
        order: usize,
        first_child_value: usize,
    },
}

pub struct EquationValidator {
    tolerance: f64,
}

impl EquationValidator {
    pub fn new(tolerance: f64) -> Result<Self> {
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(BalanceSheetError::InvalidTolerance(tolerance));
        }
        Ok(Self { tolerance })
    }

    pub fn from_config(config: &ValidationConfig) -> Result<Self> {
        config.validate()?;
        Self::new(config.tolerance)
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Checks every category against its children: summing categories
    /// against the sum of their children, equation categories against each
    /// child in turn.
    ///
    /// The walk is post-order with an explicit stack, visits every node and
    /// never stops at the first mismatch. Each node contributes its declared
    /// value upward, balanced or not.
    pub fn validate(&self, root: &Node) -> ValidationReport {
        let mut stack = vec![Step::Enter(root)];
        let mut values: Vec<f64> = Vec::new();
        let mut path: Vec<&str> = Vec::new();
        let mut found: Vec<(usize, DiscrepancyRecord)> = Vec::new();
        let mut visited = 0usize;

        while let Some(step) = stack.pop() {
            match step {
                Step::Enter(node) => {
                    let order = visited;
                    visited += 1;

                    match &node.kind {
                        NodeKind::Leaf => values.push(node.declared_value),
                        NodeKind::Category { children, .. } => {
                            path.push(&node.name);
                            stack.push(Step::Exit {
                                node,
                                order,
                                first_child_value: values.len(),
                            });
                            stack.extend(children.iter().rev().map(Step::Enter));
                        }
                    }
                }
                Step::Exit {
                    node,
                    order,
                    first_child_value,
                } => {
                    let child_values: Vec<f64> = values.drain(first_child_value..).collect();
                    let candidates = match node.rule() {
                        Some(AggregationRule::Equation) => child_values,
                        _ => vec![child_values.iter().sum::<f64>()],
                    };

                    for computed in candidates {
                        let difference = node.declared_value - computed;
                        if difference.abs() <= self.tolerance {
                            continue;
                        }

                        warn!(
                            "Value mismatch for {}: declared = {}, computed = {}, difference = {}",
                            path.join("/"),
                            node.declared_value,
                            computed,
                            difference
                        );
                        found.push((
                            order,
                            DiscrepancyRecord {
                                node_id: node.id.clone(),
                                node_name: node.name.clone(),
                                declared_value: node.declared_value,
                                computed_value: computed,
                                difference,
                                path: path.iter().map(|s| s.to_string()).collect(),
                            },
                        ));
                    }

                    path.pop();
                    values.push(node.declared_value);
                }
            }
        }

        // Stable sort keeps equation sides in child order.
        found.sort_by_key(|(order, _)| *order);
        let discrepancies: Vec<DiscrepancyRecord> = found.into_iter().map(|(_, d)| d).collect();
        let passed = discrepancies.is_empty();

        debug!(
            "Visited {} nodes under '{}' with tolerance {}",
            visited, root.name, self.tolerance
        );
        if passed {
            info!("All parent-child sums under '{}' validated successfully", root.name);
        } else {
            info!(
                "Found {} discrepancies under '{}'",
                discrepancies.len(),
                root.name
            );
        }

        ValidationReport {
            passed,
            discrepancies,
            nodes_visited: visited,
            root_value: root.declared_value,
            tolerance: self.tolerance,
            tree_fingerprint: root.fingerprint(),
        }
    }
}

impl Default for EquationValidator {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

pub fn validate_tree(root: &Node, config: &ValidationConfig) -> Result<ValidationReport> {
    let validator = EquationValidator::from_config(config)?;
    Ok(validator.validate(root))
}
