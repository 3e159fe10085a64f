use crate::error::{BalanceSheetError, Result};
use crate::schema::{json_type_name, AggregationRule, NodeKindHint};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::iter::Enumerate;
use std::slice;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    /// A postable account. Its declared value is ground truth.
    Leaf,
    /// A subtotal. Its declared value is a claim about its children.
    Category {
        children: Vec<Node>,
        rule: AggregationRule,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub id: Option<String>,
    pub name: String,
    pub declared_value: f64,
    pub attributes: BTreeMap<String, String>,
    #[serde(flatten)]
    pub kind: NodeKind,
}

impl Node {
    pub fn leaf(name: impl Into<String>, declared_value: f64) -> Self {
        Self {
            id: None,
            name: name.into(),
            declared_value,
            attributes: BTreeMap::new(),
            kind: NodeKind::Leaf,
        }
    }

    /// Builds a summing category. An empty `children` list yields a leaf,
    /// since only nodes with children are categories.
    pub fn category(name: impl Into<String>, declared_value: f64, children: Vec<Node>) -> Self {
        Self::with_rule(name, declared_value, children, AggregationRule::Sum)
    }

    /// Builds a category whose children are the sides of an accounting
    /// equation, each expected to equal `declared_value`.
    pub fn equation(name: impl Into<String>, declared_value: f64, sides: Vec<Node>) -> Self {
        Self::with_rule(name, declared_value, sides, AggregationRule::Equation)
    }

    fn with_rule(
        name: impl Into<String>,
        declared_value: f64,
        children: Vec<Node>,
        rule: AggregationRule,
    ) -> Self {
        let kind = if children.is_empty() {
            NodeKind::Leaf
        } else {
            NodeKind::Category { children, rule }
        };

        Self {
            id: None,
            name: name.into(),
            declared_value,
            attributes: BTreeMap::new(),
            kind,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Assembles a tree from an already schema-gated document node.
    ///
    /// Only structural guards are applied here; no equation checking happens
    /// during construction.
    /// The walk keeps its own stack, so nesting depth is bounded by memory
    /// rather than by the call stack.
    pub fn from_value(value: &Value) -> Result<Self> {
        build_document(value)
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf)
    }

    pub fn children(&self) -> &[Node] {
        match &self.kind {
            NodeKind::Leaf => &[],
            NodeKind::Category { children, .. } => children,
        }
    }

    pub fn rule(&self) -> Option<AggregationRule> {
        match &self.kind {
            NodeKind::Leaf => None,
            NodeKind::Category { rule, .. } => Some(*rule),
        }
    }

    pub fn node_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children());
        }
        count
    }

    pub fn leaf_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if node.is_leaf() {
                count += 1;
            }
            stack.extend(node.children());
        }
        count
    }

    /// Order-sensitive digest of every node's identity, declared value,
    /// attributes and shape. Stable within one build of the crate only.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            node.id.hash(&mut hasher);
            node.name.hash(&mut hasher);
            node.declared_value.to_bits().hash(&mut hasher);
            node.attributes.hash(&mut hasher);
            node.rule().hash(&mut hasher);
            node.children().len().hash(&mut hasher);
            stack.extend(node.children().iter().rev());
        }
        hasher.finish()
    }

    /// Number of levels in the tree; a lone leaf has depth 1.
    pub fn depth(&self) -> usize {
        let mut max_depth = 0;
        let mut stack = vec![(self, 1)];
        while let Some((node, depth)) = stack.pop() {
            max_depth = max_depth.max(depth);
            stack.extend(node.children().iter().map(|c| (c, depth + 1)));
        }
        max_depth
    }
}

/// Fields a node object reserves; everything else is a descriptive attribute.
const NODE_FIELDS: [&str; 8] = [
    "name",
    "value",
    "account_id",
    "id",
    "kind",
    "rule",
    "items",
    "children",
];

/// A node read from its document object, with its children still unbuilt.
struct ReadNode<'a> {
    node: Node,
    rule: AggregationRule,
    children: &'a [Value],
}

/// A category whose children are being built.
struct OpenCategory<'a> {
    node: Node,
    rule: AggregationRule,
    built: Vec<Node>,
    pending: Enumerate<slice::Iter<'a, Value>>,
    pushed_id: bool,
}

impl<'a> OpenCategory<'a> {
    fn enter(read: ReadNode<'a>, path: &mut Vec<String>, ancestor_ids: &mut Vec<String>) -> Self {
        path.push(read.node.name.clone());
        let pushed_id = match &read.node.id {
            Some(id) => {
                ancestor_ids.push(id.clone());
                true
            }
            None => false,
        };

        Self {
            built: Vec::with_capacity(read.children.len()),
            pending: read.children.iter().enumerate(),
            node: read.node,
            rule: read.rule,
            pushed_id,
        }
    }

    fn close(self, path: &mut Vec<String>, ancestor_ids: &mut Vec<String>) -> Node {
        path.pop();
        if self.pushed_id {
            ancestor_ids.pop();
        }

        let mut node = self.node;
        node.kind = NodeKind::Category {
            children: self.built,
            rule: self.rule,
        };
        node
    }
}

// Children are detached onto a heap stack first, so dropping a deep tree
// never recurses.
impl Drop for Node {
    fn drop(&mut self) {
        let mut stack = match &mut self.kind {
            NodeKind::Category { children, .. } => std::mem::take(children),
            NodeKind::Leaf => return,
        };
        while let Some(mut node) = stack.pop() {
            if let NodeKind::Category { children, .. } = &mut node.kind {
                stack.append(children);
            }
        }
    }
}

fn build_document(root: &Value) -> Result<Node> {
    let mut path: Vec<String> = Vec::new();
    let mut ancestor_ids: Vec<String> = Vec::new();

    let read = read_node(root, "#root", &path, &ancestor_ids)?;
    if read.children.is_empty() {
        return Ok(read.node);
    }

    let mut current = OpenCategory::enter(read, &mut path, &mut ancestor_ids);
    let mut parents: Vec<OpenCategory> = Vec::new();

    loop {
        match current.pending.next() {
            Some((idx, raw)) => {
                let read = read_node(raw, &format!("#{}", idx), &path, &ancestor_ids)?;
                if read.children.is_empty() {
                    current.built.push(read.node);
                } else {
                    let child = OpenCategory::enter(read, &mut path, &mut ancestor_ids);
                    parents.push(std::mem::replace(&mut current, child));
                }
            }
            None => {
                let node = current.close(&mut path, &mut ancestor_ids);
                current = match parents.pop() {
                    Some(mut parent) => {
                        parent.built.push(node);
                        parent
                    }
                    None => return Ok(node),
                };
            }
        }
    }
}

/// Reads one node object without descending into its children. `path` and
/// `ancestor_ids` describe the enclosing categories.
fn read_node<'a>(
    raw: &'a Value,
    label: &str,
    path: &[String],
    ancestor_ids: &[String],
) -> Result<ReadNode<'a>> {
    let at = |segment: &str| {
        let mut at = path.to_vec();
        at.push(segment.to_string());
        at
    };
    let schema_error = |segment: &str, field: &str, details: String| {
        BalanceSheetError::SchemaViolation(format!(
            "{}: field '{}' {}",
            at(segment).join("/"),
            field,
            details
        ))
    };

    let object = match raw {
        Value::Object(object) => object,
        other => {
            return Err(BalanceSheetError::malformed(
                &at(label),
                format!("expected a node object, found {}", json_type_name(other)),
            ))
        }
    };

    let name = match object.get("name") {
        Some(Value::String(name)) => name.clone(),
        None | Some(Value::Null) => {
            return Err(BalanceSheetError::malformed(&at(label), "node has no name"))
        }
        Some(other) => {
            return Err(schema_error(
                label,
                "name",
                format!("must be a string, found {}", json_type_name(other)),
            ))
        }
    };
    let here = at(name.as_str());

    let declared_value = parse_declared_value(object.get("value"))
        .map_err(|details| BalanceSheetError::malformed(&here, details))?;

    let raw_id = match object.get("account_id") {
        None | Some(Value::Null) => object.get("id"),
        present => present,
    };
    let id = match raw_id {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(other) => {
            return Err(BalanceSheetError::malformed(
                &here,
                format!(
                    "identifier must be a string or a number, found {}",
                    json_type_name(other)
                ),
            ))
        }
    };

    if let Some(id) = &id {
        if ancestor_ids.contains(id) {
            return Err(BalanceSheetError::malformed(
                &here,
                format!("identifier '{}' repeats an ancestor identifier (cycle)", id),
            ));
        }
    }

    let kind = match object.get("kind") {
        None | Some(Value::Null) => None,
        Some(raw) => Some(
            NodeKindHint::deserialize(raw)
                .map_err(|e| schema_error(name.as_str(), "kind", e.to_string()))?,
        ),
    };
    let rule = match object.get("rule") {
        None | Some(Value::Null) => None,
        Some(raw) => Some(
            AggregationRule::deserialize(raw)
                .map_err(|e| schema_error(name.as_str(), "rule", e.to_string()))?,
        ),
    };

    let items = child_list(object.get("items"))
        .map_err(|details| schema_error(name.as_str(), "items", details))?;
    let children = child_list(object.get("children"))
        .map_err(|details| schema_error(name.as_str(), "children", details))?;
    let children: &[Value] = match (items, children) {
        (Some(_), Some(_)) => {
            return Err(BalanceSheetError::malformed(
                &here,
                "node declares both 'items' and 'children'",
            ))
        }
        (Some(list), None) | (None, Some(list)) => list,
        (None, None) => &[],
    };

    match kind {
        Some(NodeKindHint::Leaf) if !children.is_empty() => {
            return Err(BalanceSheetError::malformed(
                &here,
                format!(
                    "node is marked as a leaf but declares {} children",
                    children.len()
                ),
            ))
        }
        Some(NodeKindHint::Category) if children.is_empty() => {
            return Err(BalanceSheetError::malformed(
                &here,
                "node is marked as a category but declares no children",
            ))
        }
        _ => {}
    }

    if rule == Some(AggregationRule::Equation) && children.is_empty() {
        return Err(BalanceSheetError::malformed(
            &here,
            "equation rule declared on a node without children",
        ));
    }

    let mut attributes = BTreeMap::new();
    for (key, raw) in object {
        if NODE_FIELDS.contains(&key.as_str()) {
            continue;
        }
        let value = match raw {
            Value::Null => continue,
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            nested => {
                return Err(BalanceSheetError::malformed(
                    &here,
                    format!(
                        "attribute '{}' holds a nested {}; only scalar attributes are allowed",
                        key,
                        json_type_name(nested)
                    ),
                ))
            }
        };
        attributes.insert(key.clone(), value);
    }

    Ok(ReadNode {
        node: Node {
            id,
            name,
            declared_value,
            attributes,
            kind: NodeKind::Leaf,
        },
        rule: rule.unwrap_or_default(),
        children,
    })
}

fn child_list(value: Option<&Value>) -> std::result::Result<Option<&[Value]>, String> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(list)) => Ok(Some(list.as_slice())),
        Some(other) => Err(format!("must be an array, found {}", json_type_name(other))),
    }
}

fn parse_declared_value(value: Option<&Value>) -> std::result::Result<f64, String> {
    let parsed = match value {
        None | Some(Value::Null) => return Err("node has no value".to_string()),
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| format!("value {} is not representable as a number", n))?,
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("value '{}' is not numeric", s))?,
        Some(other) => {
            return Err(format!(
                "value must be numeric, found {}",
                json_type_name(other)
            ))
        }
    };

    if !parsed.is_finite() {
        return Err(format!("value {} is not finite", parsed));
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn expect_malformed(value: Value) -> (String, String) {
        match Node::from_value(&value) {
            Err(BalanceSheetError::MalformedHierarchy { path, details }) => (path, details),
            other => panic!("expected MalformedHierarchy, got {:?}", other),
        }
    }

    #[test]
    fn test_build_nested_tree() {
        let root = Node::from_value(&json!({
            "name": "Assets",
            "value": 100,
            "account_id": null,
            "items": [
                {"name": "Cash", "value": "60.00", "account_id": 1001, "account_type": "Bank"},
                {"name": "AR", "value": 40.0, "account_id": "AR-01"}
            ]
        }))
        .unwrap();

        assert!(!root.is_leaf());
        assert_eq!(root.id, None);
        assert_eq!(root.declared_value, 100.0);
        assert_eq!(root.children().len(), 2);

        let cash = &root.children()[0];
        assert!(cash.is_leaf());
        assert_eq!(cash.declared_value, 60.0);
        assert_eq!(cash.id.as_deref(), Some("1001"));
        assert_eq!(cash.attributes.get("account_type").map(String::as_str), Some("Bank"));

        assert_eq!(root.children()[1].id.as_deref(), Some("AR-01"));
        assert_eq!(root.node_count(), 3);
        assert_eq!(root.leaf_count(), 2);
        assert_eq!(root.depth(), 2);
    }

    #[test]
    fn test_children_key_and_empty_items() {
        let root = Node::from_value(&json!({
            "name": "Equity",
            "value": 5,
            "children": [{"name": "Shares", "value": 5, "items": []}]
        }))
        .unwrap();

        assert_eq!(root.children().len(), 1);
        assert!(root.children()[0].is_leaf());
    }

    #[test]
    fn test_leaf_hint_with_children_is_rejected() {
        let (path, details) = expect_malformed(json!({
            "name": "Assets",
            "value": 10,
            "items": [{
                "name": "Cash",
                "value": 10,
                "kind": "leaf",
                "items": [{"name": "Petty Cash", "value": 10}]
            }]
        }));
        assert_eq!(path, "Assets/Cash");
        assert!(details.contains("leaf"));
    }

    #[test]
    fn test_category_hint_without_children_is_rejected() {
        let (path, _) = expect_malformed(json!({"name": "Assets", "value": 0, "kind": "category"}));
        assert_eq!(path, "Assets");
    }

    #[test]
    fn test_missing_or_non_numeric_value_names_path() {
        let (path, details) = expect_malformed(json!({
            "name": "Liabilities",
            "value": 30,
            "items": [
                {"name": "Loans", "value": 30},
                {"name": "Accruals"}
            ]
        }));
        assert_eq!(path, "Liabilities/Accruals");
        assert!(details.contains("no value"));

        let (path, details) = expect_malformed(json!({
            "name": "Liabilities",
            "value": 30,
            "items": [{"name": "Loans", "value": "thirty"}]
        }));
        assert_eq!(path, "Liabilities/Loans");
        assert!(details.contains("not numeric"));

        let (_, details) = expect_malformed(json!({"name": "Loans", "value": true}));
        assert!(details.contains("boolean"));
    }

    #[test]
    fn test_both_children_keys_rejected() {
        let (_, details) = expect_malformed(json!({
            "name": "Assets",
            "value": 1,
            "items": [{"name": "A", "value": 1}],
            "children": [{"name": "B", "value": 1}]
        }));
        assert!(details.contains("both"));
    }

    #[test]
    fn test_non_object_child_and_nameless_node() {
        let (path, _) = expect_malformed(json!({
            "name": "Assets",
            "value": 1,
            "items": [{"name": "A", "value": 1}, 42]
        }));
        assert_eq!(path, "Assets/#1");

        let (path, details) = expect_malformed(json!({
            "name": "Assets",
            "value": 1,
            "items": [{"value": 1}]
        }));
        assert_eq!(path, "Assets/#0");
        assert!(details.contains("no name"));
    }

    #[test]
    fn test_repeated_ancestor_identifier_is_a_cycle() {
        let (path, details) = expect_malformed(json!({
            "name": "Assets",
            "value": 1,
            "account_id": "A",
            "items": [{
                "name": "Current",
                "value": 1,
                "account_id": "B",
                "items": [{"name": "Loop", "value": 1, "account_id": "A"}]
            }]
        }));
        assert_eq!(path, "Assets/Current/Loop");
        assert!(details.contains("cycle"));
    }

    #[test]
    fn test_sibling_identifiers_may_repeat_across_branches() {
        let root = Node::from_value(&json!({
            "name": "Assets",
            "value": 2,
            "items": [
                {"name": "X", "value": 1, "account_id": "dup", "items": [{"name": "X1", "value": 1}]},
                {"name": "Y", "value": 1, "account_id": "dup"}
            ]
        }));
        assert!(root.is_ok());
    }

    #[test]
    fn test_nested_attribute_rejected() {
        let (_, details) = expect_malformed(json!({
            "name": "Cash",
            "value": 1,
            "meta": {"items": []}
        }));
        assert!(details.contains("meta"));
    }

    #[test]
    fn test_equation_rule() {
        let root = Node::from_value(&json!({
            "name": "Balance Sheet",
            "value": 100,
            "rule": "equation",
            "items": [
                {"name": "Assets", "value": 100},
                {"name": "Liabilities+Equity", "value": 100}
            ]
        }))
        .unwrap();
        assert_eq!(root.rule(), Some(AggregationRule::Equation));
        assert_eq!(root.children()[0].rule(), None);

        let (path, _) = expect_malformed(json!({"name": "Total", "value": 1, "rule": "equation"}));
        assert_eq!(path, "Total");
    }

    #[test]
    fn test_serialized_shape() {
        let root = Node::category("Assets", 1.0, vec![Node::leaf("Cash", 1.0)]);
        let value = serde_json::to_value(&root).unwrap();

        assert_eq!(value["kind"], "category");
        assert_eq!(value["rule"], "sum");
        assert_eq!(value["children"][0]["kind"], "leaf");
        assert_eq!(value["children"][0]["declared_value"], 1.0);
    }

    #[test]
    fn test_deeply_nested_document_builds_and_drops() {
        let depth = 10_000;
        let mut document = json!({"name": "Bottom", "value": 1, "account_id": "B"});
        for level in 0..depth {
            document = json!({
                "name": format!("Level {}", level),
                "value": 1,
                "items": [document]
            });
        }

        let root = Node::from_value(&document).unwrap();
        assert_eq!(root.depth(), depth + 1);
        assert_eq!(root.node_count(), depth + 1);
        assert_eq!(root.leaf_count(), 1);
        drop(root);

        // serde_json drops nested values recursively; unwind the fixture by hand.
        let mut current = Some(document);
        while let Some(mut value) = current.take() {
            current = value
                .get_mut("items")
                .and_then(Value::as_array_mut)
                .and_then(|items| items.pop());
        }
    }

    #[test]
    fn test_error_path_inside_deep_branch() {
        let (path, details) = expect_malformed(json!({
            "name": "Assets",
            "value": 3,
            "items": [
                {"name": "Cash", "value": 1},
                {
                    "name": "Current",
                    "value": 2,
                    "items": [
                        {"name": "AR", "value": 1},
                        {"name": "Inventory", "value": 1, "kind": "category"}
                    ]
                }
            ]
        }));
        assert_eq!(path, "Assets/Current/Inventory");
        assert!(details.contains("category"));
    }

    #[test]
    fn test_wrongly_typed_fields_are_schema_violations() {
        let result = Node::from_value(&json!({"name": "Assets", "value": 1, "items": "Cash"}));
        match result {
            Err(BalanceSheetError::SchemaViolation(msg)) => {
                assert!(msg.contains("Assets"));
                assert!(msg.contains("items"));
            }
            other => panic!("expected schema violation, got {:?}", other),
        }

        assert!(matches!(
            Node::from_value(&json!({"name": "Cash", "value": 1, "kind": "account"})),
            Err(BalanceSheetError::SchemaViolation(_))
        ));
        assert!(matches!(
            Node::from_value(&json!({"name": 7, "value": 1})),
            Err(BalanceSheetError::SchemaViolation(_))
        ));
    }

    #[test]
    fn test_fingerprint_tracks_values_and_shape() {
        let base = Node::category("Assets", 1.0, vec![Node::leaf("Cash", 1.0)]);
        assert_eq!(base.fingerprint(), base.clone().fingerprint());

        let revalued = Node::category("Assets", 999.0, vec![Node::leaf("Cash", 1.0)]);
        let renamed = Node::category("Assets", 1.0, vec![Node::leaf("Bank", 1.0)]);
        let tagged = base.clone().with_attribute("region", "NZ");
        for other in [&revalued, &renamed, &tagged] {
            assert_eq!(other.node_count(), base.node_count());
            assert_ne!(other.fingerprint(), base.fingerprint());
        }

        let swapped = Node::category("Root", 3.0, vec![Node::leaf("A", 1.0), Node::leaf("B", 2.0)]);
        let original = Node::category("Root", 3.0, vec![Node::leaf("B", 2.0), Node::leaf("A", 1.0)]);
        assert_ne!(swapped.fingerprint(), original.fingerprint());
    }

    #[test]
    fn test_builders() {
        let root = Node::category(
            "Assets",
            3.0,
            vec![Node::leaf("Cash", 1.0).with_id("1000"), Node::leaf("AR", 2.0)],
        )
        .with_attribute("statement", "balance_sheet");

        assert_eq!(root.attributes["statement"], "balance_sheet");
        assert_eq!(root.children()[0].id.as_deref(), Some("1000"));
        assert_eq!(root.rule(), Some(AggregationRule::Sum));
        assert!(Node::category("Empty", 0.0, vec![]).is_leaf());
    }
}
