//! Helpers shared by the façade and the drivers.

use crate::driver::EdgePolicy;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use strata_core::{DaoError, Edge, ErrorKey, Node, Properties, Result};

/// Attach `edges` to `nodes` following `policy`.
///
/// With [`EdgePolicy::Strict`], only edges whose both ends are among
/// `nodes` or `visible_node_ids` are kept.
pub fn populate_nodes_with_edges(
    mut nodes: Vec<Node>,
    edges: Vec<Edge>,
    policy: EdgePolicy,
    visible_node_ids: &[String],
) -> Vec<Node> {
    if policy == EdgePolicy::None {
        return nodes;
    }

    let positions: HashMap<String, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.clone(), i))
        .collect();
    let visible: HashSet<&str> = visible_node_ids.iter().map(String::as_str).collect();
    let known = |id: &str| positions.contains_key(id) || visible.contains(id);

    let mut attached: Vec<Vec<Edge>> = vec![Vec::new(); nodes.len()];
    for edge in edges {
        if policy == EdgePolicy::Strict && !(known(&edge.source) && known(&edge.target)) {
            continue;
        }
        let source = positions.get(&edge.source).copied();
        let target = positions.get(&edge.target).copied();
        match (source, target) {
            (Some(s), Some(t)) if s != t => {
                attached[s].push(edge.clone());
                attached[t].push(edge);
            }
            (Some(i), _) | (_, Some(i)) => attached[i].push(edge),
            (None, None) => {}
        }
    }

    for (node, edges) in nodes.iter_mut().zip(attached) {
        node.edges = Some(edges);
    }
    nodes
}

/// Fail with `node_not_found` / `edge_not_found` naming the smallest
/// wanted id that is absent from `found_ids`
pub fn check_missing<'a>(
    item: &str,
    wanted: &[String],
    found_ids: impl IntoIterator<Item = &'a str>,
) -> Result<()> {
    let found: HashSet<&str> = found_ids.into_iter().collect();
    let missing: BTreeSet<&str> = wanted
        .iter()
        .map(String::as_str)
        .filter(|id| !found.contains(id))
        .collect();

    match missing.into_iter().next() {
        None => Ok(()),
        Some(first) => {
            let key = if item == "edge" {
                ErrorKey::EdgeNotFound
            } else {
                ErrorKey::NodeNotFound
            };
            Err(DaoError::business(
                key,
                format!("{} #{first} was not found.", capitalize(item)),
            ))
        }
    }
}

/// Property value used as alternative id, as a string
pub fn property_as_id(data: &Properties, property: &str) -> Option<String> {
    match data.get(property)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Drop nulls, serialize arrays when asked, reject nested objects and
/// empty keys
pub fn normalize_properties(properties: Properties, serialize_arrays: bool) -> Result<Properties> {
    let mut normalized = Properties::new();
    for (key, value) in properties {
        if key.is_empty() {
            return Err(DaoError::invalid_parameter(
                "\"data\" must not contain an empty property key",
            ));
        }
        match value {
            Value::Null => {}
            Value::Array(items) if serialize_arrays => {
                normalized.insert(key, Value::String(serde_json::to_string(&items)?));
            }
            Value::Object(_) => {
                return Err(DaoError::invalid_parameter(format!(
                    "Property \"{key}\" has an invalid type (object)"
                )));
            }
            other => {
                normalized.insert(key, other);
            }
        }
    }
    Ok(normalized)
}

/// Order an unordered path walk from `start`, giving each node the edge
/// towards its successor. The last node gets an empty edge list.
pub fn order_path(start: &str, nodes: Vec<Node>, mut edges: Vec<Edge>) -> Result<Vec<Node>> {
    let mut by_id: HashMap<String, Node> = nodes.into_iter().map(|n| (n.id.clone(), n)).collect();
    let mut path = Vec::with_capacity(by_id.len());
    let mut current = start.to_string();

    while let Some(mut node) = by_id.remove(&current) {
        let next = edges.iter().position(|e| e.source == current || e.target == current);
        match next {
            Some(i) => {
                let edge = edges.swap_remove(i);
                current = if edge.source == current {
                    edge.target.clone()
                } else {
                    edge.source.clone()
                };
                node.edges = Some(vec![edge]);
                path.push(node);
            }
            None => {
                node.edges = Some(Vec::new());
                path.push(node);
                break;
            }
        }
    }

    if !by_id.is_empty() || !edges.is_empty() {
        return Err(DaoError::technical(
            ErrorKey::UnexpectedResponse,
            format!("Path starting at node #{start} is not connected"),
        ));
    }
    Ok(path)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(id: &str) -> Node {
        Node::new(id, vec![], Properties::new())
    }

    fn edge(id: &str, source: &str, target: &str) -> Edge {
        Edge::new(id, "LINK", source, target, Properties::new())
    }

    fn props(value: Value) -> Properties {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_populate_all() {
        let nodes = populate_nodes_with_edges(
            vec![node("1"), node("2")],
            vec![edge("a", "1", "2"), edge("b", "1", "9")],
            EdgePolicy::All,
            &[],
        );
        assert_eq!(nodes[0].edges.as_ref().unwrap().len(), 2);
        assert_eq!(nodes[1].edges.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_populate_strict_uses_visible_ids() {
        let nodes = populate_nodes_with_edges(
            vec![node("1"), node("2")],
            vec![edge("a", "1", "2"), edge("b", "1", "9"), edge("c", "2", "5")],
            EdgePolicy::Strict,
            &["5".to_string()],
        );
        let ids: Vec<&str> = nodes[0]
            .edges
            .as_ref()
            .unwrap()
            .iter()
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(ids, vec!["a"]);
        assert_eq!(nodes[1].edges.as_ref().unwrap().len(), 2);
    }

    #[test]
    fn test_populate_none_leaves_nodes() {
        let nodes = populate_nodes_with_edges(
            vec![node("1")],
            vec![edge("a", "1", "1")],
            EdgePolicy::None,
            &[],
        );
        assert!(nodes[0].edges.is_none());
    }

    #[test]
    fn test_self_loop_attached_once() {
        let nodes = populate_nodes_with_edges(
            vec![node("1")],
            vec![edge("a", "1", "1")],
            EdgePolicy::All,
            &[],
        );
        assert_eq!(nodes[0].edges.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_check_missing_reports_smallest() {
        let wanted = vec!["7".to_string(), "3".to_string(), "5".to_string()];
        let err = check_missing("node", &wanted, ["5"]).unwrap_err();
        assert_eq!(err.key(), ErrorKey::NodeNotFound);
        assert_eq!(err.message(), "Node #3 was not found.");

        let err = check_missing("edge", &["e1".to_string()], []).unwrap_err();
        assert_eq!(err.message(), "Edge #e1 was not found.");
        assert!(check_missing("node", &wanted, ["3", "5", "7"]).is_ok());
    }

    #[test]
    fn test_normalize_properties() {
        let normalized = normalize_properties(
            props(json!({"name": "Ada", "age": 36, "gone": null, "tags": ["a", "b"]})),
            true,
        )
        .unwrap();
        assert_eq!(normalized["name"], "Ada");
        assert!(!normalized.contains_key("gone"));
        assert_eq!(normalized["tags"], "[\"a\",\"b\"]");

        let kept = normalize_properties(props(json!({"tags": ["a"]})), false).unwrap();
        assert_eq!(kept["tags"], json!(["a"]));
    }

    #[test]
    fn test_normalize_rejects_objects_and_empty_keys() {
        let err = normalize_properties(props(json!({"nested": {"a": 1}})), false).unwrap_err();
        assert_eq!(err.key(), ErrorKey::InvalidParameter);
        assert!(normalize_properties(props(json!({"": 1})), false).is_err());
    }

    #[test]
    fn test_order_path() {
        let path = order_path(
            "1",
            vec![node("3"), node("1"), node("2")],
            vec![edge("b", "3", "2"), edge("a", "1", "2")],
        )
        .unwrap();
        let ids: Vec<&str> = path.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert_eq!(path[0].edges.as_ref().unwrap()[0].id, "a");
        assert_eq!(path[1].edges.as_ref().unwrap()[0].id, "b");
        assert!(path[2].edges.as_ref().unwrap().is_empty());

        let err = order_path("1", vec![node("1"), node("9")], vec![]).unwrap_err();
        assert_eq!(err.key(), ErrorKey::UnexpectedResponse);
    }

    #[test]
    fn test_property_as_id() {
        let data = props(json!({"code": "FR", "n": 12, "o": {}}));
        assert_eq!(property_as_id(&data, "code").as_deref(), Some("FR"));
        assert_eq!(property_as_id(&data, "n").as_deref(), Some("12"));
        assert_eq!(property_as_id(&data, "o"), None);
    }
}
