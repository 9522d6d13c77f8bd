use asdf_error::{AsdfResult, asdf_bail, asdf_err};
use rustc_hash::FxHashSet;
use serde_json::{Number, Value};

use crate::{Node, Scalar, TaggedMap, TaggedSeq};

impl Node {
    /// Build an untagged tree from a JSON value.
    pub fn from_json(value: &Value) -> Node {
        match value {
            Value::Null => Node::null(),
            Value::Bool(b) => Node::from(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Node::from(i),
                None => Node::from(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Node::from(s.as_str()),
            Value::Array(items) => TaggedSeq::from_items(items.iter().map(Node::from_json).collect())
                .into(),
            Value::Object(entries) => entries
                .iter()
                .map(|(k, v)| (k.clone(), Node::from_json(v)))
                .collect::<TaggedMap>()
                .into(),
        }
    }

    /// The plain JSON form of the tree. Tags and hints are dropped, byte strings become arrays
    /// of integers.
    pub fn to_json(&self) -> AsdfResult<Value> {
        self.to_json_with(&mut FxHashSet::default())
    }

    fn to_json_with(&self, ancestors: &mut FxHashSet<usize>) -> AsdfResult<Value> {
        match self {
            Node::Scalar(s) => Ok(match s.value() {
                Scalar::Null => Value::Null,
                Scalar::Bool(b) => Value::Bool(b),
                Scalar::Int(i) => Value::from(i),
                Scalar::Float(f) => Number::from_f64(f)
                    .map(Value::Number)
                    .ok_or_else(|| asdf_err!(Conversion: "{} has no JSON representation", f))?,
                Scalar::Str(s) => Value::String(s),
                Scalar::Bytes(b) => Value::from(b),
            }),
            Node::Map(_) | Node::Seq(_) => {
                if !ancestors.insert(self.id()) {
                    asdf_bail!(Conversion: "cannot convert a cyclic tree to JSON");
                }
                let value = match self {
                    Node::Map(m) => Value::Object(
                        m.entries()
                            .into_iter()
                            .map(|(k, v)| Ok((k, v.to_json_with(ancestors)?)))
                            .collect::<AsdfResult<_>>()?,
                    ),
                    _ => Value::Array(
                        self.children()
                            .iter()
                            .map(|v| v.to_json_with(ancestors))
                            .collect::<AsdfResult<_>>()?,
                    ),
                };
                ancestors.remove(&self.id());
                Ok(value)
            }
        }
    }

    /// Whether the node holds the same data as a plain JSON value.
    ///
    /// Nodes carrying a tag outside the YAML core set are never equal to plain JSON. Integers
    /// and floats compare by numeric value.
    pub fn eq_json(&self, value: &Value) -> bool {
        if self.tag().is_some_and(|t| !t.is_yaml_core()) {
            return false;
        }
        match (self, value) {
            (Node::Map(m), Value::Object(entries)) => {
                m.len() == entries.len()
                    && entries
                        .iter()
                        .all(|(k, v)| m.get(k).is_some_and(|n| n.eq_json(v)))
            }
            (Node::Seq(s), Value::Array(items)) => {
                let nodes = s.items();
                nodes.len() == items.len() && nodes.iter().zip(items).all(|(n, v)| n.eq_json(v))
            }
            (Node::Scalar(s), _) => match (s.value(), value) {
                (Scalar::Null, Value::Null) => true,
                (Scalar::Bool(a), Value::Bool(b)) => a == *b,
                (Scalar::Int(a), Value::Number(b)) => {
                    b.as_i64() == Some(a) || self.as_f64() == b.as_f64()
                }
                (Scalar::Float(a), Value::Number(b)) => Some(a) == b.as_f64(),
                (Scalar::Str(a), Value::String(b)) => a == *b,
                _ => false,
            },
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn json_bridge_keeps_structure() {
        let value = json!({"b": [1, 2.5, "x"], "a": {"n": null, "t": true}});
        let node = Node::from_json(&value);
        assert_eq!(node.as_map().unwrap().keys(), vec!["b", "a"]);
        assert_eq!(node.to_json().unwrap(), value);
        assert!(node.eq_json(&value));
    }

    #[test]
    fn tagged_nodes_differ_from_plain_json() {
        let node = Node::from_json(&json!({"x": 1}));
        assert!(node.eq_json(&json!({"x": 1.0})));
        node.set_tag(Some("tag:example.org:point-1.0.0".into()));
        assert!(!node.eq_json(&json!({"x": 1})));
    }

    #[test]
    fn cyclic_trees_do_not_convert() {
        let map = TaggedMap::new();
        map.insert("me", map.clone());
        assert!(Node::from(map).to_json().is_err());
    }
}
