use std::fmt::Debug;
use std::str::FromStr;

use asdf_error::{AsdfResult, asdf_bail, asdf_err};
use asdf_tree::{FlowStyle, Node, Scalar, ScalarStyle, TaggedMap, TaggedSeq};
use rustc_hash::FxHashSet;
use serde_json::{Map, Number, Value};

/// Turns a tagged tree into the text region of a document and back.
///
/// An implementation must keep tags and the writing hints of every node across a round trip.
pub trait TreeFormat: Debug + Send + Sync {
    fn emit(&self, tree: &Node) -> AsdfResult<Vec<u8>>;

    fn parse(&self, text: &[u8]) -> AsdfResult<Node>;
}

const TAG: &str = "!tag";
const VALUE: &str = "!value";
const FLOW: &str = "!flow";
const STYLE: &str = "!style";
const ORDER: &str = "!order";
const BYTES: &str = "!bytes";
const FLOAT: &str = "!float";

/// A JSON rendering of the tree.
///
/// Plain data is plain JSON. A node with a tag or hints becomes a wrapper object whose keys all
/// start with `!`: `{"!tag": "...", "!flow": "flow", "!value": ...}`. Byte strings are written
/// as `{"!bytes": "<hex>"}` and non-finite floats as `{"!float": "nan"}`. A plain map with a key
/// starting with `!` is always wrapped, so wrappers and data never collide.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonTreeFormat {
    compact: bool,
}

impl JsonTreeFormat {
    /// Write the whole tree on one line.
    pub fn compact() -> Self {
        Self { compact: true }
    }
}

impl TreeFormat for JsonTreeFormat {
    fn emit(&self, tree: &Node) -> AsdfResult<Vec<u8>> {
        let value = encode(tree, &mut FxHashSet::default())?;
        Ok(if self.compact {
            serde_json::to_vec(&value)?
        } else {
            serde_json::to_vec_pretty(&value)?
        })
    }

    fn parse(&self, text: &[u8]) -> AsdfResult<Node> {
        decode(&serde_json::from_slice(text)?)
    }
}

fn encode(node: &Node, ancestors: &mut FxHashSet<usize>) -> AsdfResult<Value> {
    let mut hints = Map::new();
    let mut wrap = false;
    if let Some(tag) = node.tag() {
        hints.insert(TAG.into(), tag.as_str().into());
    }

    let value = match node {
        Node::Scalar(scalar) => {
            if let Some(style) = scalar.style() {
                hints.insert(STYLE.into(), style.name().into());
            }
            encode_scalar(scalar.value())
        }
        Node::Seq(seq) => {
            if let Some(flow) = seq.flow_style() {
                hints.insert(FLOW.into(), flow.name().into());
            }
            enter(node, ancestors)?;
            let items = seq
                .items()
                .iter()
                .map(|item| encode(item, ancestors))
                .collect::<AsdfResult<_>>()?;
            ancestors.remove(&node.id());
            Value::Array(items)
        }
        Node::Map(map) => {
            if let Some(flow) = map.flow_style() {
                hints.insert(FLOW.into(), flow.name().into());
            }
            if let Some(order) = map.property_order() {
                hints.insert(ORDER.into(), order.into());
            }
            enter(node, ancestors)?;
            let entries: Map<String, Value> = map
                .ordered_entries()
                .into_iter()
                .map(|(key, value)| Ok((key, encode(&value, ancestors)?)))
                .collect::<AsdfResult<_>>()?;
            ancestors.remove(&node.id());
            // A map that looks like a wrapper must be wrapped itself.
            wrap = entries.keys().any(|key| key.starts_with('!'));
            Value::Object(entries)
        }
    };

    if hints.is_empty() && !wrap {
        return Ok(value);
    }
    hints.insert(VALUE.into(), value);
    Ok(Value::Object(hints))
}

fn enter(node: &Node, ancestors: &mut FxHashSet<usize>) -> AsdfResult<()> {
    if !ancestors.insert(node.id()) {
        asdf_bail!(
            Conversion: "cannot write a cyclic tree, {} contains itself",
            node.effective_tag()
        );
    }
    Ok(())
}

fn encode_scalar(scalar: Scalar) -> Value {
    match scalar {
        Scalar::Null => Value::Null,
        Scalar::Bool(b) => Value::Bool(b),
        Scalar::Int(i) => Value::from(i),
        Scalar::Float(f) => Number::from_f64(f).map_or_else(
            || {
                let name = if f.is_nan() {
                    "nan"
                } else if f > 0.0 {
                    "inf"
                } else {
                    "-inf"
                };
                single(FLOAT, name.into())
            },
            Value::Number,
        ),
        Scalar::Str(s) => Value::String(s),
        Scalar::Bytes(b) => single(BYTES, hex::encode(b).into()),
    }
}

fn single(key: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(key.into(), value);
    Value::Object(map)
}

fn decode(value: &Value) -> AsdfResult<Node> {
    match value {
        Value::Object(entries) if is_wrapper(entries) => decode_wrapper(entries),
        other => decode_plain(other),
    }
}

fn is_wrapper(entries: &Map<String, Value>) -> bool {
    !entries.is_empty() && entries.keys().all(|key| key.starts_with('!'))
}

fn decode_wrapper(entries: &Map<String, Value>) -> AsdfResult<Node> {
    if let Some(hex) = entries.get(BYTES) {
        let bytes = hex
            .as_str()
            .ok_or_else(|| asdf_err!("'{BYTES}' must hold a hex string"))
            .and_then(|hex| {
                hex::decode(hex).map_err(|e| asdf_err!("invalid '{BYTES}' payload: {e}"))
            })?;
        return Ok(Node::from(Scalar::Bytes(bytes)));
    }
    if let Some(name) = entries.get(FLOAT) {
        let value = match name.as_str() {
            Some("nan") => f64::NAN,
            Some("inf") => f64::INFINITY,
            Some("-inf") => f64::NEG_INFINITY,
            _ => asdf_bail!("'{FLOAT}' must be one of nan, inf or -inf"),
        };
        return Ok(Node::from(value));
    }

    let inner = entries
        .get(VALUE)
        .ok_or_else(|| asdf_err!("tree wrapper without '{VALUE}'"))?;
    // The wrapped value is data, even if it looks like a wrapper itself.
    let node = decode_plain(inner)?;
    if let Some(tag) = entries.get(TAG) {
        let tag = tag
            .as_str()
            .ok_or_else(|| asdf_err!("'{TAG}' must be a string"))?;
        node.set_tag(Some(tag.into()));
    }

    match &node {
        Node::Map(map) => {
            map.set_flow_style(hint::<FlowStyle>(entries, FLOW)?);
            if let Some(order) = entries.get(ORDER) {
                let order = order
                    .as_array()
                    .and_then(|keys| {
                        keys.iter()
                            .map(|key| key.as_str().map(str::to_string))
                            .collect::<Option<Vec<_>>>()
                    })
                    .ok_or_else(|| asdf_err!("'{ORDER}' must be a list of keys"))?;
                map.set_property_order(Some(order));
            }
        }
        Node::Seq(seq) => seq.set_flow_style(hint::<FlowStyle>(entries, FLOW)?),
        Node::Scalar(scalar) => scalar.set_style(hint::<ScalarStyle>(entries, STYLE)?),
    }
    Ok(node)
}

fn hint<T: FromStr<Err = asdf_error::AsdfError>>(
    entries: &Map<String, Value>,
    key: &str,
) -> AsdfResult<Option<T>> {
    entries
        .get(key)
        .map(|value| {
            value
                .as_str()
                .ok_or_else(|| asdf_err!("'{key}' must be a string"))
                .and_then(T::from_str)
        })
        .transpose()
}

fn decode_plain(value: &Value) -> AsdfResult<Node> {
    Ok(match value {
        Value::Array(items) => items
            .iter()
            .map(decode)
            .collect::<AsdfResult<TaggedSeq>>()?
            .into(),
        Value::Object(entries) => entries
            .iter()
            .map(|(key, value)| Ok((key.clone(), decode(value)?)))
            .collect::<AsdfResult<TaggedMap>>()?
            .into(),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Node::from(i),
            None => Node::from(
                n.as_f64()
                    .ok_or_else(|| asdf_err!("{n} is out of range for a tree number"))?,
            ),
        },
        scalar => Node::from_json(scalar),
    })
}
