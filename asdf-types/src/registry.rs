use std::any::TypeId;
use std::sync::Arc;

use asdf_block::BlockManager;
use asdf_error::{AsdfResult, asdf_bail, asdf_err};
use asdf_tree::Node;
use itertools::Itertools;
use rustc_hash::FxHashMap;

use crate::ndarray::NDArrayConverter;
use crate::{ConversionContext, ConverterRef, NativeObject, Value};

/// Collects converters and checks that they do not overlap.
#[derive(Debug, Default, Clone)]
pub struct RegistryBuilder {
    converters: Vec<ConverterRef>,
}

impl RegistryBuilder {
    /// A builder holding the converters for the core types.
    pub fn core() -> Self {
        Self::default().with_converter(Arc::new(NDArrayConverter))
    }

    pub fn with_converter(mut self, converter: ConverterRef) -> Self {
        self.converters.push(converter);
        self
    }

    pub fn with_converters<C: IntoIterator<Item = ConverterRef>>(mut self, converters: C) -> Self {
        self.converters.extend(converters);
        self
    }

    /// Freeze the registry.
    ///
    /// Two converters claiming the same native type, or the same tag pattern, make lookups
    /// ambiguous and are rejected here rather than at conversion time.
    pub fn build(self) -> AsdfResult<RegistryRef> {
        let mut by_type = FxHashMap::default();
        let mut exact = FxHashMap::default();
        let mut prefixes = Vec::new();

        for (index, converter) in self.converters.iter().enumerate() {
            for native in converter.native_types() {
                if let Some(previous) = by_type.insert(native.id(), index) {
                    asdf_bail!(
                        "native type {} is claimed by both {:?} and {:?}",
                        native,
                        self.converters[previous],
                        converter
                    );
                }
            }
            for pattern in converter.tags() {
                let duplicate = match pattern.strip_suffix('*') {
                    Some(prefix) => {
                        let duplicate = prefixes.iter().any(|(p, _)| p == prefix);
                        prefixes.push((prefix.to_string(), index));
                        duplicate
                    }
                    None => exact.insert(pattern.to_string(), index).is_some(),
                };
                if duplicate {
                    asdf_bail!("tag pattern {} is registered twice", pattern);
                }
            }
        }
        // Longest prefix first, so the most specific wildcard wins.
        prefixes.sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()));

        log::debug!(
            "built converter registry: {} converters, {} tags, {} wildcard tags",
            self.converters.len(),
            exact.len(),
            prefixes.len()
        );
        Ok(Arc::new(Registry {
            converters: self.converters,
            by_type,
            exact,
            prefixes,
        }))
    }
}

/// An immutable table of converters, looked up by tag on read and by native type on write.
#[derive(Debug)]
pub struct Registry {
    converters: Vec<ConverterRef>,
    by_type: FxHashMap<TypeId, usize>,
    exact: FxHashMap<String, usize>,
    prefixes: Vec<(String, usize)>,
}

pub type RegistryRef = Arc<Registry>;

impl Registry {
    /// A registry holding only the core converters.
    pub fn core() -> AsdfResult<RegistryRef> {
        RegistryBuilder::core().build()
    }

    pub fn converters(&self) -> impl Iterator<Item = &ConverterRef> + '_ {
        self.converters.iter()
    }

    /// The converter reading `tag`: an exact pattern first, then the longest matching wildcard.
    pub fn converter_for_tag(&self, tag: &str) -> Option<&ConverterRef> {
        self.exact
            .get(tag)
            .or_else(|| {
                self.prefixes
                    .iter()
                    .find(|(prefix, _)| tag.starts_with(prefix.as_str()))
                    .map(|(_, index)| index)
            })
            .map(|index| &self.converters[*index])
    }

    /// The converter writing objects of `object`'s type.
    pub fn converter_for_object(&self, object: &dyn NativeObject) -> AsdfResult<&ConverterRef> {
        self.by_type
            .get(&object.native_type_id())
            .map(|index| &self.converters[*index])
            .ok_or_else(|| asdf_err!(Conversion: "no converter registered for {:?}", object))
    }

    /// Convert a native object graph to a tree, allocating blocks in `blocks`.
    pub fn to_tree(&self, value: &Value, blocks: &mut BlockManager) -> AsdfResult<Node> {
        ConversionContext::new(self, blocks).to_tree(value)
    }

    /// Convert a tree to a native object graph, reading array data from `blocks`.
    pub fn from_tree(&self, node: &Node, blocks: &mut BlockManager) -> AsdfResult<Value> {
        ConversionContext::new(self, blocks).from_tree(node)
    }

    /// Fail if two native objects differ, using the converter's own comparison.
    pub fn assert_equal(&self, a: &dyn NativeObject, b: &dyn NativeObject) -> AsdfResult<()> {
        if a.native_type_id() != b.native_type_id() {
            asdf_bail!("{:?} and {:?} are of different types", a, b);
        }
        self.converter_for_object(a)?.assert_equal(a, b, self)
    }

    /// Fail if two native object graphs differ, comparing objects with [`Self::assert_equal`].
    pub fn assert_values_equal(&self, a: &Value, b: &Value) -> AsdfResult<()> {
        match (a, b) {
            (Value::Object(x), Value::Object(y)) => self.assert_equal(x.as_ref(), y.as_ref()),
            (Value::Seq(xs), Value::Seq(ys)) if xs.len() == ys.len() => xs
                .iter()
                .zip(ys)
                .try_for_each(|(x, y)| self.assert_values_equal(x, y)),
            (Value::Map(xs), Value::Map(ys)) if xs.len() == ys.len() => {
                xs.iter().try_for_each(|(key, x)| match ys.get(key) {
                    Some(y) => self.assert_values_equal(x, y),
                    None => Err(asdf_err!("key {} missing on the right", key)),
                })
            }
            (Value::Tagged(tx, x), Value::Tagged(ty, y)) if tx == ty => {
                self.assert_values_equal(x, y)
            }
            (x, y) if x == y => Ok(()),
            (x, y) => Err(asdf_err!("{:?} does not equal {:?}", x, y)),
        }
    }

    /// Every tag pattern known to the registry.
    pub fn tag_patterns(&self) -> Vec<String> {
        self.exact
            .keys()
            .cloned()
            .chain(self.prefixes.iter().map(|(prefix, _)| format!("{prefix}*")))
            .sorted()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use asdf_buffer::NDArray;
    use asdf_tree::{TaggedMap, TaggedSeq, tag_object};

    use super::*;
    use crate::converter::NativeType;
    use crate::{Converter, ObjectRef};

    #[derive(Debug, PartialEq)]
    struct Unit(String);

    crate::native_object!(Unit);

    #[derive(Debug)]
    struct UnitConverter(&'static [&'static str]);

    impl Converter for UnitConverter {
        fn tags(&self) -> &[&'static str] {
            self.0
        }

        fn native_types(&self) -> Vec<NativeType> {
            vec![NativeType::of::<Unit>()]
        }

        fn to_tree(
            &self,
            object: &dyn NativeObject,
            _ctx: &mut ConversionContext<'_>,
        ) -> AsdfResult<Node> {
            let unit = object
                .downcast_ref::<Unit>()
                .ok_or_else(|| asdf_err!(Conversion: "not a unit"))?;
            tag_object(self.0[0].replace('*', "1.0.0"), Node::from(unit.0.as_str()))
        }

        fn from_tree(&self, node: &Node, _ctx: &mut ConversionContext<'_>) -> AsdfResult<ObjectRef> {
            let name = node
                .as_str()
                .ok_or_else(|| asdf_err!(Conversion: "unit must be a string"))?;
            Ok(Arc::new(Unit(name)))
        }
    }

    fn registry() -> RegistryRef {
        RegistryBuilder::core()
            .with_converter(Arc::new(UnitConverter(&["tag:example.org:unit-*"])))
            .build()
            .unwrap()
    }

    #[test]
    fn duplicate_native_type_is_fatal() {
        let err = RegistryBuilder::default()
            .with_converter(Arc::new(UnitConverter(&["tag:example.org:unit-*"])))
            .with_converter(Arc::new(UnitConverter(&["tag:example.org:other-*"])))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Unit"));
    }

    #[test]
    fn wildcard_and_exact_lookup() {
        let registry = registry();
        assert!(
            registry
                .converter_for_tag("tag:stsci.edu:asdf/core/ndarray-1.0.0")
                .is_some()
        );
        assert!(registry.converter_for_tag("tag:example.org:unit-2.1.0").is_some());
        assert!(registry.converter_for_tag("tag:example.org:units-1.0.0").is_none());
        assert_eq!(registry.tag_patterns().len(), 2);
    }

    #[test]
    fn objects_round_trip_through_their_converter() {
        let registry = registry();
        let value: Value = [
            ("unit", Value::object(Unit("m".into()))),
            ("count", Value::Int(3)),
        ]
        .into_iter()
        .collect();

        let mut blocks = BlockManager::default();
        let node = registry.to_tree(&value, &mut blocks).unwrap();
        let unit = node.as_map().unwrap().get("unit").unwrap();
        assert_eq!(unit.tag().unwrap(), "tag:example.org:unit-1.0.0");

        let back = registry.from_tree(&node, &mut blocks).unwrap();
        registry.assert_values_equal(&value, &back).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn unknown_tags_degrade_to_plain_values() {
        env_logger::builder().is_test(true).try_init().ok();
        let registry = registry();
        let node = tag_object(
            "tag:example.org:future/thing-9.0.0",
            TaggedMap::new()
                .with("unit", tag_object("tag:example.org:unit-1.0.0", Node::from("s")).unwrap())
                .with("n", 1i64),
        )
        .unwrap();

        let mut blocks = BlockManager::default();
        let value = registry.from_tree(&node, &mut blocks).unwrap();
        let Value::Tagged(tag, inner) = &value else {
            panic!("expected a tagged value, got {value:?}");
        };
        assert_eq!(tag.as_str(), "tag:example.org:future/thing-9.0.0");
        assert!(inner.get("unit").unwrap().downcast_ref::<Unit>().is_some());

        let written = registry.to_tree(&value, &mut blocks).unwrap();
        assert_eq!(written, node);
    }

    #[test]
    fn unregistered_object_is_an_error() {
        #[derive(Debug, PartialEq)]
        struct Stranger;
        crate::native_object!(Stranger);

        let mut blocks = BlockManager::default();
        let err = registry()
            .to_tree(&Value::object(Stranger), &mut blocks)
            .unwrap_err();
        assert!(matches!(err, asdf_error::AsdfError::Conversion(..)));
    }

    #[test]
    fn cyclic_tree_is_a_conversion_error() {
        let seq = TaggedSeq::new();
        seq.push(Node::from(seq.clone()));

        let mut blocks = BlockManager::default();
        let err = registry().from_tree(&seq.into(), &mut blocks).unwrap_err();
        assert!(matches!(err, asdf_error::AsdfError::Conversion(..)));
    }

    #[test]
    fn values_differing_in_objects() {
        let registry = registry();
        let a = Value::from(NDArray::from_vec(vec![1.0f64, 2.0], vec![2]).unwrap());
        let b = Value::from(NDArray::from_vec(vec![1.0f64, 2.5], vec![2]).unwrap());
        assert!(registry.assert_values_equal(&a, &a.clone()).is_ok());
        assert!(registry.assert_values_equal(&a, &b).is_err());
    }
}
