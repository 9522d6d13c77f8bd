use std::any::{TypeId, type_name};
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

use asdf_error::{AsdfResult, asdf_bail};
use asdf_tree::Node;

use crate::{ConversionContext, NativeObject, ObjectRef, Registry};

/// A Rust type a converter writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeType {
    id: TypeId,
    name: &'static str,
}

impl NativeType {
    pub fn of<T: NativeObject>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Display for NativeType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

/// Translates between tagged nodes and native objects of one family.
pub trait Converter: Debug + Send + Sync {
    /// Tag patterns read by this converter. A pattern ending in `*` matches by prefix.
    fn tags(&self) -> &[&'static str];

    /// Native types written by this converter.
    fn native_types(&self) -> Vec<NativeType>;

    /// Convert `object` to a node. The returned node carries the tag it is to be read back with.
    fn to_tree(&self, object: &dyn NativeObject, ctx: &mut ConversionContext<'_>)
    -> AsdfResult<Node>;

    /// Reconstruct the object a node describes.
    fn from_tree(&self, node: &Node, ctx: &mut ConversionContext<'_>) -> AsdfResult<ObjectRef>;

    /// Fail if `a` and `b` differ. Used by round-trip test harnesses.
    fn assert_equal(
        &self,
        a: &dyn NativeObject,
        b: &dyn NativeObject,
        _registry: &Registry,
    ) -> AsdfResult<()> {
        if !a.equals(b) {
            asdf_bail!("{:?} does not equal {:?}", a, b);
        }
        Ok(())
    }
}

pub type ConverterRef = Arc<dyn Converter>;
