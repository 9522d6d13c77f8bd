use std::any::{Any, TypeId};
use std::fmt::Debug;
use std::sync::Arc;

use asdf_buffer::NDArray;
use asdf_tree::Tag;
use indexmap::IndexMap;

/// A native object that a [`Converter`](crate::Converter) can write to and read from a tree.
pub trait NativeObject: Any + Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    /// The object's own notion of equality. Types without one compare by identity.
    fn equals(&self, other: &dyn NativeObject) -> bool;
}

pub type ObjectRef = Arc<dyn NativeObject>;

impl dyn NativeObject {
    /// The concrete type behind the trait object.
    pub fn native_type_id(&self) -> TypeId {
        self.as_any().type_id()
    }

    pub fn downcast_ref<T: NativeObject>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// Implement [`NativeObject`] for a type using its [`PartialEq`].
#[macro_export]
macro_rules! native_object {
    ($T:ty) => {
        impl $crate::NativeObject for $T {
            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn into_any(
                self: ::std::sync::Arc<Self>,
            ) -> ::std::sync::Arc<dyn ::std::any::Any + Send + Sync> {
                self
            }

            fn equals(&self, other: &dyn $crate::NativeObject) -> bool {
                other
                    .as_any()
                    .downcast_ref::<Self>()
                    .is_some_and(|other| self == other)
            }
        }
    };
}

native_object!(NDArray);

/// A native object graph: plain data with converted objects at the leaves.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Seq(Vec<Value>),
    Map(IndexMap<String, Value>),
    /// An object produced or consumed by a registered converter.
    Object(ObjectRef),
    /// A tagged node no converter knows, kept in its plain form so it can be written back.
    Tagged(Tag, Box<Value>),
}

impl Value {
    pub fn object(object: impl NativeObject) -> Self {
        Self::Object(Arc::new(object))
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    /// The converted object of type `T`, if this value holds one.
    pub fn downcast_ref<T: NativeObject>(&self) -> Option<&T> {
        self.as_object().and_then(|object| object.downcast_ref::<T>())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Map(map) => map.get(key),
            Self::Tagged(_, inner) => inner.get(key),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            #[allow(clippy::cast_precision_loss)]
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    /// Structural equality. Objects compare with [`NativeObject::equals`].
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::Seq(a), Self::Seq(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a.equals(b.as_ref()),
            (Self::Tagged(ta, a), Self::Tagged(tb, b)) => ta == tb && a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Self::Seq(value)
    }
}

impl From<ObjectRef> for Value {
    fn from(value: ObjectRef) -> Self {
        Self::Object(value)
    }
}

impl From<NDArray> for Value {
    fn from(value: NDArray) -> Self {
        Self::object(value)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Value {
    fn from_iter<T: IntoIterator<Item = (K, Value)>>(iter: T) -> Self {
        Self::Map(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn objects_compare_natively() {
        let a = NDArray::from_vec(vec![1i32, 2, 3], vec![3]).unwrap();
        let b = NDArray::from_vec(vec![1i32, 2, 3], vec![3]).unwrap();
        let c = NDArray::from_vec(vec![1i32, 2], vec![2]).unwrap();

        assert_eq!(Value::from(a.clone()), Value::from(b));
        assert_ne!(Value::from(a.clone()), Value::from(c));
        assert_ne!(Value::from(a), Value::Seq(vec![1.into(), 2.into(), 3.into()]));
    }

    #[test]
    fn downcast() {
        let value: Value = [("data", Value::from(NDArray::from_vec(vec![1u8], vec![1]).unwrap()))]
            .into_iter()
            .collect();
        let array = value.get("data").unwrap().downcast_ref::<NDArray>().unwrap();
        assert_eq!(array.shape(), &[1]);
        assert!(value.downcast_ref::<NDArray>().is_none());
    }
}
