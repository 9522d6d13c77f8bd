//! ASDF documents with every bundled type.
//!
//! This crate re-exports the workspace crates and wires the bundled extensions into one
//! [`Registry`] and one [`ValidationContext`](schema::ValidationContext), so documents using any
//! bundled tag can be read and written without further setup:
//!
//! ```no_run
//! # fn main() -> asdf::error::AsdfResult<()> {
//! let file = asdf::open_options().open_path("model.asdf")?;
//! println!("{} blocks", file.blocks().len());
//! # Ok(())
//! # }
//! ```

use std::sync::LazyLock;

pub use asdf_types::*;
#[cfg(feature = "files")]
pub use asdf_file as file;
#[cfg(feature = "transform")]
pub use asdf_transform as transform;
pub use {
    asdf_block as block, asdf_buffer as buffer, asdf_error as error, asdf_schema as schema,
    asdf_tree as tree,
};

use crate::error::AsdfExpect;
use crate::schema::ValidationContext;

/// The core converters and those of every enabled extension.
pub static REGISTRY: LazyLock<RegistryRef> = LazyLock::new(|| {
    let builder = RegistryBuilder::core();
    #[cfg(feature = "transform")]
    let builder = builder.with_converters(transform::converters());
    builder
        .build()
        .asdf_expect("bundled converters never overlap")
});

/// A validation context knowing the schemas of the core types and of every enabled extension.
pub fn validation_context() -> ValidationContext {
    let context = ValidationContext::default();
    #[cfg(feature = "transform")]
    let context = context.with_embedded_schemas(transform::TRANSFORM_SCHEMAS);
    context
}

/// Open options reading every bundled type.
#[cfg(feature = "files")]
pub fn open_options() -> file::AsdfOpenOptions {
    file::AsdfOpenOptions::default()
        .with_registry(RegistryRef::clone(&REGISTRY))
        .with_validation_context(validation_context())
}

/// A new document holding `tree`, writing every bundled type.
#[cfg(feature = "files")]
pub fn new_document(tree: Value) -> file::AsdfFile {
    file::AsdfFile::new(tree)
        .with_registry(RegistryRef::clone(&REGISTRY))
        .with_validation_context(validation_context())
}

#[cfg(all(test, feature = "files", feature = "transform"))]
mod tests {
    use std::sync::Arc;

    use crate::buffer::NDArray;
    use crate::file::AsdfWriteOptions;
    use crate::transform::{Mapping, Scale, Shift, TransformRef, concatenate};
    use crate::*;

    #[test]
    fn bundled_types_round_trip() {
        let model: TransformRef = concatenate(
            Arc::new(Shift::new(1.0).with_name("x")),
            Arc::new(Scale::new(0.5)),
        )
        .unwrap();
        let mapping = Mapping::new(vec![1, 0]);
        let data = NDArray::from_vec(vec![1i32, 2, 3, 4], vec![2, 2]).unwrap();
        let tree: Value = [
            ("model", Value::Object(model.clone())),
            ("swap", Value::object(mapping.clone())),
            ("data", Value::from(data.clone())),
        ]
        .into_iter()
        .collect();

        let mut file = new_document(tree);
        let bytes = AsdfWriteOptions::default().write(&mut file, Vec::new()).unwrap();
        let back = open_options().open_bytes(bytes).unwrap();

        let read = back.get("model").and_then(Value::as_object).unwrap();
        REGISTRY.assert_equal(model.as_ref(), read.as_ref()).unwrap();
        assert_eq!(
            back.get("swap").and_then(Value::downcast_ref::<Mapping>),
            Some(&mapping)
        );
        let read = back.get("data").and_then(Value::downcast_ref::<NDArray>).unwrap();
        assert!(read.array_eq(&data).unwrap());
    }

    #[test]
    fn every_bundled_schema_loads() {
        let context = validation_context();
        for (url, _) in transform::TRANSFORM_SCHEMAS {
            assert!(context.load_schema(url).is_ok(), "{url}");
        }
    }
}
