use std::fmt::{Display, Formatter};

use asdf_error::{AsdfError, asdf_err};
use itertools::Itertools;

/// One step from a node to one of its children.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathItem {
    /// A map key.
    Key(String),
    /// A sequence index.
    Index(usize),
}

/// The location of a node inside the tree, from the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct InstancePath(Vec<PathItem>);

impl InstancePath {
    /// The path of the root.
    pub fn root() -> Self {
        Self::default()
    }

    /// Whether this is the root.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// The steps from the root.
    pub fn items(&self) -> &[PathItem] {
        &self.0
    }

    /// The path of the child at `key`.
    pub fn key(&self, key: impl Into<String>) -> Self {
        let mut items = self.0.clone();
        items.push(PathItem::Key(key.into()));
        Self(items)
    }

    /// The path of the child at `index`.
    pub fn index(&self, index: usize) -> Self {
        let mut items = self.0.clone();
        items.push(PathItem::Index(index));
        Self(items)
    }
}

impl Display for InstancePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return f.write_str("<root>");
        }
        write!(
            f,
            "{}",
            self.0.iter().format_with("", |item, f| match item {
                PathItem::Key(k) => f(&format_args!("/{k}")),
                PathItem::Index(i) => f(&format_args!("/{i}")),
            })
        )
    }
}

/// A node failing a schema constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Where the offending node is.
    pub path: InstancePath,
    /// The schema keyword that failed.
    pub keyword: String,
    /// What the schema asked for.
    pub expected: String,
    /// What the node holds.
    pub actual: String,
    /// A human readable description.
    pub message: String,
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl From<ValidationError> for AsdfError {
    fn from(value: ValidationError) -> Self {
        asdf_err!(Validation: "{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_render_as_pointers() {
        assert_eq!(InstancePath::root().to_string(), "<root>");
        assert_eq!(
            InstancePath::root().key("a").index(3).key("b").to_string(),
            "/a/3/b"
        );
    }
}
