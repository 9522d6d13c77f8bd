use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

/// Prefix of the tags YAML assigns to its core types.
pub const YAML_TAG_PREFIX: &str = "tag:yaml.org,2002:";

/// A URI-like identifier naming the semantic type of a node.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(Arc<str>);

impl Tag {
    /// Wrap a tag string.
    pub fn new(tag: impl Into<Arc<str>>) -> Self {
        Self(tag.into())
    }

    /// The tag YAML gives its core type `name`, e.g. `map` or `str`.
    pub fn yaml(name: &str) -> Self {
        Self(format!("{YAML_TAG_PREFIX}{name}").into())
    }

    /// The tag string.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is one of the YAML core tags.
    pub fn is_yaml_core(&self) -> bool {
        self.0.starts_with(YAML_TAG_PREFIX)
    }

    /// Whether the tag matches `pattern`. See [`tag_matches`].
    pub fn matches(&self, pattern: &str) -> bool {
        tag_matches(&self.0, pattern)
    }

    /// The tag with its trailing `-<version>` removed, and the version if there was one.
    ///
    /// `tag:stsci.edu:asdf/core/ndarray-1.0.0` splits into `tag:stsci.edu:asdf/core/ndarray`
    /// and `1.0.0`.
    pub fn split_version(&self) -> (&str, Option<&str>) {
        let start = self.0.rfind('/').map_or(0, |i| i + 1);
        match self.0[start..].rfind('-') {
            Some(dash) => (&self.0[..start + dash], Some(&self.0[start + dash + 1..])),
            None => (&self.0, None),
        }
    }

    /// The last path segment without its version, e.g. `ndarray`.
    pub fn short_name(&self) -> &str {
        let (base, _) = self.split_version();
        base.rsplit(['/', ':']).next().unwrap_or(base)
    }
}

/// Match a tag against a pattern. A pattern ending in `*` matches every tag starting with the
/// rest of the pattern; any other pattern must match exactly.
pub fn tag_matches(tag: &str, pattern: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => tag.starts_with(prefix),
        None => tag == pattern,
    }
}

impl Display for Tag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Debug for Tag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "!<{}>", self.0)
    }
}

impl AsRef<str> for Tag {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Tag {
    fn from(value: &str) -> Self {
        Self(value.into())
    }
}

impl From<String> for Tag {
    fn from(value: String) -> Self {
        Self(value.into())
    }
}

impl PartialEq<str> for Tag {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for Tag {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}
