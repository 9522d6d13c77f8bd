use std::sync::Arc;

use asdf_error::AsdfResult;
use serde_json::Value;

use crate::{
    EmbeddedSchemaLoader, FileSchemaLoader, LoaderChain, SchemaLoader, UrlMapping, load_schema,
};

/// Prefix of the tags defined by the ASDF standard.
pub const ASDF_TAG_PREFIX: &str = "tag:stsci.edu:asdf/";
/// Where the schemas for [`ASDF_TAG_PREFIX`] tags live.
pub const ASDF_SCHEMA_PREFIX: &str = "http://stsci.edu/schemas/asdf/";

/// Maps tags to the URL of the schema describing them.
#[derive(Debug, Clone)]
pub struct TagResolver(Vec<(String, String)>);

impl Default for TagResolver {
    fn default() -> Self {
        Self(vec![(ASDF_TAG_PREFIX.into(), ASDF_SCHEMA_PREFIX.into())])
    }
}

impl TagResolver {
    /// A resolver that maps nothing.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Resolve tags starting with `tag_prefix` to URLs starting with `url_prefix`.
    pub fn with_prefix(mut self, tag_prefix: impl Into<String>, url_prefix: impl Into<String>) -> Self {
        self.0.push((tag_prefix.into(), url_prefix.into()));
        self
    }

    /// The schema URL for `tag`, or `tag` itself when no prefix applies.
    pub fn resolve(&self, tag: &str) -> String {
        self.0
            .iter()
            .find_map(|(prefix, url)| {
                tag.strip_prefix(prefix.as_str())
                    .map(|rest| format!("{url}{rest}"))
            })
            .unwrap_or_else(|| tag.to_string())
    }
}

/// Everything validation needs from its surroundings: how to find the schema for a tag, and how
/// to fetch a schema document.
#[derive(Debug, Clone)]
pub struct ValidationContext {
    tag_resolver: TagResolver,
    url_mapping: UrlMapping,
    embedded: EmbeddedSchemaLoader,
    extra_loaders: LoaderChain,
}

impl Default for ValidationContext {
    fn default() -> Self {
        Self {
            tag_resolver: TagResolver::default(),
            url_mapping: UrlMapping::default(),
            embedded: EmbeddedSchemaLoader::core(),
            extra_loaders: LoaderChain::default().with(Arc::new(FileSchemaLoader)),
        }
    }
}

impl ValidationContext {
    /// Replace the tag resolver.
    pub fn with_tag_resolver(mut self, tag_resolver: TagResolver) -> Self {
        self.tag_resolver = tag_resolver;
        self
    }

    /// Replace the URL mapping.
    pub fn with_url_mapping(mut self, url_mapping: UrlMapping) -> Self {
        self.url_mapping = url_mapping;
        self
    }

    /// Serve an additional schema from memory.
    pub fn with_embedded_schema(mut self, url: impl Into<String>, text: &'static str) -> Self {
        self.embedded = self.embedded.with_schema(url, text);
        self
    }

    /// Serve additional schemas from memory.
    pub fn with_embedded_schemas(mut self, schemas: &[(&str, &'static str)]) -> Self {
        self.embedded = self.embedded.with_schemas(schemas);
        self
    }

    /// Consult `loader` for URLs the embedded schemas do not cover.
    pub fn with_loader(mut self, loader: Arc<dyn SchemaLoader>) -> Self {
        self.extra_loaders = self.extra_loaders.with(loader);
        self
    }

    /// The tag resolver.
    pub fn tag_resolver(&self) -> &TagResolver {
        &self.tag_resolver
    }

    /// The schema URL for `tag`, or `None` if the tag has no schema.
    pub fn schema_url_for_tag(&self, tag: &str) -> Option<String> {
        let url = self.tag_resolver.resolve(tag);
        (url != tag).then_some(url)
    }

    /// Load the schema document at `url`. The fragment, if any, is ignored.
    pub fn load_schema(&self, url: &str) -> AsdfResult<Arc<Value>> {
        load_schema(url, &self.url_mapping, self)
    }
}

impl SchemaLoader for ValidationContext {
    fn load(&self, url: &str) -> AsdfResult<Option<Vec<u8>>> {
        match self.embedded.load(url)? {
            Some(bytes) => Ok(Some(bytes)),
            None => self.extra_loaders.load(url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asdf_tags_resolve_to_schema_urls() {
        let ctx = ValidationContext::default();
        assert_eq!(
            ctx.schema_url_for_tag("tag:stsci.edu:asdf/core/ndarray-1.0.0")
                .unwrap(),
            "http://stsci.edu/schemas/asdf/core/ndarray-1.0.0"
        );
        assert!(ctx.schema_url_for_tag("tag:example.org:unknown-1.0.0").is_none());
    }

    #[test]
    fn custom_prefixes() {
        let resolver = TagResolver::empty().with_prefix("tag:example.org:", "http://example.org/s/");
        assert_eq!(
            resolver.resolve("tag:example.org:point-1.0.0"),
            "http://example.org/s/point-1.0.0"
        );
        assert_eq!(resolver.resolve("tag:stsci.edu:asdf/core/asdf-1.0.0"), "tag:stsci.edu:asdf/core/asdf-1.0.0");
    }
}
