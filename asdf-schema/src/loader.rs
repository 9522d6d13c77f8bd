use std::borrow::Cow;
use std::fmt::Debug;
use std::sync::{Arc, LazyLock};

use asdf_error::{AsdfResult, asdf_err};
use dashmap::DashMap;
use rustc_hash::FxHashMap;
use serde_json::Value;
use url::Url;

/// URL of the meta-schema every ASDF schema is written against.
pub const YAML_SCHEMA_URL: &str = "http://stsci.edu/schemas/yaml-schema/draft-01";
/// URL of the JSON schema draft 4 meta-schema.
pub const JSON_SCHEMA_URL: &str = "http://json-schema.org/draft-04/schema";

/// Schemas shipped with the crate, keyed by URL.
pub static CORE_SCHEMAS: &[(&str, &str)] = &[
    (
        JSON_SCHEMA_URL,
        include_str!("../schemas/json-schema/draft-04.json"),
    ),
    (
        YAML_SCHEMA_URL,
        include_str!("../schemas/yaml-schema/draft-01.json"),
    ),
    (
        "http://stsci.edu/schemas/asdf/core/asdf-1.0.0",
        include_str!("../schemas/asdf/core/asdf-1.0.0.json"),
    ),
    (
        "http://stsci.edu/schemas/asdf/core/ndarray-1.0.0",
        include_str!("../schemas/asdf/core/ndarray-1.0.0.json"),
    ),
    (
        "http://stsci.edu/schemas/asdf/core/software-1.0.0",
        include_str!("../schemas/asdf/core/software-1.0.0.json"),
    ),
];

/// Parsed schema documents, keyed by the URL they were loaded from. Never invalidated.
static SCHEMA_CACHE: LazyLock<DashMap<String, Arc<Value>>> = LazyLock::new(DashMap::new);

/// Fetches the raw bytes of a schema document.
pub trait SchemaLoader: Debug + Send + Sync {
    /// Return the document at `url`, or `None` if this loader does not serve that URL.
    fn load(&self, url: &str) -> AsdfResult<Option<Vec<u8>>>;
}

/// Serves schemas compiled into the binary.
#[derive(Debug, Clone, Default)]
pub struct EmbeddedSchemaLoader {
    schemas: FxHashMap<String, Cow<'static, str>>,
}

impl EmbeddedSchemaLoader {
    /// A loader serving [`CORE_SCHEMAS`].
    pub fn core() -> Self {
        Self::default().with_schemas(CORE_SCHEMAS)
    }

    /// Serve `text` at `url`.
    pub fn with_schema(mut self, url: impl Into<String>, text: impl Into<Cow<'static, str>>) -> Self {
        self.schemas.insert(url.into(), text.into());
        self
    }

    /// Serve every `(url, text)` pair.
    pub fn with_schemas(mut self, schemas: &[(&str, &'static str)]) -> Self {
        for (url, text) in schemas {
            self.schemas.insert((*url).to_string(), Cow::Borrowed(*text));
        }
        self
    }
}

impl SchemaLoader for EmbeddedSchemaLoader {
    fn load(&self, url: &str) -> AsdfResult<Option<Vec<u8>>> {
        Ok(self.schemas.get(url).map(|text| text.as_bytes().to_vec()))
    }
}

/// Serves `file://` URLs from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSchemaLoader;

impl SchemaLoader for FileSchemaLoader {
    fn load(&self, url: &str) -> AsdfResult<Option<Vec<u8>>> {
        let Ok(parsed) = Url::parse(url) else {
            return Ok(None);
        };
        if parsed.scheme() != "file" {
            return Ok(None);
        }
        let path = parsed
            .to_file_path()
            .map_err(|()| asdf_err!(SchemaLoad: "'{}' is not a local path", url))?;

        // Schemas on disk are commonly stored with an extension the URL leaves out.
        let candidates = [path.clone(), path.with_extension("json")];
        for candidate in candidates {
            if candidate.is_file() {
                return std::fs::read(&candidate)
                    .map(Some)
                    .map_err(|e| asdf_err!(SchemaLoad: "reading {}: {}", candidate.display(), e));
            }
        }
        Ok(None)
    }
}

/// Tries each loader in turn until one serves the URL.
#[derive(Debug, Clone, Default)]
pub struct LoaderChain(Vec<Arc<dyn SchemaLoader>>);

impl LoaderChain {
    /// Append a loader, tried after the ones already present.
    pub fn with(mut self, loader: Arc<dyn SchemaLoader>) -> Self {
        self.0.push(loader);
        self
    }
}

impl SchemaLoader for LoaderChain {
    fn load(&self, url: &str) -> AsdfResult<Option<Vec<u8>>> {
        for loader in &self.0 {
            if let Some(bytes) = loader.load(url)? {
                return Ok(Some(bytes));
            }
        }
        Ok(None)
    }
}

/// Rewrites URL prefixes before loading, so a remote schema can be served from a mirror.
#[derive(Debug, Clone, Default)]
pub struct UrlMapping(Vec<(String, String)>);

impl UrlMapping {
    /// Rewrite URLs starting with `from` to start with `to` instead.
    pub fn with_prefix(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.0.push((from.into(), to.into()));
        self
    }

    /// Apply the first matching rewrite.
    pub fn map<'a>(&self, url: &'a str) -> Cow<'a, str> {
        self.0
            .iter()
            .find_map(|(from, to)| {
                url.strip_prefix(from.as_str())
                    .map(|rest| Cow::Owned(format!("{to}{rest}")))
            })
            .unwrap_or(Cow::Borrowed(url))
    }
}

/// Load and parse the schema at `url` through `loader`, consulting the process-wide cache first.
///
/// The cache is keyed by the URL after `mapping` is applied, so each distinct document is fetched
/// at most once per process.
pub fn load_schema(
    url: &str,
    mapping: &UrlMapping,
    loader: &dyn SchemaLoader,
) -> AsdfResult<Arc<Value>> {
    let (url, _) = url.split_once('#').unwrap_or((url, ""));
    let mapped = mapping.map(url);
    if let Some(schema) = SCHEMA_CACHE.get(mapped.as_ref()) {
        return Ok(schema.clone());
    }

    let bytes = loader
        .load(&mapped)?
        .ok_or_else(|| asdf_err!(SchemaLoad: "no schema found at '{}'", mapped))?;
    let schema: Value = serde_json::from_slice(&bytes)
        .map_err(|e| asdf_err!(SchemaLoad: "malformed schema '{}': {}", mapped, e))?;
    log::debug!("loaded schema {mapped}");

    // Another thread may have loaded the same document meanwhile, either copy is fine.
    Ok(SCHEMA_CACHE
        .entry(mapped.into_owned())
        .or_insert_with(|| Arc::new(schema))
        .clone())
}
