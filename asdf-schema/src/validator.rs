use std::fmt::Display;
use std::sync::{Arc, LazyLock};

use asdf_error::{AsdfResult, asdf_err};
use asdf_tree::{FlowStyle, Node, Scalar, ScalarStyle};
use dashmap::DashMap;
use itertools::Itertools;
use regex::Regex;
use rustc_hash::FxHashSet;
use serde_json::{Map, Value};
use url::Url;

use crate::{
    EmbeddedSchemaLoader, InstancePath, JSON_SCHEMA_URL, UrlMapping, ValidationContext,
    ValidationError, YAML_SCHEMA_URL, load_schema,
};

/// The instance keywords of JSON schema draft 4.
const DRAFT4_KEYWORDS: &[&str] = &[
    "$ref",
    "type",
    "enum",
    "properties",
    "patternProperties",
    "additionalProperties",
    "required",
    "dependencies",
    "items",
    "additionalItems",
    "minItems",
    "maxItems",
    "uniqueItems",
    "minLength",
    "maxLength",
    "pattern",
    "minimum",
    "maximum",
    "multipleOf",
    "minProperties",
    "maxProperties",
    "allOf",
    "anyOf",
    "oneOf",
    "not",
];

/// Keywords the YAML schema adds on top of draft 4.
const YAML_KEYWORDS: &[&str] = &["tag", "propertyOrder", "flowStyle", "style"];

/// Keywords followed while filling or removing defaults.
const DEFAULTS_KEYWORDS: &[&str] = &["$ref", "allOf", "properties"];

/// Which keywords a [`Validator`] acts on, and what `properties` does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeywordSet {
    /// Plain JSON schema draft 4. Used to check schemas themselves.
    Json,
    /// Draft 4 plus `tag`, `propertyOrder`, `flowStyle` and `style`.
    Yaml,
    /// `properties` inserts missing properties that have a `default`.
    FillDefaults,
    /// `properties` deletes properties equal to their `default`.
    RemoveDefaults,
}

impl KeywordSet {
    fn meta_schema_url(self) -> &'static str {
        match self {
            Self::Json => JSON_SCHEMA_URL,
            Self::Yaml | Self::FillDefaults | Self::RemoveDefaults => YAML_SCHEMA_URL,
        }
    }

    fn candidates(self) -> impl Iterator<Item = &'static str> {
        let (base, extra): (&[&str], &[&str]) = match self {
            Self::Json => (DRAFT4_KEYWORDS, &[]),
            Self::Yaml => (DRAFT4_KEYWORDS, YAML_KEYWORDS),
            Self::FillDefaults | Self::RemoveDefaults => (DEFAULTS_KEYWORDS, &[]),
        };
        base.iter().chain(extra).copied()
    }
}

static VALIDATORS: LazyLock<DashMap<KeywordSet, Arc<Validator>>> = LazyLock::new(DashMap::new);

/// Validates nodes against schemas with one [`KeywordSet`], bound to the meta-schema that
/// defines those keywords.
///
/// There is at most one validator per keyword set in the process, see [`Validator::for_keywords`].
#[derive(Debug)]
pub struct Validator {
    keywords: KeywordSet,
    meta_schema_url: &'static str,
    active: FxHashSet<&'static str>,
    regexes: DashMap<String, Arc<Regex>>,
}

impl Validator {
    /// The shared validator for `keywords`, built on first use.
    pub fn for_keywords(keywords: KeywordSet) -> AsdfResult<Arc<Validator>> {
        if let Some(validator) = VALIDATORS.get(&keywords) {
            return Ok(validator.clone());
        }
        let validator = Arc::new(Self::build(keywords)?);
        Ok(VALIDATORS.entry(keywords).or_insert(validator).clone())
    }

    fn build(keywords: KeywordSet) -> AsdfResult<Self> {
        let meta_schema_url = keywords.meta_schema_url();
        let loader = EmbeddedSchemaLoader::core();
        let mapping = UrlMapping::default();

        // Every keyword the meta-schema declares, following its `allOf` chain.
        let mut declared = FxHashSet::default();
        let mut pending = vec![meta_schema_url.to_string()];
        let mut seen = FxHashSet::default();
        while let Some(url) = pending.pop() {
            if !seen.insert(url.clone()) {
                continue;
            }
            let meta = load_schema(&url, &mapping, &loader)?;
            let base = parse_base(&url)?;
            let parts = std::iter::once(&*meta).chain(
                meta.get("allOf")
                    .and_then(Value::as_array)
                    .into_iter()
                    .flatten(),
            );
            for part in parts {
                if let Some(properties) = part.get("properties").and_then(Value::as_object) {
                    declared.extend(properties.keys().cloned());
                }
                if let Some(reference) = part.get("$ref").and_then(Value::as_str) {
                    let target = base
                        .join(reference)
                        .map_err(|e| asdf_err!(SchemaLoad: "bad $ref '{}': {}", reference, e))?;
                    pending.push(target.as_str().trim_end_matches('#').to_string());
                }
            }
        }

        let active = keywords
            .candidates()
            .filter(|k| *k == "$ref" || declared.contains(*k))
            .collect::<FxHashSet<_>>();
        log::debug!(
            "built {:?} validator over {} ({} keywords)",
            keywords,
            meta_schema_url,
            active.len()
        );

        Ok(Self {
            keywords,
            meta_schema_url,
            active,
            regexes: DashMap::new(),
        })
    }

    /// The keyword set this validator acts on.
    pub fn keywords(&self) -> KeywordSet {
        self.keywords
    }

    /// URL of the meta-schema the keywords come from.
    pub fn meta_schema_url(&self) -> &'static str {
        self.meta_schema_url
    }

    fn uses(&self, keyword: &str) -> bool {
        self.active.contains(keyword)
    }

    fn regex(&self, pattern: &str) -> AsdfResult<Arc<Regex>> {
        if let Some(regex) = self.regexes.get(pattern) {
            return Ok(regex.clone());
        }
        let regex = Regex::new(pattern)
            .map_err(|e| asdf_err!(SchemaLoad: "invalid pattern '{}': {}", pattern, e))?;
        Ok(self
            .regexes
            .entry(pattern.to_string())
            .or_insert(Arc::new(regex))
            .clone())
    }

    /// Validate `node` against the schema at `url`. `node` is treated as the top of that
    /// schema, so its own `tag` keyword is not checked.
    pub fn validate_node(
        &self,
        node: &Node,
        url: &str,
        ctx: &ValidationContext,
        path: &InstancePath,
    ) -> AsdfResult<Vec<ValidationError>> {
        let schema = ctx.load_schema(url)?;
        let base = parse_base(url)?;
        self.validate_with_schema(node, &schema, &base, ctx, path)
    }

    /// Validate `node` against an already loaded schema, resolving relative references
    /// against `base`.
    pub fn validate_with_schema(
        &self,
        node: &Node,
        schema: &Value,
        base: &Url,
        ctx: &ValidationContext,
        path: &InstancePath,
    ) -> AsdfResult<Vec<ValidationError>> {
        let mut descent = Descent {
            validator: self,
            ctx,
            root_base: base,
            root_schema: schema,
            errors: Vec::new(),
            active: FxHashSet::default(),
        };
        descent.descend(node, schema, base, path, true)?;
        Ok(descent.errors)
    }
}

/// Parse a schema URL for use as a base of relative references.
pub(crate) fn parse_base(url: &str) -> AsdfResult<Url> {
    let mut base =
        Url::parse(url).map_err(|e| asdf_err!(SchemaLoad: "invalid schema URL '{}': {}", url, e))?;
    base.set_fragment(None);
    Ok(base)
}

fn resolve_pointer<'a>(doc: &'a Value, pointer: &str, url: &Url) -> AsdfResult<&'a Value> {
    if pointer.is_empty() {
        return Ok(doc);
    }
    doc.pointer(pointer)
        .ok_or_else(|| asdf_err!(SchemaLoad: "'{}' has nothing at '#{}'", url, pointer))
}

/// A map holding `$ref` points into another document and is never validated in place.
pub(crate) fn is_external_reference(node: &Node) -> bool {
    node.as_map().is_some_and(|map| map.contains_key("$ref"))
}

/// A short description of a node for error messages.
fn summarize(node: &Node) -> String {
    let tag = node.tag().map(|t| format!("!<{t}> ")).unwrap_or_default();
    match node {
        Node::Map(m) => format!("{tag}map with {} entries", m.len()),
        Node::Seq(s) => format!("{tag}sequence of {} items", s.len()),
        Node::Scalar(s) => format!("{tag}{}", s.value()),
    }
}

/// One schema-driven validation of one node, following subschemas eagerly.
struct Descent<'a> {
    validator: &'a Validator,
    ctx: &'a ValidationContext,
    /// The document validation started from, which need not be loadable by URL.
    root_base: &'a Url,
    root_schema: &'a Value,
    errors: Vec<ValidationError>,
    /// (node, subschema) pairs being validated further up the stack.
    active: FxHashSet<(usize, usize)>,
}

impl Descent<'_> {
    fn descend(
        &mut self,
        node: &Node,
        schema: &Value,
        base: &Url,
        path: &InstancePath,
        root: bool,
    ) -> AsdfResult<()> {
        if is_external_reference(node) {
            log::trace!("{path}: skipping external reference");
            return Ok(());
        }
        let Some(schema) = schema.as_object() else {
            if schema.as_bool() == Some(false) {
                self.fail(path, "false", "nothing", node, "no value is allowed".into());
            }
            return Ok(());
        };

        // A cyclic node under a recursive schema comes back to the same pair.
        let key = (node.id(), std::ptr::from_ref(schema) as usize);
        if !self.active.insert(key) {
            return Ok(());
        }
        let result = self.descend_object(node, schema, base, path, root);
        self.active.remove(&key);
        result
    }

    fn descend_object(
        &mut self,
        node: &Node,
        schema: &Map<String, Value>,
        base: &Url,
        path: &InstancePath,
        root: bool,
    ) -> AsdfResult<()> {
        // In draft 4 a $ref replaces its siblings.
        if let Some(reference) = schema.get("$ref").and_then(Value::as_str) {
            return self.follow_ref(node, reference, base, path);
        }

        for (keyword, value) in schema {
            if self.validator.uses(keyword) {
                self.apply(keyword, value, schema, node, base, path, root)?;
            }
        }
        Ok(())
    }

    fn follow_ref(
        &mut self,
        node: &Node,
        reference: &str,
        base: &Url,
        path: &InstancePath,
    ) -> AsdfResult<()> {
        let target = base.join(reference).map_err(
            |e| asdf_err!(SchemaLoad: "bad $ref '{}' from '{}': {}", reference, base, e),
        )?;
        let mut doc_url = target.clone();
        doc_url.set_fragment(None);
        let loaded;
        let doc: &Value = if &doc_url == self.root_base {
            self.root_schema
        } else {
            loaded = self.ctx.load_schema(doc_url.as_str())?;
            &loaded
        };
        let schema = resolve_pointer(doc, target.fragment().unwrap_or(""), &doc_url)?;
        log::trace!("{path}: following $ref to {target}");
        self.descend(node, schema, &doc_url, path, false)
    }

    /// Run a subschema without recording its errors. Returns whether it passed.
    fn probe(
        &mut self,
        node: &Node,
        schema: &Value,
        base: &Url,
        path: &InstancePath,
    ) -> AsdfResult<bool> {
        let saved = std::mem::take(&mut self.errors);
        let result = self.descend(node, schema, base, path, false);
        let passed = self.errors.is_empty();
        self.errors = saved;
        result.map(|()| passed)
    }

    fn fail(
        &mut self,
        path: &InstancePath,
        keyword: &str,
        expected: impl Display,
        node: &Node,
        message: String,
    ) {
        self.errors.push(ValidationError {
            path: path.clone(),
            keyword: keyword.to_string(),
            expected: expected.to_string(),
            actual: summarize(node),
            message,
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn apply(
        &mut self,
        keyword: &str,
        value: &Value,
        schema: &Map<String, Value>,
        node: &Node,
        base: &Url,
        path: &InstancePath,
        root: bool,
    ) -> AsdfResult<()> {
        match keyword {
            "properties" => match self.validator.keywords {
                KeywordSet::FillDefaults => self.fill_properties(node, value, base, path),
                KeywordSet::RemoveDefaults => self.remove_properties(node, value, base, path),
                KeywordSet::Json | KeywordSet::Yaml => self.properties(node, value, base, path),
            },
            "patternProperties" => self.pattern_properties(node, value, base, path),
            "additionalProperties" => self.additional_properties(node, value, schema, base, path),
            "dependencies" => self.dependencies(node, value, base, path),
            "items" => self.items(node, value, base, path),
            "additionalItems" => self.additional_items(node, value, schema, base, path),
            "allOf" => {
                for sub in value.as_array().into_iter().flatten() {
                    self.descend(node, sub, base, path, false)?;
                }
                Ok(())
            }
            "anyOf" | "oneOf" => self.any_or_one_of(keyword == "oneOf", node, value, base, path),
            "not" => {
                if self.probe(node, value, base, path)? {
                    self.fail(
                        path,
                        "not",
                        value,
                        node,
                        "value must not match the 'not' schema".into(),
                    );
                }
                Ok(())
            }
            "tag" => {
                if !root {
                    self.tag(node, value, path);
                }
                Ok(())
            }
            "propertyOrder" | "flowStyle" | "style" => {
                apply_hint(keyword, node, value);
                Ok(())
            }
            _ => {
                self.check_leaf(keyword, node, value, schema, path);
                Ok(())
            }
        }
    }

    fn properties(
        &mut self,
        node: &Node,
        properties: &Value,
        base: &Url,
        path: &InstancePath,
    ) -> AsdfResult<()> {
        let (Some(map), Some(properties)) = (node.as_map(), properties.as_object()) else {
            return Ok(());
        };
        for (name, sub) in properties {
            if let Some(child) = map.get(name) {
                self.descend(&child, sub, base, &path.key(name), false)?;
            }
        }
        Ok(())
    }

    fn fill_properties(
        &mut self,
        node: &Node,
        properties: &Value,
        base: &Url,
        path: &InstancePath,
    ) -> AsdfResult<()> {
        let (Some(map), Some(properties)) = (node.as_map(), properties.as_object()) else {
            return Ok(());
        };
        for (name, sub) in properties {
            if !map.contains_key(name) {
                if let Some(default) = sub.get("default") {
                    log::trace!("{path}: filling default for '{name}'");
                    map.insert(name.clone(), Node::from_json(default));
                }
            }
            if let Some(child) = map.get(name) {
                self.descend(&child, sub, base, &path.key(name), false)?;
            }
        }
        Ok(())
    }

    fn remove_properties(
        &mut self,
        node: &Node,
        properties: &Value,
        base: &Url,
        path: &InstancePath,
    ) -> AsdfResult<()> {
        let (Some(map), Some(properties)) = (node.as_map(), properties.as_object()) else {
            return Ok(());
        };
        for (name, sub) in properties {
            let Some(child) = map.get(name) else {
                continue;
            };
            // Children first, so a value that only differs by nested defaults still matches.
            self.descend(&child, sub, base, &path.key(name), false)?;
            if sub.get("default").is_some_and(|default| child.eq_json(default)) {
                log::trace!("{path}: removing default '{name}'");
                map.remove(name);
            }
        }
        Ok(())
    }

    fn pattern_properties(
        &mut self,
        node: &Node,
        patterns: &Value,
        base: &Url,
        path: &InstancePath,
    ) -> AsdfResult<()> {
        let (Some(map), Some(patterns)) = (node.as_map(), patterns.as_object()) else {
            return Ok(());
        };
        let entries = map.entries();
        for (pattern, sub) in patterns {
            let regex = self.validator.regex(pattern)?;
            for (key, child) in entries.iter().filter(|(k, _)| regex.is_match(k)) {
                self.descend(child, sub, base, &path.key(key), false)?;
            }
        }
        Ok(())
    }

    fn additional_properties(
        &mut self,
        node: &Node,
        additional: &Value,
        schema: &Map<String, Value>,
        base: &Url,
        path: &InstancePath,
    ) -> AsdfResult<()> {
        let Some(map) = node.as_map() else {
            return Ok(());
        };
        let properties = schema.get("properties").and_then(Value::as_object);
        let patterns = schema
            .get("patternProperties")
            .and_then(Value::as_object)
            .map(|p| {
                p.keys()
                    .map(|k| self.validator.regex(k))
                    .collect::<AsdfResult<Vec<_>>>()
            })
            .transpose()?
            .unwrap_or_default();

        let extras = map
            .entries()
            .into_iter()
            .filter(|(k, _)| !properties.is_some_and(|p| p.contains_key(k)))
            .filter(|(k, _)| !patterns.iter().any(|r| r.is_match(k)))
            .collect::<Vec<_>>();

        match additional {
            Value::Bool(false) if !extras.is_empty() => {
                let names = extras.iter().map(|(k, _)| k.as_str()).join("', '");
                self.fail(
                    path,
                    "additionalProperties",
                    "no additional properties",
                    node,
                    format!("additional properties are not allowed ('{names}' unexpected)"),
                );
            }
            Value::Object(_) => {
                for (key, child) in &extras {
                    self.descend(child, additional, base, &path.key(key), false)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn dependencies(
        &mut self,
        node: &Node,
        dependencies: &Value,
        base: &Url,
        path: &InstancePath,
    ) -> AsdfResult<()> {
        let (Some(map), Some(dependencies)) = (node.as_map(), dependencies.as_object()) else {
            return Ok(());
        };
        for (property, dependency) in dependencies {
            if !map.contains_key(property) {
                continue;
            }
            match dependency {
                Value::Array(required) => {
                    for name in required.iter().filter_map(Value::as_str) {
                        if !map.contains_key(name) {
                            self.fail(
                                path,
                                "dependencies",
                                name,
                                node,
                                format!("'{name}' is a dependency of '{property}'"),
                            );
                        }
                    }
                }
                sub => self.descend(node, sub, base, path, false)?,
            }
        }
        Ok(())
    }

    fn items(
        &mut self,
        node: &Node,
        items: &Value,
        base: &Url,
        path: &InstancePath,
    ) -> AsdfResult<()> {
        let Some(seq) = node.as_seq() else {
            return Ok(());
        };
        match items {
            Value::Array(tuple) => {
                for (i, (item, sub)) in seq.items().iter().zip(tuple).enumerate() {
                    self.descend(item, sub, base, &path.index(i), false)?;
                }
            }
            sub => {
                for (i, item) in seq.items().iter().enumerate() {
                    self.descend(item, sub, base, &path.index(i), false)?;
                }
            }
        }
        Ok(())
    }

    fn additional_items(
        &mut self,
        node: &Node,
        additional: &Value,
        schema: &Map<String, Value>,
        base: &Url,
        path: &InstancePath,
    ) -> AsdfResult<()> {
        let (Some(seq), Some(Value::Array(tuple))) = (node.as_seq(), schema.get("items")) else {
            return Ok(());
        };
        let items = seq.items();
        if items.len() <= tuple.len() {
            return Ok(());
        }
        match additional {
            Value::Bool(false) => self.fail(
                path,
                "additionalItems",
                format!("at most {} items", tuple.len()),
                node,
                "additional items are not allowed".into(),
            ),
            Value::Object(_) => {
                for (i, item) in items.iter().enumerate().skip(tuple.len()) {
                    self.descend(item, additional, base, &path.index(i), false)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn any_or_one_of(
        &mut self,
        exactly_one: bool,
        node: &Node,
        options: &Value,
        base: &Url,
        path: &InstancePath,
    ) -> AsdfResult<()> {
        let options = options.as_array().map(Vec::as_slice).unwrap_or_default();
        let mut passed = 0;
        for option in options {
            if self.probe(node, option, base, path)? {
                passed += 1;
                if !exactly_one {
                    return Ok(());
                }
            }
        }

        if exactly_one && passed > 1 {
            self.fail(
                path,
                "oneOf",
                "exactly one matching schema",
                node,
                format!("value is valid under {passed} of the 'oneOf' schemas"),
            );
        } else if passed == 0 {
            let keyword = if exactly_one { "oneOf" } else { "anyOf" };
            self.fail(
                path,
                keyword,
                format!("one of {} schemas", options.len()),
                node,
                format!("value is not valid under any of the '{keyword}' schemas"),
            );
        }
        Ok(())
    }

    fn tag(&mut self, node: &Node, expected: &Value, path: &InstancePath) {
        let Some(expected) = expected.as_str() else {
            return;
        };
        let actual = node.effective_tag();
        if !actual.matches(expected) {
            self.fail(
                path,
                "tag",
                expected,
                node,
                format!("mismatched tags, wanted '{expected}', got '{actual}'"),
            );
        }
    }

    /// Keywords that constrain a single node and never descend.
    fn check_leaf(
        &mut self,
        keyword: &str,
        node: &Node,
        value: &Value,
        schema: &Map<String, Value>,
        path: &InstancePath,
    ) {
        match keyword {
            "type" => {
                let actual = node.json_type();
                let accepts =
                    |t: &str| t == actual || (t == "number" && actual == "integer");
                let ok = match value {
                    Value::String(t) => accepts(t),
                    Value::Array(ts) => ts.iter().filter_map(Value::as_str).any(accepts),
                    _ => true,
                };
                if !ok {
                    self.fail(
                        path,
                        "type",
                        value,
                        node,
                        format!("{actual} is not of type {value}"),
                    );
                }
            }
            "enum" => {
                let options = value.as_array().map(Vec::as_slice).unwrap_or_default();
                if !options.iter().any(|option| node.eq_json(option)) {
                    self.fail(
                        path,
                        "enum",
                        value,
                        node,
                        format!("value is not one of {value}"),
                    );
                }
            }
            "required" => {
                let Some(map) = node.as_map() else { return };
                for name in value.as_array().into_iter().flatten().filter_map(Value::as_str) {
                    if !map.contains_key(name) {
                        self.fail(
                            path,
                            "required",
                            name,
                            node,
                            format!("'{name}' is a required property"),
                        );
                    }
                }
            }
            "minItems" | "maxItems" => {
                let (Some(seq), Some(limit)) = (node.as_seq(), value.as_u64()) else {
                    return;
                };
                self.check_count(keyword, "items", seq.len(), limit, keyword == "minItems", node, path);
            }
            "minProperties" | "maxProperties" => {
                let (Some(map), Some(limit)) = (node.as_map(), value.as_u64()) else {
                    return;
                };
                self.check_count(
                    keyword,
                    "properties",
                    map.len(),
                    limit,
                    keyword == "minProperties",
                    node,
                    path,
                );
            }
            "minLength" | "maxLength" => {
                let (Some(s), Some(limit)) = (node.as_str(), value.as_u64()) else {
                    return;
                };
                self.check_count(
                    keyword,
                    "characters",
                    s.chars().count(),
                    limit,
                    keyword == "minLength",
                    node,
                    path,
                );
            }
            "uniqueItems" => {
                let Some(seq) = node.as_seq() else { return };
                if value.as_bool() != Some(true) {
                    return;
                }
                let items = seq.items();
                let duplicate = items
                    .iter()
                    .enumerate()
                    .any(|(i, a)| items[i + 1..].iter().any(|b| a == b));
                if duplicate {
                    self.fail(
                        path,
                        "uniqueItems",
                        "unique items",
                        node,
                        "sequence has non-unique items".into(),
                    );
                }
            }
            "pattern" => {
                let (Some(s), Some(pattern)) = (node.as_str(), value.as_str()) else {
                    return;
                };
                match self.validator.regex(pattern) {
                    Ok(regex) if !regex.is_match(&s) => self.fail(
                        path,
                        "pattern",
                        pattern,
                        node,
                        format!("'{s}' does not match '{pattern}'"),
                    ),
                    Ok(_) => {}
                    Err(e) => log::warn!("{path}: skipping pattern: {e}"),
                }
            }
            "minimum" | "maximum" => {
                let (Some(v), Some(limit)) = (node.as_f64(), value.as_f64()) else {
                    return;
                };
                let minimum = keyword == "minimum";
                let exclusive_keyword = if minimum {
                    "exclusiveMinimum"
                } else {
                    "exclusiveMaximum"
                };
                let exclusive = schema
                    .get(exclusive_keyword)
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                let ok = match (minimum, exclusive) {
                    (true, false) => v >= limit,
                    (true, true) => v > limit,
                    (false, false) => v <= limit,
                    (false, true) => v < limit,
                };
                if !ok {
                    let relation = match (minimum, exclusive) {
                        (true, false) => "less than",
                        (true, true) => "less than or equal to",
                        (false, false) => "greater than",
                        (false, true) => "greater than or equal to",
                    };
                    self.fail(
                        path,
                        if minimum { "minimum" } else { "maximum" },
                        limit,
                        node,
                        format!("{v} is {relation} the {keyword} of {limit}"),
                    );
                }
            }
            "multipleOf" => {
                let ok = match (node.as_i64(), value.as_i64()) {
                    (Some(v), Some(m)) if m != 0 => v % m == 0,
                    _ => match (node.as_f64(), value.as_f64()) {
                        (Some(v), Some(m)) => (v / m).fract() == 0.0,
                        _ => true,
                    },
                };
                if !ok {
                    self.fail(
                        path,
                        "multipleOf",
                        value,
                        node,
                        format!("value is not a multiple of {value}"),
                    );
                }
            }
            _ => {}
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn check_count(
        &mut self,
        keyword: &str,
        what: &str,
        count: usize,
        limit: u64,
        minimum: bool,
        node: &Node,
        path: &InstancePath,
    ) {
        let count = u64::try_from(count).unwrap_or(u64::MAX);
        let ok = if minimum { count >= limit } else { count <= limit };
        if !ok {
            let bound = if minimum { "at least" } else { "at most" };
            self.fail(
                path,
                keyword,
                format!("{bound} {limit} {what}"),
                node,
                format!("expected {bound} {limit} {what}, found {count}"),
            );
        }
    }
}

/// `propertyOrder`, `flowStyle` and `style` constrain nothing: they record a writing hint on the
/// node.
fn apply_hint(keyword: &str, node: &Node, value: &Value) {
    match (keyword, node) {
        ("propertyOrder", Node::Map(map)) => {
            let order: Vec<String> = value
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect();
            if !order.is_empty() {
                map.set_property_order(Some(order));
            }
        }
        ("flowStyle", Node::Map(_) | Node::Seq(_)) => {
            let Some(style) = value.as_str().and_then(|s| s.parse::<FlowStyle>().ok()) else {
                return;
            };
            match node {
                Node::Map(map) => map.set_flow_style(Some(style)),
                Node::Seq(seq) => seq.set_flow_style(Some(style)),
                Node::Scalar(_) => {}
            }
        }
        ("style", Node::Scalar(scalar)) if matches!(scalar.value(), Scalar::Str(_)) => {
            if let Some(style) = value.as_str().and_then(|s| s.parse::<ScalarStyle>().ok()) {
                scalar.set_style(Some(style));
            }
        }
        _ => {}
    }
}
