use asdf_error::{AsdfResult, asdf_err};
use asdf_tree::Node;
use serde_json::{Map, Value};

use crate::validator::parse_base;
use crate::{
    InstancePath, KeywordSet, ValidationContext, ValidationError, ValidationErrors, Validator,
};

/// Lazily enumerate every validation error in `tree`.
pub fn iter_errors<'a>(tree: &Node, ctx: &'a ValidationContext) -> AsdfResult<ValidationErrors<'a>> {
    Ok(ValidationErrors::new(
        Validator::for_keywords(KeywordSet::Yaml)?,
        tree,
        ctx,
    ))
}

/// Validate `tree`, failing on the first error.
pub fn validate(tree: &Node, ctx: &ValidationContext) -> AsdfResult<()> {
    match iter_errors(tree, ctx)?.next() {
        None => Ok(()),
        Some(Ok(error)) => Err(error.into()),
        Some(Err(e)) => Err(e),
    }
}

fn walk_with(keywords: KeywordSet, tree: &Node, ctx: &ValidationContext) -> AsdfResult<()> {
    let validator = Validator::for_keywords(keywords)?;
    for result in ValidationErrors::new(validator, tree, ctx) {
        result?;
    }
    Ok(())
}

/// Insert the schema `default` of every absent property, at every level of `tree`.
pub fn fill_defaults(tree: &Node, ctx: &ValidationContext) -> AsdfResult<()> {
    walk_with(KeywordSet::FillDefaults, tree, ctx)
}

/// Delete every property whose value equals its schema `default`, at every level of `tree`.
pub fn remove_defaults(tree: &Node, ctx: &ValidationContext) -> AsdfResult<()> {
    walk_with(KeywordSet::RemoveDefaults, tree, ctx)
}

/// Check that `schema` is a valid YAML schema, and that every `default` it declares is valid
/// against the subschema declaring it.
pub fn check_schema(schema: &Value, ctx: &ValidationContext) -> AsdfResult<()> {
    let json = Validator::for_keywords(KeywordSet::Json)?;
    let meta = Validator::for_keywords(KeywordSet::Yaml)?;
    let node = Node::from_json(schema);

    if let Some(error) = json
        .validate_node(&node, meta.meta_schema_url(), ctx, &InstancePath::root())?
        .into_iter()
        .next()
    {
        return Err(error.into());
    }

    let base = parse_base(
        schema
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or("urn:asdf:anonymous-schema"),
    )?;
    let mut subschemas = vec![(schema, InstancePath::root())];
    while let Some((subschema, path)) = subschemas.pop() {
        let Some(object) = subschema.as_object() else {
            continue;
        };
        if let Some(default) = object.get("default") {
            let errors = json.validate_with_schema(
                &Node::from_json(default),
                subschema,
                &base,
                ctx,
                &path.key("default"),
            )?;
            if let Some(error) = errors.into_iter().next() {
                return Err(asdf_err!(
                    Validation: "default at {} does not match its schema: {}",
                    error.path,
                    error.message
                ));
            }
        }
        subschemas.extend(child_schemas(object, &path));
    }
    Ok(())
}

/// Every subschema directly nested in `schema`, with its location.
fn child_schemas<'a>(
    schema: &'a Map<String, Value>,
    path: &InstancePath,
) -> Vec<(&'a Value, InstancePath)> {
    let mut out = Vec::new();
    for (keyword, value) in schema {
        match (keyword.as_str(), value) {
            ("properties" | "patternProperties" | "definitions" | "dependencies", Value::Object(m)) => {
                out.extend(m.iter().map(|(k, v)| (v, path.key(keyword).key(k))));
            }
            ("items" | "allOf" | "anyOf" | "oneOf", Value::Array(items)) => {
                out.extend(
                    items
                        .iter()
                        .enumerate()
                        .map(|(i, v)| (v, path.key(keyword).index(i))),
                );
            }
            ("items" | "additionalItems" | "additionalProperties" | "not", Value::Object(_)) => {
                out.push((value, path.key(keyword)));
            }
            _ => {}
        }
    }
    out
}

/// All errors of `tree` against the schema at `url`, ignoring the tag of the root.
pub fn validate_against(
    tree: &Node,
    url: &str,
    ctx: &ValidationContext,
) -> AsdfResult<Vec<ValidationError>> {
    Validator::for_keywords(KeywordSet::Yaml)?
        .validate_node(tree, url, ctx, &InstancePath::root())
}
