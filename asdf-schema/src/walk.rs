use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;

use asdf_error::AsdfResult;
use asdf_tree::Node;

use crate::validator::is_external_reference;
use crate::{InstancePath, ValidationContext, ValidationError, Validator};

/// Identities of the containers above a node on the current branch.
struct Ancestor {
    id: usize,
    parent: Option<Rc<Ancestor>>,
}

fn is_ancestor(mut chain: Option<&Rc<Ancestor>>, id: usize) -> bool {
    while let Some(link) = chain {
        if link.id == id {
            return true;
        }
        chain = link.parent.as_ref();
    }
    false
}

struct Frame {
    node: Node,
    path: InstancePath,
    ancestors: Option<Rc<Ancestor>>,
}

/// The validation errors of a tree, produced lazily while walking it.
///
/// Each node carrying a tag is validated against the schema its tag resolves to; every map value
/// and sequence item is then visited whether or not a schema applied. A node already on the path
/// from the root is not visited again, so cyclic trees terminate. Maps holding a `$ref` key are
/// external references and are skipped along with everything under them.
///
/// A schema that fails to load is yielded as an `Err` and ends the walk.
pub struct ValidationErrors<'a> {
    validator: Arc<Validator>,
    ctx: &'a ValidationContext,
    root_schema: Option<String>,
    stack: Vec<Frame>,
    pending: VecDeque<ValidationError>,
    failed: bool,
}

impl<'a> ValidationErrors<'a> {
    pub(crate) fn new(validator: Arc<Validator>, tree: &Node, ctx: &'a ValidationContext) -> Self {
        Self {
            validator,
            ctx,
            root_schema: None,
            stack: vec![Frame {
                node: tree.clone(),
                path: InstancePath::root(),
                ancestors: None,
            }],
            pending: VecDeque::new(),
            failed: false,
        }
    }

    /// Validate the root against the schema at `url` instead of the one its tag selects.
    pub fn with_root_schema(mut self, url: impl Into<String>) -> Self {
        self.root_schema = Some(url.into());
        self
    }

    fn visit(&mut self, frame: Frame) -> AsdfResult<()> {
        let Frame {
            node,
            path,
            ancestors,
        } = frame;

        if is_ancestor(ancestors.as_ref(), node.id()) {
            log::trace!("{path}: already on this branch, not revisiting");
            return Ok(());
        }
        if is_external_reference(&node) {
            log::trace!("{path}: skipping external reference");
            return Ok(());
        }

        let schema_url = if path.is_root() {
            self.root_schema.take()
        } else {
            None
        }
        .or_else(|| {
            node.tag()
                .and_then(|tag| self.ctx.schema_url_for_tag(tag.as_str()))
        });
        if let Some(url) = schema_url {
            log::trace!("{path}: validating against {url}");
            let errors = self.validator.validate_node(&node, &url, self.ctx, &path)?;
            self.pending.extend(errors);
        }

        let link = Some(Rc::new(Ancestor {
            id: node.id(),
            parent: ancestors,
        }));
        let children: Vec<(InstancePath, Node)> = match &node {
            Node::Map(map) => map
                .entries()
                .into_iter()
                .map(|(key, child)| (path.key(key), child))
                .collect(),
            Node::Seq(seq) => seq
                .items()
                .into_iter()
                .enumerate()
                .map(|(i, child)| (path.index(i), child))
                .collect(),
            Node::Scalar(_) => Vec::new(),
        };
        // Reversed, so children pop off the stack in document order.
        self.stack
            .extend(children.into_iter().rev().map(|(path, node)| Frame {
                node,
                path,
                ancestors: link.clone(),
            }));
        Ok(())
    }
}

impl Iterator for ValidationErrors<'_> {
    type Item = AsdfResult<ValidationError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(error) = self.pending.pop_front() {
                return Some(Ok(error));
            }
            if self.failed {
                return None;
            }
            let frame = self.stack.pop()?;
            if let Err(e) = self.visit(frame) {
                self.failed = true;
                self.stack.clear();
                return Some(Err(e));
            }
        }
    }
}
