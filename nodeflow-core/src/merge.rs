//! Wrapper suppression across batches.
//!
//! When several independent passes must read as one continuous document,
//! the merge transforms emit the `DocumentStart`/outer `CollectionStart`
//! pair once, on the very first batch, and filter every later batch's
//! wrapper nodes while row-level content passes through. The single
//! closing pair is flushed by `complete()`.
//!
//! Merge transforms are the one deliberate exception to the
//! one-instance-per-pass rule: a single instance spans the batches it
//! merges.

use crate::node::{Node, NodeKind, Phase};
use crate::stream::{Nesting, StreamError, Transform};

#[derive(Debug, Default)]
struct MergeState {
    nesting: Nesting,
    collection_depth: u32,
    opened_document: bool,
    opened_collection: bool,
}

impl MergeState {
    fn transform(&mut self, node: Node, out: &mut Vec<Node>) -> Result<(), StreamError> {
        self.nesting.track(&node)?;

        match (node.kind, node.phase) {
            (NodeKind::Document, Some(Phase::Start)) => {
                if !self.opened_document && !self.opened_collection {
                    self.opened_document = true;
                    out.push(node);
                }
            }
            (NodeKind::Document, Some(Phase::End)) => {}

            (NodeKind::Collection, Some(Phase::Start)) => {
                self.collection_depth += 1;
                if self.collection_depth == 1 {
                    if !self.opened_collection {
                        self.opened_collection = true;
                        out.push(node);
                    }
                } else {
                    out.push(node);
                }
            }
            (NodeKind::Collection, Some(Phase::End)) => {
                self.collection_depth -= 1;
                if self.collection_depth > 0 {
                    out.push(node);
                }
            }

            _ => out.push(node),
        }
        Ok(())
    }

    fn complete(&mut self, out: &mut Vec<Node>) -> Result<(), StreamError> {
        self.nesting.finish()?;
        if self.opened_collection {
            out.push(Node::collection_end());
        }
        if self.opened_document {
            out.push(Node::document_end());
        }
        Ok(())
    }
}

/// Merges table-shaped batches (object rows) into one document.
#[derive(Debug, Default)]
pub struct MergeTableTransform {
    state: MergeState,
}

impl MergeTableTransform {
    pub fn new() -> MergeTableTransform {
        MergeTableTransform::default()
    }
}

impl Transform for MergeTableTransform {
    fn transform(&mut self, node: Node, out: &mut Vec<Node>) -> Result<(), StreamError> {
        self.state.transform(node, out)
    }

    fn complete(&mut self, out: &mut Vec<Node>) -> Result<(), StreamError> {
        self.state.complete(out)
    }
}

/// Merges matrix-shaped batches (collection rows) into one document.
///
/// Row collections sit one level inside the outer wrapper, so only the
/// outermost collection of each batch is suppressed.
#[derive(Debug, Default)]
pub struct MergeMatrixTransform {
    state: MergeState,
}

impl MergeMatrixTransform {
    pub fn new() -> MergeMatrixTransform {
        MergeMatrixTransform::default()
    }
}

impl Transform for MergeMatrixTransform {
    fn transform(&mut self, node: Node, out: &mut Vec<Node>) -> Result<(), StreamError> {
        self.state.transform(node, out)
    }

    fn complete(&mut self, out: &mut Vec<Node>) -> Result<(), StreamError> {
        self.state.complete(out)
    }
}
