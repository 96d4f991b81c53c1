//! In-memory object-graph adapter.
//!
//! The tree is the reference implementation of both boundary contracts:
//! `TreeReader` renders a tree as a well-nested node stream (lazily, via
//! an explicit visit stack rather than recursion), and `TreeWriter`
//! materializes a tree from any valid stream. The tree uses an
//! index-based arena pattern for cheap allocation and parent pointers
//! without reference cycles.
//!
//! Structural expectations come from explicit schema registration
//! ([`ShapeRegistry`]) instead of reflection: a registered shape names
//! the member labels an object may contain, optionally with an expected
//! scalar type per member.

use crate::node::{Node, NodeKind, Phase};
use crate::stream::{Nesting, Reader, Settings, StreamError, Writer};
use crate::value::{ScalarKind, Value};

// ============================================================================
// Core Types
// ============================================================================

/// Index into the tree's node arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeId(u32);

impl TreeId {
    fn new(index: usize) -> Self {
        TreeId(index as u32)
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Internal node storage.
#[derive(Debug)]
struct TreeData {
    parent: Option<TreeId>,
    children: Vec<TreeId>,
    kind: TreeKind,
}

/// The kind of node in the tree.
#[derive(Debug, PartialEq)]
pub enum TreeKind {
    /// Root container.
    Document,

    /// Record with named members.
    Object { label: Option<String> },

    /// Ordered item container.
    Collection { label: Option<String> },

    /// Named member; children hold its content.
    Property { label: String },

    /// Scalar leaf.
    Scalar(Value),
}

// ============================================================================
// Tree
// ============================================================================

/// An object graph materialized in memory.
#[derive(Debug)]
pub struct Tree {
    nodes: Vec<TreeData>,
    root: TreeId,
}

impl Tree {
    /// An empty tree: just the document root.
    pub fn new() -> Tree {
        Tree {
            nodes: vec![TreeData {
                parent: None,
                children: Vec::new(),
                kind: TreeKind::Document,
            }],
            root: TreeId::new(0),
        }
    }

    /// Get the root node handle.
    pub fn root(&self) -> TreeNode<'_> {
        TreeNode { tree: self, id: self.root }
    }

    /// Get a node by ID.
    pub fn get(&self, id: TreeId) -> Option<TreeNode<'_>> {
        if id.index() < self.nodes.len() {
            Some(TreeNode { tree: self, id })
        } else {
            None
        }
    }

    /// Total number of nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Attach an object under `parent`.
    pub fn add_object(&mut self, parent: TreeId, label: Option<&str>) -> TreeId {
        self.add(parent, TreeKind::Object { label: label.map(str::to_owned) })
    }

    /// Attach a collection under `parent`.
    pub fn add_collection(&mut self, parent: TreeId, label: Option<&str>) -> TreeId {
        self.add(parent, TreeKind::Collection { label: label.map(str::to_owned) })
    }

    /// Attach a property under `parent`.
    pub fn add_property(&mut self, parent: TreeId, label: &str) -> TreeId {
        self.add(parent, TreeKind::Property { label: label.to_owned() })
    }

    /// Attach a scalar leaf under `parent`.
    pub fn add_scalar(&mut self, parent: TreeId, value: Value) -> TreeId {
        self.add(parent, TreeKind::Scalar(value))
    }

    /// Attach a property holding one scalar - the common case.
    pub fn add_field(&mut self, parent: TreeId, label: &str, value: Value) -> TreeId {
        let property = self.add_property(parent, label);
        self.add_scalar(property, value);
        property
    }

    fn add(&mut self, parent: TreeId, kind: TreeKind) -> TreeId {
        let id = TreeId::new(self.nodes.len());
        self.nodes.push(TreeData {
            parent: Some(parent),
            children: Vec::new(),
            kind,
        });
        self.nodes[parent.index()].children.push(id);
        id
    }

    fn node_data(&self, id: TreeId) -> &TreeData {
        &self.nodes[id.index()]
    }
}

impl Default for Tree {
    fn default() -> Self {
        Tree::new()
    }
}

// ============================================================================
// TreeNode (navigation handle)
// ============================================================================

/// A lightweight handle for navigating the tree.
#[derive(Clone, Copy)]
pub struct TreeNode<'t> {
    tree: &'t Tree,
    id: TreeId,
}

impl<'t> TreeNode<'t> {
    /// Get the node's ID.
    pub fn id(&self) -> TreeId {
        self.id
    }

    /// Get the node's kind.
    pub fn kind(&self) -> &'t TreeKind {
        &self.tree.node_data(self.id).kind
    }

    /// Get the parent node, if any.
    pub fn parent(&self) -> Option<TreeNode<'t>> {
        self.tree
            .node_data(self.id)
            .parent
            .map(|id| TreeNode { tree: self.tree, id })
    }

    /// Iterate over child nodes.
    pub fn children(&self) -> impl Iterator<Item = TreeNode<'t>> + 't {
        let tree = self.tree;
        self.tree
            .node_data(self.id)
            .children
            .iter()
            .map(move |&id| TreeNode { tree, id })
    }

    /// Get the first child node.
    pub fn first_child(&self) -> Option<TreeNode<'t>> {
        self.tree
            .node_data(self.id)
            .children
            .first()
            .map(|&id| TreeNode { tree: self.tree, id })
    }

    /// The node's label, where its kind carries one.
    pub fn label(&self) -> Option<&'t str> {
        match self.kind() {
            TreeKind::Object { label } | TreeKind::Collection { label } => label.as_deref(),
            TreeKind::Property { label } => Some(label),
            _ => None,
        }
    }

    /// Get the scalar value if this is a leaf.
    pub fn as_scalar(&self) -> Option<&'t Value> {
        match self.kind() {
            TreeKind::Scalar(value) => Some(value),
            _ => None,
        }
    }

    /// Find a child property by label, case-insensitively.
    pub fn property(&self, label: &str) -> Option<TreeNode<'t>> {
        self.children().find(|child| {
            matches!(child.kind(), TreeKind::Property { label: l } if l.eq_ignore_ascii_case(label))
        })
    }

    /// The scalar under a child property, if both exist.
    pub fn field(&self, label: &str) -> Option<&'t Value> {
        self.property(label)?.first_child()?.as_scalar()
    }
}

impl std::fmt::Debug for TreeNode<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeNode")
            .field("id", &self.id)
            .field("kind", self.kind())
            .finish()
    }
}

// ============================================================================
// Shapes (explicit schema registration)
// ============================================================================

/// A registered member of a shape.
#[derive(Debug, Clone)]
pub struct Member {
    label: String,
    expected: Option<ScalarKind>,
}

/// The member labels an object label admits, with optional expected
/// scalar types.
#[derive(Debug, Clone)]
pub struct Shape {
    label: String,
    members: Vec<Member>,
}

impl Shape {
    pub fn new(label: &str) -> Shape {
        Shape { label: label.to_owned(), members: Vec::new() }
    }

    /// Admit a member with no type expectation.
    pub fn member(mut self, label: &str) -> Shape {
        self.members.push(Member { label: label.to_owned(), expected: None });
        self
    }

    /// Admit a member whose values must conform to `kind`.
    pub fn typed_member(mut self, label: &str, kind: ScalarKind) -> Shape {
        self.members.push(Member { label: label.to_owned(), expected: Some(kind) });
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn members(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|m| m.label.as_str())
    }

    fn find(&self, label: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.label.eq_ignore_ascii_case(label))
    }
}

/// Shapes keyed by object label.
#[derive(Debug, Clone, Default)]
pub struct ShapeRegistry {
    shapes: Vec<Shape>,
}

impl ShapeRegistry {
    pub fn new() -> ShapeRegistry {
        ShapeRegistry::default()
    }

    pub fn register(mut self, shape: Shape) -> ShapeRegistry {
        self.shapes.push(shape);
        self
    }

    fn shape_for(&self, label: &str) -> Option<&Shape> {
        self.shapes.iter().find(|s| s.label.eq_ignore_ascii_case(label))
    }
}

// ============================================================================
// TreeReader (tree -> node stream)
// ============================================================================

enum Visit {
    Open(TreeId),
    Close(TreeId),
}

/// Lazy reader over a tree.
///
/// An explicit stack of pending visit frames stands in for recursive
/// descent, so memory stays bounded by tree depth, not size. Fragment
/// mode skips the document wrapper.
pub struct TreeReader<'t> {
    tree: &'t Tree,
    stack: Vec<Visit>,
    current: Option<Node>,
}

impl<'t> TreeReader<'t> {
    pub fn new(tree: &'t Tree) -> TreeReader<'t> {
        TreeReader::with_settings(tree, Settings::default())
    }

    pub fn with_settings(tree: &'t Tree, settings: Settings) -> TreeReader<'t> {
        let mut stack = Vec::new();
        if settings.is_fragment {
            // Skip the document wrapper: queue the root's children directly
            for child in tree.node_data(tree.root).children.iter().rev() {
                stack.push(Visit::Open(*child));
            }
        } else {
            stack.push(Visit::Open(tree.root));
        }
        TreeReader { tree, stack, current: None }
    }

    fn open_event(&self, id: TreeId) -> Node {
        match &self.tree.node_data(id).kind {
            TreeKind::Document => Node::document_start(),
            TreeKind::Object { label } => Node::object_start(label.as_deref()),
            TreeKind::Collection { label } => Node::collection_start(label.as_deref()),
            TreeKind::Property { label } => Node::property_start(label),
            TreeKind::Scalar(value) => Node::value(value.clone()),
        }
    }

    fn close_event(&self, id: TreeId) -> Node {
        match &self.tree.node_data(id).kind {
            TreeKind::Document => Node::document_end(),
            TreeKind::Object { .. } => Node::object_end(),
            TreeKind::Collection { .. } => Node::collection_end(),
            TreeKind::Property { .. } => Node::property_end(),
            // Scalars never get a Close frame
            TreeKind::Scalar(value) => Node::value(value.clone()),
        }
    }
}

impl Reader for TreeReader<'_> {
    fn advance(&mut self) -> Result<bool, StreamError> {
        match self.stack.pop() {
            Some(Visit::Open(id)) => {
                let event = self.open_event(id);
                if !matches!(self.tree.node_data(id).kind, TreeKind::Scalar(_)) {
                    self.stack.push(Visit::Close(id));
                    for child in self.tree.node_data(id).children.iter().rev() {
                        self.stack.push(Visit::Open(*child));
                    }
                }
                self.current = Some(event);
                Ok(true)
            }
            Some(Visit::Close(id)) => {
                self.current = Some(self.close_event(id));
                Ok(true)
            }
            None => {
                self.current = None;
                Ok(false)
            }
        }
    }

    fn current(&self) -> Option<&Node> {
        self.current.as_ref()
    }
}

// ============================================================================
// TreeWriter (node stream -> tree)
// ============================================================================

/// Writer materializing a tree from a node stream.
///
/// With a shape registry attached, property labels under registered
/// object labels are checked: an unknown label is a structural mismatch,
/// fatal unless lenient mode drains the whole subtree instead. Typed
/// members additionally coerce-check incoming values.
pub struct TreeWriter {
    tree: Tree,
    stack: Vec<TreeId>,
    nesting: Nesting,
    shapes: Option<ShapeRegistry>,
    settings: Settings,
    /// Balanced Start/End countdown while draining a mismatched subtree.
    skip_depth: u32,
    closed: bool,
}

impl TreeWriter {
    pub fn new() -> TreeWriter {
        TreeWriter::with_settings(Settings::default())
    }

    pub fn with_settings(settings: Settings) -> TreeWriter {
        let tree = Tree::new();
        let root = tree.root;
        TreeWriter {
            tree,
            stack: vec![root],
            nesting: Nesting::new(),
            shapes: None,
            settings,
            skip_depth: 0,
            closed: false,
        }
    }

    /// Attach structural expectations.
    pub fn with_shapes(mut self, shapes: ShapeRegistry) -> TreeWriter {
        self.shapes = Some(shapes);
        self
    }

    /// Take the materialized tree. Call after `complete()`.
    pub fn into_tree(self) -> Tree {
        self.tree
    }

    /// The materialized tree so far.
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    fn top(&self) -> Result<TreeId, StreamError> {
        match self.stack.last() {
            Some(id) => Ok(*id),
            None => Err(StreamError::malformed("content after the document closed")),
        }
    }

    /// Dotted path of labels down to the current container.
    fn path(&self) -> String {
        let mut parts = Vec::new();
        for id in &self.stack {
            if let Some(label) = (TreeNode { tree: &self.tree, id: *id }).label() {
                parts.push(label.to_owned());
            }
        }
        if parts.is_empty() {
            "document".to_owned()
        } else {
            parts.join(".")
        }
    }

    /// The shape registered for the innermost enclosing object, if any.
    fn enclosing_shape(&self) -> Option<&Shape> {
        let shapes = self.shapes.as_ref()?;
        let top = *self.stack.last()?;
        match &self.tree.node_data(top).kind {
            TreeKind::Object { label: Some(label) } => shapes.shape_for(label),
            _ => None,
        }
    }
}

impl Default for TreeWriter {
    fn default() -> Self {
        TreeWriter::new()
    }
}

impl Writer for TreeWriter {
    fn write(&mut self, node: &Node) -> Result<(), StreamError> {
        if self.closed {
            return Err(StreamError::Exhausted);
        }
        self.nesting.track(node)?;

        // Draining a mismatched subtree: count nesting, keep nothing
        if self.skip_depth > 0 {
            match node.phase {
                Some(Phase::Start) => self.skip_depth += 1,
                Some(Phase::End) => self.skip_depth -= 1,
                None => {}
            }
            return Ok(());
        }

        match (node.kind, node.phase) {
            (NodeKind::Document, Some(Phase::Start)) => {
                // The root already exists; nothing to attach
            }
            (NodeKind::Document, Some(Phase::End)) => {}

            (NodeKind::Object, Some(Phase::Start)) => {
                let parent = self.top()?;
                let id = self.tree.add_object(parent, node.label());
                self.stack.push(id);
            }
            (NodeKind::Collection, Some(Phase::Start)) => {
                let parent = self.top()?;
                let id = self.tree.add_collection(parent, node.label());
                self.stack.push(id);
            }
            (NodeKind::Property, Some(Phase::Start)) => {
                let label = node
                    .label()
                    .ok_or_else(|| StreamError::malformed("property start without a label"))?;
                if let Some(shape) = self.enclosing_shape() {
                    if shape.find(label).is_none() {
                        if self.settings.is_lenient {
                            self.skip_depth = 1;
                            return Ok(());
                        }
                        return Err(StreamError::Mismatch {
                            label: label.to_owned(),
                            path: self.path(),
                        });
                    }
                }
                let parent = self.top()?;
                let id = self.tree.add_property(parent, label);
                self.stack.push(id);
            }

            (NodeKind::Object, Some(Phase::End))
            | (NodeKind::Collection, Some(Phase::End))
            | (NodeKind::Property, Some(Phase::End)) => {
                // The nesting tracker already validated the pairing
                if self.stack.len() > 1 {
                    self.stack.pop();
                }
            }

            (NodeKind::Value, _) => {
                let payload = match &node.payload {
                    Some(value) => value.clone(),
                    None => return Err(StreamError::malformed("value node without a payload")),
                };
                // Typed-member coercion check: find the property we are
                // under and its enclosing object's shape
                if let Some(shapes) = &self.shapes {
                    let mut enclosing = self.stack.iter().rev();
                    if let Some(property_id) = enclosing.next() {
                        if let TreeKind::Property { label } =
                            &self.tree.node_data(*property_id).kind
                        {
                            let object_shape = enclosing
                                .find_map(|id| match &self.tree.node_data(*id).kind {
                                    TreeKind::Object { label: Some(l) } => shapes.shape_for(l),
                                    _ => None,
                                });
                            if let Some(member) =
                                object_shape.and_then(|shape| shape.find(label))
                            {
                                if let Some(expected) = member.expected {
                                    if !payload.conforms(expected) {
                                        return Err(StreamError::Coercion {
                                            path: self.path(),
                                            expected: expected.name(),
                                            found: payload.to_string(),
                                        });
                                    }
                                }
                            }
                        }
                    }
                }
                let parent = self.top()?;
                self.tree.add_scalar(parent, payload);
            }

            (_, None) => {
                return Err(StreamError::malformed("container node without a phase"));
            }
        }
        Ok(())
    }

    fn complete(&mut self) -> Result<(), StreamError> {
        self.nesting.finish()?;
        if self.skip_depth > 0 {
            return Err(StreamError::malformed("stream ended inside a skipped subtree"));
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), StreamError> {
        self.closed = true;
        Ok(())
    }
}
