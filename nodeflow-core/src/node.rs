//! Structural events - the unit flowing through every pipeline.
//!
//! This is a SAX-style event model: a source is rendered as a flat
//! sequence of nodes, with structure represented by start/end pairs.
//! A valid stream is well-nested (strict stack discipline); a complete
//! stream is wrapped in a `Document` pair, a fragment omits it.
//!
//! A flat table row emits:
//! ```text
//! ObjectStart("Row1")
//! PropertyStart("Id")
//! Value(Integer(1))
//! PropertyEnd
//! ObjectEnd
//! ```

use crate::value::Value;

/// The structural kind of a node.
///
/// Kind and phase are deliberately separate enums; combined queries like
/// "any document event" go through the predicate helpers on [`Node`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Outermost wrapper of a complete stream.
    Document,
    /// A named or anonymous record container.
    Object,
    /// An ordered container of items.
    Collection,
    /// A named member of an object.
    Property,
    /// An atomic scalar. Carries a payload and no phase.
    Value,
}

/// Start or end of a container node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    End,
}

/// One event in a node stream.
///
/// Container kinds (`Document`, `Object`, `Collection`, `Property`) come in
/// `Start`/`End` pairs and never carry a payload. `Value` nodes are atomic:
/// no phase, always a payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub phase: Option<Phase>,
    pub label: Option<String>,
    pub payload: Option<Value>,
}

impl Node {
    /// Generic start event for a container kind.
    pub fn start(kind: NodeKind, label: Option<&str>) -> Node {
        Node {
            kind,
            phase: Some(Phase::Start),
            label: label.map(str::to_owned),
            payload: None,
        }
    }

    /// Generic end event for a container kind.
    pub fn end(kind: NodeKind) -> Node {
        Node {
            kind,
            phase: Some(Phase::End),
            label: None,
            payload: None,
        }
    }

    pub fn document_start() -> Node {
        Node::start(NodeKind::Document, None)
    }

    pub fn document_end() -> Node {
        Node::end(NodeKind::Document)
    }

    pub fn object_start(label: Option<&str>) -> Node {
        Node::start(NodeKind::Object, label)
    }

    pub fn object_end() -> Node {
        Node::end(NodeKind::Object)
    }

    pub fn collection_start(label: Option<&str>) -> Node {
        Node::start(NodeKind::Collection, label)
    }

    pub fn collection_end() -> Node {
        Node::end(NodeKind::Collection)
    }

    /// Property starts are the one place a label is required.
    pub fn property_start(label: &str) -> Node {
        Node::start(NodeKind::Property, Some(label))
    }

    pub fn property_end() -> Node {
        Node::end(NodeKind::Property)
    }

    /// Atomic value event.
    pub fn value(payload: Value) -> Node {
        Node {
            kind: NodeKind::Value,
            phase: None,
            label: None,
            payload: Some(payload),
        }
    }

    /// Check if this is a start event of any container kind.
    #[inline]
    pub fn is_start(&self) -> bool {
        self.phase == Some(Phase::Start)
    }

    /// Check if this is an end event of any container kind.
    #[inline]
    pub fn is_end(&self) -> bool {
        self.phase == Some(Phase::End)
    }

    /// Check if this is an atomic value event.
    #[inline]
    pub fn is_value(&self) -> bool {
        self.kind == NodeKind::Value
    }

    /// Check if this is a container kind (everything except `Value`).
    #[inline]
    pub fn is_container(&self) -> bool {
        self.kind != NodeKind::Value
    }

    /// Check if this event opens the given kind.
    #[inline]
    pub fn opens(&self, kind: NodeKind) -> bool {
        self.kind == kind && self.phase == Some(Phase::Start)
    }

    /// Check if this event closes the given kind.
    #[inline]
    pub fn closes(&self, kind: NodeKind) -> bool {
        self.kind == kind && self.phase == Some(Phase::End)
    }

    /// Get the label as a str, if present.
    #[inline]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Get the payload, if this is a value event.
    #[inline]
    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }
}
