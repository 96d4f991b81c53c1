//! Positional re-framing of the table family.
//!
//! A matrix is a table with the names stripped: rows become collections,
//! property framing disappears, only values survive - each cell found by
//! position instead of label. `FlatMatrixTransform` adds the unified
//! schema and an optional leading header row naming the columns.

use crate::node::{Node, NodeKind, Phase};
use crate::stream::{Settings, StreamError, Transform};
use crate::table::{FlatTableTransform, TableTransform};
use crate::value::Value;

/// Re-label row objects as collections and drop property framing.
fn reframe(node: Node, out: &mut Vec<Node>) {
    match (node.kind, node.phase) {
        (NodeKind::Object, Some(Phase::Start)) => {
            out.push(Node::collection_start(node.label.as_deref()));
        }
        (NodeKind::Object, Some(Phase::End)) => {
            out.push(Node::collection_end());
        }
        (NodeKind::Property, _) => {}
        _ => out.push(node),
    }
}

/// Table rows re-framed positionally: `CollectionStart(RowN) Value… CollectionEnd`.
#[derive(Debug, Default)]
pub struct MatrixTransform {
    table: TableTransform,
    buf: Vec<Node>,
}

impl MatrixTransform {
    pub fn new() -> MatrixTransform {
        MatrixTransform::default()
    }
}

impl Transform for MatrixTransform {
    fn transform(&mut self, node: Node, out: &mut Vec<Node>) -> Result<(), StreamError> {
        self.table.transform(node, &mut self.buf)?;
        for n in self.buf.drain(..) {
            reframe(n, out);
        }
        Ok(())
    }

    fn complete(&mut self, out: &mut Vec<Node>) -> Result<(), StreamError> {
        self.table.complete(&mut self.buf)?;
        for n in self.buf.drain(..) {
            reframe(n, out);
        }
        Ok(())
    }
}

/// Schema-unified positional rows, optionally led by one header row.
///
/// The header row carries the canonical field names as string values and
/// is emitted exactly once, immediately before the first data row - a
/// rowless stream gets no header at all.
pub struct FlatMatrixTransform {
    flat: FlatTableTransform,
    has_headers: bool,
    header_done: bool,
    buf: Vec<Node>,
}

impl FlatMatrixTransform {
    pub fn new(settings: Settings) -> FlatMatrixTransform {
        FlatMatrixTransform {
            flat: FlatTableTransform::new(),
            has_headers: settings.has_headers,
            header_done: false,
            buf: Vec::new(),
        }
    }

    /// Explicit canonical field list; see [`FlatTableTransform::with_fields`].
    pub fn with_fields(fields: Vec<String>, settings: Settings) -> FlatMatrixTransform {
        FlatMatrixTransform {
            flat: FlatTableTransform::with_fields(fields),
            has_headers: settings.has_headers,
            header_done: false,
            buf: Vec::new(),
        }
    }

    fn drain(&mut self, out: &mut Vec<Node>) {
        for n in std::mem::take(&mut self.buf) {
            if self.has_headers && !self.header_done && n.opens(NodeKind::Object) {
                self.header_done = true;
                out.push(Node::collection_start(None));
                if let Some(schema) = self.flat.schema() {
                    for name in schema {
                        out.push(Node::value(Value::String(name.clone())));
                    }
                }
                out.push(Node::collection_end());
            }
            reframe(n, out);
        }
    }
}

impl Transform for FlatMatrixTransform {
    fn transform(&mut self, node: Node, out: &mut Vec<Node>) -> Result<(), StreamError> {
        self.flat.transform(node, &mut self.buf)?;
        self.drain(out);
        Ok(())
    }

    fn complete(&mut self, out: &mut Vec<Node>) -> Result<(), StreamError> {
        self.flat.complete(&mut self.buf)?;
        self.drain(out);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{run, VecReader, VecWriter};
    use pretty_assertions::assert_eq;

    fn int(i: i64) -> Node {
        Node::value(Value::Integer(i))
    }

    fn string(s: &str) -> Node {
        Node::value(Value::String(s.into()))
    }

    fn two_rows() -> Vec<Node> {
        vec![
            Node::document_start(),
            Node::collection_start(Some("People")),
            Node::object_start(None),
            Node::property_start("Id"),
            int(1),
            Node::property_end(),
            Node::property_start("Name"),
            string("A"),
            Node::property_end(),
            Node::object_end(),
            Node::object_start(None),
            Node::property_start("Id"),
            int(2),
            Node::property_end(),
            Node::object_end(),
            Node::collection_end(),
            Node::document_end(),
        ]
    }

    fn through<T: Transform>(nodes: Vec<Node>, mut transform: T) -> Vec<Node> {
        let mut reader = VecReader::new(nodes);
        let mut writer = VecWriter::new();
        run(&mut reader, &mut transform, &mut writer).unwrap();
        writer.into_nodes()
    }

    #[test]
    fn test_positional_drop() {
        let out = through(two_rows(), MatrixTransform::new());
        let expected = vec![
            Node::document_start(),
            Node::collection_start(Some("People")),
            Node::collection_start(Some("Row1")),
            int(1),
            string("A"),
            Node::collection_end(),
            Node::collection_start(Some("Row2")),
            int(2),
            Node::collection_end(),
            Node::collection_end(),
            Node::document_end(),
        ];
        assert_eq!(out, expected);
    }

    #[test]
    fn test_flat_matrix_pads_positionally() {
        let out = through(two_rows(), FlatMatrixTransform::new(Settings::new()));
        let expected = vec![
            Node::document_start(),
            Node::collection_start(Some("People")),
            Node::collection_start(Some("Row1")),
            int(1),
            string("A"),
            Node::collection_end(),
            Node::collection_start(Some("Row2")),
            int(2),
            Node::value(Value::Nil),
            Node::collection_end(),
            Node::collection_end(),
            Node::document_end(),
        ];
        assert_eq!(out, expected);
    }

    #[test]
    fn test_header_row_emitted_once() {
        let out = through(two_rows(), FlatMatrixTransform::new(Settings::new().with_headers()));
        let expected = vec![
            Node::document_start(),
            Node::collection_start(Some("People")),
            Node::collection_start(None),
            string("Id"),
            string("Name"),
            Node::collection_end(),
            Node::collection_start(Some("Row1")),
            int(1),
            string("A"),
            Node::collection_end(),
            Node::collection_start(Some("Row2")),
            int(2),
            Node::value(Value::Nil),
            Node::collection_end(),
            Node::collection_end(),
            Node::document_end(),
        ];
        assert_eq!(out, expected);
    }

    #[test]
    fn test_no_rows_no_header() {
        let nodes = vec![
            Node::document_start(),
            Node::collection_start(None),
            Node::collection_end(),
            Node::document_end(),
        ];
        let out = through(nodes.clone(), FlatMatrixTransform::new(Settings::new().with_headers()));
        assert_eq!(out, nodes);
    }
}
