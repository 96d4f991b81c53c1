//! Row detection and schema unification - the flattening core.
//!
//! `TableTransform` turns an arbitrarily nested stream into a sequence of
//! uniformly-shaped row objects, synthesizing row boundaries where the
//! source did not make them explicit. `FlatTableTransform` layers schema
//! unification on top so every row comes out with identical field
//! cardinality and order - what any fixed-column consumer needs.

use crate::node::{Node, NodeKind, Phase};
use crate::stream::{Nesting, StreamError, Transform};
use crate::value::Value;

/// Converts a nested object-graph stream into a stream of rows.
///
/// The outermost collection becomes the output collection wrapper; each
/// container opened directly inside it becomes a row object labeled
/// `Row1, Row2, …`. Deeper structure flattens into dotted field names
/// (`parent.child`) instead of nested rows; values without an enclosing
/// property get `Field1, Field2, …` names, numbered per row.
///
/// Content outside any collection passes through verbatim - row
/// semantics only activate inside the row collection.
#[derive(Debug, Default)]
pub struct TableTransform {
    nesting: Nesting,
    collection_depth: u32,
    row_depth: u32,
    row_count: u64,
    field_stack: Vec<String>,
    unnamed_fields: u32,
}

impl TableTransform {
    pub fn new() -> TableTransform {
        TableTransform::default()
    }

    /// Rows emitted so far.
    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    fn open_row(&mut self, out: &mut Vec<Node>) {
        self.row_count += 1;
        self.unnamed_fields = 0;
        out.push(Node::object_start(Some(&format!("Row{}", self.row_count))));
    }
}

impl Transform for TableTransform {
    fn transform(&mut self, node: Node, out: &mut Vec<Node>) -> Result<(), StreamError> {
        self.nesting.track(&node)?;

        match (node.kind, node.phase) {
            (NodeKind::Document, Some(_)) => out.push(node),

            (NodeKind::Collection, Some(Phase::Start)) => {
                self.collection_depth += 1;
                if self.collection_depth == 1 {
                    // The row collection itself, re-emitted verbatim
                    out.push(node);
                } else if self.row_depth == 0 {
                    self.open_row(out);
                    self.row_depth = 1;
                } else {
                    self.row_depth += 1;
                }
            }
            (NodeKind::Collection, Some(Phase::End)) => {
                self.collection_depth -= 1;
                if self.row_depth == 0 {
                    out.push(node);
                } else if self.row_depth == 1 {
                    out.push(Node::object_end());
                    self.row_depth = 0;
                } else {
                    self.row_depth -= 1;
                }
            }

            (NodeKind::Object, Some(Phase::Start)) => {
                if self.collection_depth == 0 {
                    out.push(node);
                } else if self.row_depth == 0 {
                    self.open_row(out);
                    self.row_depth = 1;
                } else {
                    self.row_depth += 1;
                }
            }
            (NodeKind::Object, Some(Phase::End)) => {
                if self.collection_depth == 0 {
                    out.push(node);
                } else if self.row_depth == 1 {
                    out.push(Node::object_end());
                    self.row_depth = 0;
                } else {
                    self.row_depth -= 1;
                }
            }

            (NodeKind::Property, Some(Phase::Start)) => {
                if self.collection_depth == 0 {
                    out.push(node);
                } else if self.row_depth == 0 {
                    return Err(StreamError::malformed(
                        "property directly inside a collection",
                    ));
                } else {
                    match node.label {
                        Some(label) => self.field_stack.push(label),
                        None => {
                            return Err(StreamError::malformed("property start without a label"))
                        }
                    }
                }
            }
            (NodeKind::Property, Some(Phase::End)) => {
                if self.collection_depth == 0 {
                    out.push(node);
                } else {
                    self.field_stack.pop();
                }
            }

            (NodeKind::Value, Some(_)) => {
                return Err(StreamError::malformed("value node with a phase"));
            }
            (NodeKind::Value, None) => {
                if self.collection_depth == 0 {
                    out.push(node);
                } else if self.row_depth == 0 {
                    // Bare scalar in the row collection: its own one-field row
                    self.open_row(out);
                    out.push(Node::property_start("Field1"));
                    out.push(node);
                    out.push(Node::property_end());
                    out.push(Node::object_end());
                } else {
                    let name = if self.field_stack.is_empty() {
                        self.unnamed_fields += 1;
                        format!("Field{}", self.unnamed_fields)
                    } else {
                        self.field_stack.join(".")
                    };
                    out.push(Node::property_start(&name));
                    out.push(node);
                    out.push(Node::property_end());
                }
            }

            // Container kinds always carry a phase; a bare container
            // event is not a valid node.
            (_, None) => {
                return Err(StreamError::malformed("container node without a phase"));
            }
        }
        Ok(())
    }

    fn complete(&mut self, _out: &mut Vec<Node>) -> Result<(), StreamError> {
        self.nesting.finish()
    }
}

/// One buffered row: fields in first-seen order plus the open property.
#[derive(Debug, Default)]
struct RowBuffer {
    label: Option<String>,
    fields: Vec<(String, Value)>,
    name: Option<String>,
    value: Option<Value>,
}

/// Schema-unifying wrapper over [`TableTransform`].
///
/// Buffers each row, then re-emits it projected onto the canonical
/// schema: the explicit field list if one was supplied at construction,
/// otherwise the first row's field set in first-seen order. Lookup is
/// case-insensitive; fields missing from a row are padded with
/// `Value::Nil`. Fields outside the canonical schema are dropped -
/// callers expecting heterogeneous rows must supply the field list
/// themselves (see [`FlatTableTransform::with_fields`]).
pub struct FlatTableTransform {
    table: TableTransform,
    filter: Option<Box<dyn Fn(&str) -> bool>>,
    schema: Option<Vec<String>>,
    collection_depth: u32,
    row: Option<RowBuffer>,
    buf: Vec<Node>,
}

impl FlatTableTransform {
    /// Schema discovered from the first row.
    pub fn new() -> FlatTableTransform {
        FlatTableTransform {
            table: TableTransform::new(),
            filter: None,
            schema: None,
            collection_depth: 0,
            row: None,
            buf: Vec::new(),
        }
    }

    /// Explicit canonical field list: emitted order is permanent and rows
    /// lacking a field are padded. This is the required configuration when
    /// later rows may introduce fields the first row does not have.
    pub fn with_fields(fields: Vec<String>) -> FlatTableTransform {
        let mut flat = FlatTableTransform::new();
        flat.schema = Some(fields);
        flat
    }

    /// Schema discovered from the first row, restricted to names the
    /// predicate accepts.
    pub fn with_filter(filter: impl Fn(&str) -> bool + 'static) -> FlatTableTransform {
        let mut flat = FlatTableTransform::new();
        flat.filter = Some(Box::new(filter));
        flat
    }

    /// The canonical schema, once resolved.
    pub fn schema(&self) -> Option<&[String]> {
        self.schema.as_deref()
    }

    fn absorb(&mut self, node: Node, out: &mut Vec<Node>) -> Result<(), StreamError> {
        if let Some(row) = &mut self.row {
            match (node.kind, node.phase) {
                (NodeKind::Property, Some(Phase::Start)) => {
                    row.name = node.label;
                    row.value = None;
                }
                (NodeKind::Value, _) => {
                    row.value = node.payload;
                }
                (NodeKind::Property, Some(Phase::End)) => {
                    let name = row
                        .name
                        .take()
                        .ok_or_else(|| StreamError::malformed("property end without a name"))?;
                    let value = row.value.take().unwrap_or(Value::Nil);
                    row.fields.push((name, value));
                }
                (NodeKind::Object, Some(Phase::End)) => {
                    let row = match self.row.take() {
                        Some(r) => r,
                        None => return Err(StreamError::malformed("row end without a row")),
                    };
                    self.emit_row(row, out);
                }
                _ => {
                    return Err(StreamError::malformed(
                        "nested structure inside a flattened row",
                    ));
                }
            }
            return Ok(());
        }

        match (node.kind, node.phase) {
            (NodeKind::Collection, Some(Phase::Start)) => {
                self.collection_depth += 1;
                out.push(node);
            }
            (NodeKind::Collection, Some(Phase::End)) => {
                self.collection_depth -= 1;
                out.push(node);
            }
            (NodeKind::Object, Some(Phase::Start)) if self.collection_depth > 0 => {
                self.row = Some(RowBuffer {
                    label: node.label,
                    ..RowBuffer::default()
                });
            }
            _ => out.push(node),
        }
        Ok(())
    }

    fn emit_row(&mut self, row: RowBuffer, out: &mut Vec<Node>) {
        let filter = &self.filter;
        let schema = self.schema.get_or_insert_with(|| {
            row.fields
                .iter()
                .map(|(name, _)| name.clone())
                .filter(|name| filter.as_ref().map_or(true, |keep| keep(name)))
                .collect()
        });

        out.push(Node::object_start(row.label.as_deref()));
        for name in schema.iter() {
            let value = row
                .fields
                .iter()
                .find(|(field, _)| field.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.clone())
                .unwrap_or(Value::Nil);
            out.push(Node::property_start(name));
            out.push(Node::value(value));
            out.push(Node::property_end());
        }
        out.push(Node::object_end());
    }
}

impl Default for FlatTableTransform {
    fn default() -> Self {
        FlatTableTransform::new()
    }
}

impl Transform for FlatTableTransform {
    fn transform(&mut self, node: Node, out: &mut Vec<Node>) -> Result<(), StreamError> {
        self.table.transform(node, &mut self.buf)?;
        let staged: Vec<Node> = self.buf.drain(..).collect();
        for n in staged {
            self.absorb(n, out)?;
        }
        Ok(())
    }

    fn complete(&mut self, out: &mut Vec<Node>) -> Result<(), StreamError> {
        self.table.complete(&mut self.buf)?;
        let staged: Vec<Node> = self.buf.drain(..).collect();
        for n in staged {
            self.absorb(n, out)?;
        }
        if self.row.is_some() {
            return Err(StreamError::malformed("stream ended inside a row"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{run, VecReader, VecWriter};
    use pretty_assertions::assert_eq;

    fn table(nodes: Vec<Node>) -> Vec<Node> {
        let mut reader = VecReader::new(nodes);
        let mut transform = TableTransform::new();
        let mut writer = VecWriter::new();
        run(&mut reader, &mut transform, &mut writer).unwrap();
        writer.into_nodes()
    }

    fn flat(nodes: Vec<Node>, mut transform: FlatTableTransform) -> Vec<Node> {
        let mut reader = VecReader::new(nodes);
        let mut writer = VecWriter::new();
        run(&mut reader, &mut transform, &mut writer).unwrap();
        writer.into_nodes()
    }

    fn int(i: i64) -> Node {
        Node::value(Value::Integer(i))
    }

    fn string(s: &str) -> Node {
        Node::value(Value::String(s.into()))
    }

    fn field(name: &str, value: Node) -> Vec<Node> {
        vec![Node::property_start(name), value, Node::property_end()]
    }

    fn two_people() -> Vec<Node> {
        let mut nodes = vec![Node::document_start(), Node::collection_start(Some("People"))];
        nodes.push(Node::object_start(Some("Person")));
        nodes.extend(field("Id", int(1)));
        nodes.extend(field("Name", string("A")));
        nodes.push(Node::object_end());
        nodes.push(Node::object_start(Some("Person")));
        nodes.extend(field("Id", int(2)));
        nodes.push(Node::object_end());
        nodes.push(Node::collection_end());
        nodes.push(Node::document_end());
        nodes
    }

    #[test]
    fn test_rows_synthesized_and_labeled() {
        let out = table(two_people());
        let mut expected = vec![Node::document_start(), Node::collection_start(Some("People"))];
        expected.push(Node::object_start(Some("Row1")));
        expected.extend(field("Id", int(1)));
        expected.extend(field("Name", string("A")));
        expected.push(Node::object_end());
        expected.push(Node::object_start(Some("Row2")));
        expected.extend(field("Id", int(2)));
        expected.push(Node::object_end());
        expected.push(Node::collection_end());
        expected.push(Node::document_end());
        assert_eq!(out, expected);
    }

    #[test]
    fn test_nested_properties_flatten_to_dotted_paths() {
        let mut nodes = vec![Node::document_start(), Node::collection_start(None)];
        nodes.push(Node::object_start(None));
        nodes.push(Node::property_start("Address"));
        nodes.push(Node::object_start(Some("Addr")));
        nodes.extend(field("City", string("Oslo")));
        nodes.push(Node::object_end());
        nodes.push(Node::property_end());
        nodes.push(Node::object_end());
        nodes.push(Node::collection_end());
        nodes.push(Node::document_end());

        let out = table(nodes);
        let mut expected = vec![Node::document_start(), Node::collection_start(None)];
        expected.push(Node::object_start(Some("Row1")));
        expected.extend(field("Address.City", string("Oslo")));
        expected.push(Node::object_end());
        expected.push(Node::collection_end());
        expected.push(Node::document_end());
        assert_eq!(out, expected);
    }

    #[test]
    fn test_bare_scalar_becomes_one_field_row() {
        let nodes = vec![
            Node::document_start(),
            Node::collection_start(None),
            int(42),
            Node::collection_end(),
            Node::document_end(),
        ];
        let out = table(nodes);
        let mut expected = vec![Node::document_start(), Node::collection_start(None)];
        expected.push(Node::object_start(Some("Row1")));
        expected.extend(field("Field1", int(42)));
        expected.push(Node::object_end());
        expected.push(Node::collection_end());
        expected.push(Node::document_end());
        assert_eq!(out, expected);
    }

    #[test]
    fn test_unnamed_fields_numbered_per_row() {
        let mut nodes = vec![Node::document_start(), Node::collection_start(None)];
        nodes.push(Node::object_start(None));
        nodes.push(int(1));
        nodes.push(int(2));
        nodes.push(Node::object_end());
        nodes.push(Node::object_start(None));
        nodes.push(int(3));
        nodes.push(Node::object_end());
        nodes.push(Node::collection_end());
        nodes.push(Node::document_end());

        let out = table(nodes);
        let mut expected = vec![Node::document_start(), Node::collection_start(None)];
        expected.push(Node::object_start(Some("Row1")));
        expected.extend(field("Field1", int(1)));
        expected.extend(field("Field2", int(2)));
        expected.push(Node::object_end());
        expected.push(Node::object_start(Some("Row2")));
        expected.extend(field("Field1", int(3)));
        expected.push(Node::object_end());
        expected.push(Node::collection_end());
        expected.push(Node::document_end());
        assert_eq!(out, expected);
    }

    #[test]
    fn test_nested_collection_is_a_row_not_a_table() {
        let nodes = vec![
            Node::document_start(),
            Node::collection_start(None),
            Node::collection_start(None),
            int(1),
            int(2),
            Node::collection_end(),
            Node::collection_end(),
            Node::document_end(),
        ];
        let out = table(nodes);
        let mut expected = vec![Node::document_start(), Node::collection_start(None)];
        expected.push(Node::object_start(Some("Row1")));
        expected.extend(field("Field1", int(1)));
        expected.extend(field("Field2", int(2)));
        expected.push(Node::object_end());
        expected.push(Node::collection_end());
        expected.push(Node::document_end());
        assert_eq!(out, expected);
    }

    #[test]
    fn test_unbalanced_stream_raises() {
        let nodes = vec![
            Node::document_start(),
            Node::collection_start(None),
            Node::object_start(None),
            // missing object end
            Node::collection_end(),
            Node::document_end(),
        ];
        let mut reader = VecReader::new(nodes);
        let mut transform = TableTransform::new();
        let mut writer = VecWriter::new();
        let err = run(&mut reader, &mut transform, &mut writer).unwrap_err();
        assert!(matches!(err, StreamError::Malformed { .. }));
    }

    #[test]
    fn test_truncated_stream_raises_at_complete() {
        let nodes = vec![Node::document_start(), Node::collection_start(None)];
        let mut reader = VecReader::new(nodes);
        let mut transform = TableTransform::new();
        let mut writer = VecWriter::new();
        let err = run(&mut reader, &mut transform, &mut writer).unwrap_err();
        assert!(matches!(err, StreamError::Malformed { .. }));
    }

    #[test]
    fn test_schema_padding_from_first_row() {
        let out = flat(two_people(), FlatTableTransform::new());
        let mut expected = vec![Node::document_start(), Node::collection_start(Some("People"))];
        expected.push(Node::object_start(Some("Row1")));
        expected.extend(field("Id", int(1)));
        expected.extend(field("Name", string("A")));
        expected.push(Node::object_end());
        expected.push(Node::object_start(Some("Row2")));
        expected.extend(field("Id", int(2)));
        expected.extend(field("Name", Node::value(Value::Nil)));
        expected.push(Node::object_end());
        expected.push(Node::collection_end());
        expected.push(Node::document_end());
        assert_eq!(out, expected);
    }

    #[test]
    fn test_explicit_field_list_honored() {
        let out = flat(
            two_people(),
            FlatTableTransform::with_fields(vec!["Name".into(), "Id".into()]),
        );
        let mut expected = vec![Node::document_start(), Node::collection_start(Some("People"))];
        expected.push(Node::object_start(Some("Row1")));
        expected.extend(field("Name", string("A")));
        expected.extend(field("Id", int(1)));
        expected.push(Node::object_end());
        expected.push(Node::object_start(Some("Row2")));
        expected.extend(field("Name", Node::value(Value::Nil)));
        expected.extend(field("Id", int(2)));
        expected.push(Node::object_end());
        expected.push(Node::collection_end());
        expected.push(Node::document_end());
        assert_eq!(out, expected);
    }

    #[test]
    fn test_field_lookup_is_case_insensitive() {
        let mut nodes = vec![Node::document_start(), Node::collection_start(None)];
        nodes.push(Node::object_start(None));
        nodes.extend(field("id", int(1)));
        nodes.push(Node::object_end());
        nodes.push(Node::object_start(None));
        nodes.extend(field("ID", int(2)));
        nodes.push(Node::object_end());
        nodes.push(Node::collection_end());
        nodes.push(Node::document_end());

        let out = flat(nodes, FlatTableTransform::new());
        // Schema spelling comes from the first row; row 2 matches by folding
        let mut expected = vec![Node::document_start(), Node::collection_start(None)];
        expected.push(Node::object_start(Some("Row1")));
        expected.extend(field("id", int(1)));
        expected.push(Node::object_end());
        expected.push(Node::object_start(Some("Row2")));
        expected.extend(field("id", int(2)));
        expected.push(Node::object_end());
        expected.push(Node::collection_end());
        expected.push(Node::document_end());
        assert_eq!(out, expected);
    }

    #[test]
    fn test_filter_restricts_discovered_schema() {
        let out = flat(
            two_people(),
            FlatTableTransform::with_filter(|name| name != "Name"),
        );
        let mut expected = vec![Node::document_start(), Node::collection_start(Some("People"))];
        expected.push(Node::object_start(Some("Row1")));
        expected.extend(field("Id", int(1)));
        expected.push(Node::object_end());
        expected.push(Node::object_start(Some("Row2")));
        expected.extend(field("Id", int(2)));
        expected.push(Node::object_end());
        expected.push(Node::collection_end());
        expected.push(Node::document_end());
        assert_eq!(out, expected);
    }

    /// Build a balanced-by-construction table input from a command tape.
    fn synth_stream(cmds: &[u8]) -> Vec<Node> {
        let mut nodes = vec![Node::document_start(), Node::collection_start(None)];
        for (i, c) in cmds.iter().enumerate() {
            let i = i as i64;
            match c % 4 {
                0 => nodes.push(int(i)),
                1 => {
                    nodes.push(Node::object_start(None));
                    nodes.extend(field("A", int(i)));
                    nodes.push(Node::object_end());
                }
                2 => {
                    nodes.push(Node::object_start(None));
                    nodes.push(Node::property_start("Outer"));
                    nodes.push(Node::object_start(None));
                    nodes.extend(field("Inner", int(i)));
                    nodes.push(Node::object_end());
                    nodes.push(Node::property_end());
                    nodes.push(int(i));
                    nodes.push(Node::object_end());
                }
                _ => {
                    nodes.push(Node::collection_start(None));
                    nodes.push(int(i));
                    nodes.push(int(i + 1));
                    nodes.push(Node::collection_end());
                }
            }
        }
        nodes.push(Node::collection_end());
        nodes.push(Node::document_end());
        nodes
    }

    proptest::proptest! {
        #[test]
        fn prop_balanced_streams_flatten(cmds in proptest::collection::vec(0u8..8, 0..32)) {
            let nodes = synth_stream(&cmds);

            let mut nesting = crate::stream::Nesting::new();
            for node in &nodes {
                proptest::prop_assert!(nesting.track(node).is_ok());
            }
            proptest::prop_assert!(nesting.finish().is_ok());

            let mut reader = VecReader::new(nodes);
            let mut transform = FlatTableTransform::new();
            let mut writer = VecWriter::new();
            proptest::prop_assert!(run(&mut reader, &mut transform, &mut writer).is_ok());
        }

        #[test]
        fn prop_missing_end_raises(
            cmds in proptest::collection::vec(0u8..8, 1..24),
            pick in proptest::prelude::any::<proptest::sample::Index>(),
        ) {
            let nodes = synth_stream(&cmds);
            let ends: Vec<usize> = nodes
                .iter()
                .enumerate()
                .filter(|(_, n)| n.is_end())
                .map(|(i, _)| i)
                .collect();
            let mut mutated = nodes.clone();
            mutated.remove(ends[pick.index(ends.len())]);

            let mut reader = VecReader::new(mutated);
            let mut transform = TableTransform::new();
            let mut writer = VecWriter::new();
            proptest::prop_assert!(run(&mut reader, &mut transform, &mut writer).is_err());
        }
    }

    #[test]
    fn test_out_of_schema_fields_dropped() {
        let mut nodes = vec![Node::document_start(), Node::collection_start(None)];
        nodes.push(Node::object_start(None));
        nodes.extend(field("Id", int(1)));
        nodes.push(Node::object_end());
        nodes.push(Node::object_start(None));
        nodes.extend(field("Id", int(2)));
        nodes.extend(field("Extra", string("x")));
        nodes.push(Node::object_end());
        nodes.push(Node::collection_end());
        nodes.push(Node::document_end());

        let out = flat(nodes, FlatTableTransform::new());
        let row2: Vec<&Node> = out
            .iter()
            .skip_while(|n| n.label() != Some("Row2"))
            .collect();
        assert!(row2.iter().all(|n| n.label() != Some("Extra")));
    }
}
