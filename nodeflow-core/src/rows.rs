//! Row-oriented facades over readers and writers.
//!
//! Navigators hide the node stream behind one-row-at-a-time pull access;
//! creators hide it behind set-cells-then-create push access. Creators
//! open the stream lazily on the first row and guarantee a well-formed
//! close whenever `close()` runs, however early the caller stops.

use crate::node::{Node, NodeKind, Phase};
use crate::stream::{Reader, Settings, StreamError, Writer};
use crate::value::Value;

/// Pull access to a table-shaped stream, one row at a time.
///
/// Expects the shape the table family emits: an optional document
/// wrapper, a row collection, flat row objects of property/value triples.
pub struct TableNavigator<R: Reader> {
    source: R,
    fields: Vec<(String, Value)>,
    row_label: Option<String>,
}

impl<R: Reader> TableNavigator<R> {
    pub fn new(source: R) -> TableNavigator<R> {
        TableNavigator {
            source,
            fields: Vec::new(),
            row_label: None,
        }
    }

    /// Advance to the next row. `Ok(false)` once the table is exhausted.
    pub fn move_next(&mut self) -> Result<bool, StreamError> {
        self.fields.clear();
        self.row_label = None;

        // Seek the next row object, skipping wrapper nodes
        loop {
            if !self.source.advance()? {
                return Ok(false);
            }
            let node = match self.source.current() {
                Some(n) => n,
                None => return Err(StreamError::Exhausted),
            };
            match (node.kind, node.phase) {
                (NodeKind::Object, Some(Phase::Start)) => {
                    self.row_label = node.label.clone();
                    break;
                }
                (NodeKind::Document, _) | (NodeKind::Collection, _) => continue,
                _ => {
                    return Err(StreamError::malformed(
                        "table stream has content outside rows",
                    ))
                }
            }
        }

        // Consume the row body
        let mut name: Option<String> = None;
        let mut value: Option<Value> = None;
        loop {
            if !self.source.advance()? {
                return Err(StreamError::malformed("stream ended inside a row"));
            }
            let node = match self.source.current() {
                Some(n) => n,
                None => return Err(StreamError::Exhausted),
            };
            match (node.kind, node.phase) {
                (NodeKind::Property, Some(Phase::Start)) => {
                    name = node.label.clone();
                    value = None;
                }
                (NodeKind::Value, _) => {
                    value = node.payload.clone();
                }
                (NodeKind::Property, Some(Phase::End)) => {
                    let field = name
                        .take()
                        .ok_or_else(|| StreamError::malformed("property end without a name"))?;
                    self.fields.push((field, value.take().unwrap_or(Value::Nil)));
                }
                (NodeKind::Object, Some(Phase::End)) => return Ok(true),
                _ => {
                    return Err(StreamError::malformed(
                        "nested structure inside a table row",
                    ))
                }
            }
        }
    }

    /// The current row's label (`Row1`, `Row2`, …), if any.
    pub fn row_label(&self) -> Option<&str> {
        self.row_label.as_deref()
    }

    /// Field names of the current row, in emitted order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    /// Look up a field by name, case-insensitively.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    /// Look up a field by position.
    pub fn value_at(&self, index: usize) -> Option<&Value> {
        self.fields.get(index).map(|(_, value)| value)
    }

    /// Number of fields in the current row.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Pull access to a matrix-shaped stream, one row at a time.
pub struct MatrixNavigator<R: Reader> {
    source: R,
    cells: Vec<Value>,
    entered: bool,
}

impl<R: Reader> MatrixNavigator<R> {
    pub fn new(source: R) -> MatrixNavigator<R> {
        MatrixNavigator {
            source,
            cells: Vec::new(),
            entered: false,
        }
    }

    /// Advance to the next row. `Ok(false)` once the matrix is exhausted.
    pub fn move_next(&mut self) -> Result<bool, StreamError> {
        self.cells.clear();

        loop {
            if !self.source.advance()? {
                return Ok(false);
            }
            let node = match self.source.current() {
                Some(n) => n,
                None => return Err(StreamError::Exhausted),
            };
            match (node.kind, node.phase) {
                (NodeKind::Collection, Some(Phase::Start)) => {
                    if self.entered {
                        break; // a row
                    }
                    self.entered = true; // the outer wrapper
                }
                (NodeKind::Collection, Some(Phase::End)) => {
                    // outer wrapper closing
                    self.entered = false;
                }
                (NodeKind::Document, _) => continue,
                _ => {
                    return Err(StreamError::malformed(
                        "matrix stream has content outside rows",
                    ))
                }
            }
        }

        loop {
            if !self.source.advance()? {
                return Err(StreamError::malformed("stream ended inside a row"));
            }
            let node = match self.source.current() {
                Some(n) => n,
                None => return Err(StreamError::Exhausted),
            };
            match (node.kind, node.phase) {
                (NodeKind::Value, _) => {
                    self.cells.push(node.payload.clone().unwrap_or(Value::Nil));
                }
                (NodeKind::Collection, Some(Phase::End)) => return Ok(true),
                _ => {
                    return Err(StreamError::malformed(
                        "nested structure inside a matrix row",
                    ))
                }
            }
        }
    }

    /// Cell by position in the current row.
    pub fn value(&self, index: usize) -> Option<&Value> {
        self.cells.get(index)
    }

    /// Cells of the current row.
    pub fn cells(&self) -> &[Value] {
        &self.cells
    }

    /// Number of cells in the current row.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Push access producing a table-shaped stream.
///
/// The document/collection pair is emitted lazily on the first row, the
/// closing pair on `close()` - which is idempotent and also runs on drop,
/// so a creator dropped early still leaves a well-formed stream behind.
pub struct TableCreator<W: Writer> {
    writer: W,
    settings: Settings,
    cells: Vec<(String, Value)>,
    row_count: u64,
    opened: bool,
    closed: bool,
}

impl<W: Writer> TableCreator<W> {
    pub fn new(writer: W) -> TableCreator<W> {
        TableCreator::with_settings(writer, Settings::default())
    }

    pub fn with_settings(writer: W, settings: Settings) -> TableCreator<W> {
        TableCreator {
            writer,
            settings,
            cells: Vec::new(),
            row_count: 0,
            opened: false,
            closed: false,
        }
    }

    /// Set a named cell for the pending row, replacing any prior value
    /// under the same (case-folded) name.
    pub fn set(&mut self, name: &str, value: Value) {
        if let Some(cell) = self
            .cells
            .iter_mut()
            .find(|(field, _)| field.eq_ignore_ascii_case(name))
        {
            cell.1 = value;
        } else {
            self.cells.push((name.to_owned(), value));
        }
    }

    fn open(&mut self) -> Result<(), StreamError> {
        if self.opened {
            return Ok(());
        }
        self.opened = true;
        if !self.settings.is_fragment {
            self.writer.write(&Node::document_start())?;
        }
        self.writer.write(&Node::collection_start(None))
    }

    /// Emit the pending cells as the next row and clear them.
    pub fn create_row(&mut self) -> Result<(), StreamError> {
        if self.closed {
            return Err(StreamError::Exhausted);
        }
        self.open()?;
        self.row_count += 1;
        let label = format!("Row{}", self.row_count);
        self.writer.write(&Node::object_start(Some(&label)))?;
        for (name, value) in self.cells.drain(..) {
            self.writer.write(&Node::property_start(&name))?;
            self.writer.write(&Node::value(value))?;
            self.writer.write(&Node::property_end())?;
        }
        self.writer.write(&Node::object_end())
    }

    /// Close the stream. Idempotent; honors `keep_open` toward the
    /// underlying writer.
    pub fn close(&mut self) -> Result<(), StreamError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.opened {
            self.writer.write(&Node::collection_end())?;
            if !self.settings.is_fragment {
                self.writer.write(&Node::document_end())?;
            }
        }
        self.writer.complete()?;
        if !self.settings.keep_open {
            self.writer.close()?;
        }
        Ok(())
    }
}

impl<W: Writer> Drop for TableCreator<W> {
    fn drop(&mut self) {
        // Best-effort close; errors surface only through an explicit close()
        let _ = self.close();
    }
}

/// Push access producing a matrix-shaped stream.
pub struct MatrixCreator<W: Writer> {
    writer: W,
    settings: Settings,
    cells: Vec<Value>,
    row_count: u64,
    opened: bool,
    closed: bool,
}

impl<W: Writer> MatrixCreator<W> {
    pub fn new(writer: W) -> MatrixCreator<W> {
        MatrixCreator::with_settings(writer, Settings::default())
    }

    pub fn with_settings(writer: W, settings: Settings) -> MatrixCreator<W> {
        MatrixCreator {
            writer,
            settings,
            cells: Vec::new(),
            row_count: 0,
            opened: false,
            closed: false,
        }
    }

    /// Append a cell to the pending row.
    pub fn push(&mut self, value: Value) {
        self.cells.push(value);
    }

    fn open(&mut self) -> Result<(), StreamError> {
        if self.opened {
            return Ok(());
        }
        self.opened = true;
        if !self.settings.is_fragment {
            self.writer.write(&Node::document_start())?;
        }
        self.writer.write(&Node::collection_start(None))
    }

    /// Emit the pending cells as the next row and clear them.
    pub fn create_row(&mut self) -> Result<(), StreamError> {
        if self.closed {
            return Err(StreamError::Exhausted);
        }
        self.open()?;
        self.row_count += 1;
        let label = format!("Row{}", self.row_count);
        self.writer.write(&Node::collection_start(Some(&label)))?;
        for value in self.cells.drain(..) {
            self.writer.write(&Node::value(value))?;
        }
        self.writer.write(&Node::collection_end())
    }

    /// Close the stream. Idempotent; honors `keep_open`.
    pub fn close(&mut self) -> Result<(), StreamError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.opened {
            self.writer.write(&Node::collection_end())?;
            if !self.settings.is_fragment {
                self.writer.write(&Node::document_end())?;
            }
        }
        self.writer.complete()?;
        if !self.settings.keep_open {
            self.writer.close()?;
        }
        Ok(())
    }
}

impl<W: Writer> Drop for MatrixCreator<W> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
