//! Delimited-text adapter for matrix streams.
//!
//! The matrix family promises fixed-column output; this adapter is the
//! concrete consumer/producer proving it, over in-memory text. One text
//! record per row, cells separated by a configurable ASCII byte, quoted
//! with `"` (doubled to escape) when the content would not survive bare.
//! Bare cells are typed syntactically on the way back in.

use unicode_xid::UnicodeXID;

use crate::node::{Node, NodeKind, Phase};
use crate::stream::{Nesting, Reader, Settings, StreamError, Writer};
use crate::value::Value;

const QUOTE: u8 = b'"';

/// Writer rendering a matrix-shaped stream as delimited text.
#[derive(Debug)]
pub struct DelimWriter {
    out: String,
    sep: u8,
    nesting: Nesting,
    depth: u32,
    first_cell: bool,
    closed: bool,
}

impl DelimWriter {
    pub fn new() -> DelimWriter {
        DelimWriter::with_separator(b',')
    }

    pub fn with_separator(sep: u8) -> DelimWriter {
        DelimWriter {
            out: String::new(),
            sep,
            nesting: Nesting::new(),
            depth: 0,
            first_cell: true,
            closed: false,
        }
    }

    /// Text rendered so far.
    pub fn text(&self) -> &str {
        &self.out
    }

    pub fn into_text(self) -> String {
        self.out
    }

    fn push_cell(&mut self, value: &Value) {
        if !self.first_cell {
            self.out.push(self.sep as char);
        }
        self.first_cell = false;

        match value {
            Value::String(s) | Value::Raw(s) => {
                if bare_safe(s, self.sep) {
                    self.out.push_str(s);
                } else {
                    self.out.push(QUOTE as char);
                    for ch in s.chars() {
                        if ch == '"' {
                            self.out.push('"');
                        }
                        self.out.push(ch);
                    }
                    self.out.push(QUOTE as char);
                }
            }
            other => {
                // Nil renders empty; numbers, bools and dates re-type
                // themselves on the way back in
                self.out.push_str(&other.to_string());
            }
        }
    }
}

/// A string cell can go out unquoted only if it scans clean and reads
/// back as a string: identifier-shaped and not a keyword literal.
fn bare_safe(text: &str, sep: u8) -> bool {
    let bytes = text.as_bytes();
    if memchr::memchr3(sep, QUOTE, b'\n', bytes).is_some()
        || memchr::memchr(b'\r', bytes).is_some()
    {
        return false;
    }
    let mut chars = text.chars();
    match chars.next() {
        Some(first) if first.is_xid_start() => {}
        _ => return false,
    }
    if !chars.all(|c| c.is_xid_continue()) {
        return false;
    }
    matches!(Value::parse(text), Value::String(_))
}

impl Default for DelimWriter {
    fn default() -> Self {
        DelimWriter::new()
    }
}

impl Writer for DelimWriter {
    fn write(&mut self, node: &Node) -> Result<(), StreamError> {
        if self.closed {
            return Err(StreamError::Exhausted);
        }
        self.nesting.track(node)?;

        match (node.kind, node.phase) {
            (NodeKind::Document, _) => {}
            (NodeKind::Collection, Some(Phase::Start)) => {
                self.depth += 1;
                match self.depth {
                    1 => {}
                    2 => self.first_cell = true,
                    _ => {
                        return Err(StreamError::malformed(
                            "matrix rows are flat; nested collection in a row",
                        ))
                    }
                }
            }
            (NodeKind::Collection, Some(Phase::End)) => {
                if self.depth == 2 {
                    self.out.push('\n');
                }
                self.depth -= 1;
            }
            (NodeKind::Value, _) => {
                if self.depth != 2 {
                    return Err(StreamError::malformed("value outside a matrix row"));
                }
                let payload = match &node.payload {
                    Some(value) => value,
                    None => return Err(StreamError::malformed("value node without a payload")),
                };
                self.push_cell(payload);
            }
            _ => {
                return Err(StreamError::malformed(
                    "matrix stream expected; found object/property framing",
                ))
            }
        }
        Ok(())
    }

    fn complete(&mut self) -> Result<(), StreamError> {
        self.nesting.finish()
    }

    fn close(&mut self) -> Result<(), StreamError> {
        self.closed = true;
        Ok(())
    }
}

enum DelimState {
    Preamble,
    Rows,
    Postamble,
    Done,
}

/// Reader producing a matrix-shaped node stream from delimited text.
///
/// With `has_headers`, the first record is consumed as the column names
/// (exposed via [`DelimReader::headers`]) rather than emitted as a row.
pub struct DelimReader {
    text: String,
    pos: usize,
    sep: u8,
    settings: Settings,
    state: DelimState,
    pending: std::collections::VecDeque<Node>,
    headers: Option<Vec<String>>,
    row_count: u64,
    current: Option<Node>,
}

impl DelimReader {
    pub fn new(text: impl Into<String>) -> DelimReader {
        DelimReader::with_settings(text, Settings::default())
    }

    pub fn with_settings(text: impl Into<String>, settings: Settings) -> DelimReader {
        DelimReader {
            text: text.into(),
            pos: 0,
            sep: b',',
            settings,
            state: DelimState::Preamble,
            pending: std::collections::VecDeque::new(),
            headers: None,
            row_count: 0,
            current: None,
        }
    }

    pub fn with_separator(mut self, sep: u8) -> DelimReader {
        self.sep = sep;
        self
    }

    /// Column names consumed from the first record, once read.
    pub fn headers(&self) -> Option<&[String]> {
        self.headers.as_deref()
    }

    /// Parse the next record, or `None` at end of input.
    fn parse_record(&mut self) -> Result<Option<Vec<Value>>, StreamError> {
        let bytes = self.text.as_bytes();
        if self.pos >= bytes.len() {
            return Ok(None);
        }
        let mut cells = Vec::new();
        loop {
            if bytes.get(self.pos) == Some(&QUOTE) {
                let (content, next) = parse_quoted(&self.text, self.pos)?;
                self.pos = next;
                cells.push(Value::String(content));
            } else {
                let start = self.pos;
                let end = memchr::memchr2(self.sep, b'\n', &bytes[start..])
                    .map(|offset| start + offset)
                    .unwrap_or(bytes.len());
                let mut cell = &self.text[start..end];
                if cell.ends_with('\r') {
                    cell = &cell[..cell.len() - 1];
                }
                self.pos = end;
                cells.push(Value::parse(cell));
            }

            if self.pos >= bytes.len() {
                break;
            }
            if bytes[self.pos] == self.sep {
                self.pos += 1;
            } else if bytes[self.pos] == b'\n' {
                self.pos += 1;
                break;
            } else {
                return Err(StreamError::malformed("unexpected content after a quoted cell"));
            }
        }
        Ok(Some(cells))
    }

    fn next_node(&mut self) -> Result<Option<Node>, StreamError> {
        loop {
            if let Some(node) = self.pending.pop_front() {
                return Ok(Some(node));
            }
            match self.state {
                DelimState::Preamble => {
                    if !self.settings.is_fragment {
                        self.pending.push_back(Node::document_start());
                    }
                    self.pending.push_back(Node::collection_start(None));
                    if self.settings.has_headers {
                        if let Some(cells) = self.parse_record()? {
                            self.headers =
                                Some(cells.iter().map(|cell| cell.to_string()).collect());
                        }
                    }
                    self.state = DelimState::Rows;
                }
                DelimState::Rows => match self.parse_record()? {
                    Some(cells) => {
                        self.row_count += 1;
                        self.pending
                            .push_back(Node::collection_start(Some(&format!(
                                "Row{}",
                                self.row_count
                            ))));
                        for cell in cells {
                            self.pending.push_back(Node::value(cell));
                        }
                        self.pending.push_back(Node::collection_end());
                    }
                    None => self.state = DelimState::Postamble,
                },
                DelimState::Postamble => {
                    self.pending.push_back(Node::collection_end());
                    if !self.settings.is_fragment {
                        self.pending.push_back(Node::document_end());
                    }
                    self.state = DelimState::Done;
                }
                DelimState::Done => return Ok(None),
            }
        }
    }
}

/// Quoted cell starting at `start` (on the opening `"`); `""` is an
/// escaped quote. Returns the content and the position just past the
/// closing quote.
fn parse_quoted(text: &str, start: usize) -> Result<(String, usize), StreamError> {
    let bytes = text.as_bytes();
    let mut content = String::new();
    let mut i = start + 1;
    loop {
        match memchr::memchr(QUOTE, &bytes[i..]) {
            Some(offset) => {
                let at = i + offset;
                content.push_str(&text[i..at]);
                if bytes.get(at + 1) == Some(&QUOTE) {
                    content.push('"');
                    i = at + 2;
                } else {
                    return Ok((content, at + 1));
                }
            }
            None => return Err(StreamError::malformed("unclosed quote")),
        }
    }
}

impl Reader for DelimReader {
    fn advance(&mut self) -> Result<bool, StreamError> {
        self.current = self.next_node()?;
        Ok(self.current.is_some())
    }

    fn current(&self) -> Option<&Node> {
        self.current.as_ref()
    }
}
