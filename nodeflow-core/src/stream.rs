//! Reader/Writer/Transform contracts, settings, errors and the
//! in-memory endpoints every pipeline is built from.
//!
//! Execution is single-threaded and cooperative: a `Reader` is pulled,
//! a `Writer` is pushed, a `Transform` sits between them and may buffer.
//! Nothing here materializes a whole stream eagerly; `run` moves one
//! node at a time.
//!
//! ```text
//! Reader            Transform             Writer
//!   │                   │                    │
//!   │──advance/current─▶│                    │
//!   │                   │──transform(node)──▶│ (zero or more out nodes)
//!   │   (exhausted)     │──complete()───────▶│ (deferred flush)
//! ```

use crate::node::{Node, NodeKind, Phase};

/// Error raised by any stage of a pipeline.
///
/// Raised synchronously at the point of detection; there are no retries
/// at this layer.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamError {
    /// Unbalanced start/end nesting, or content outside any container.
    /// The pipeline never repairs nesting.
    Malformed { detail: String },

    /// A writer saw a property label with no match in the expected shape.
    /// Skipped (with a balanced drain) under lenient mode.
    Mismatch { label: String, path: String },

    /// A value payload cannot stand in for the target's expected type.
    Coercion {
        path: String,
        expected: &'static str,
        found: String,
    },

    /// Advancing or writing through an endpoint that already finished.
    Exhausted,
}

impl StreamError {
    pub fn malformed(detail: impl Into<String>) -> StreamError {
        StreamError::Malformed { detail: detail.into() }
    }
}

impl std::fmt::Display for StreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamError::Malformed { detail } => write!(f, "malformed stream: {}", detail),
            StreamError::Mismatch { label, path } => {
                write!(f, "no member matches '{}' at {}", label, path)
            }
            StreamError::Coercion { path, expected, found } => {
                write!(f, "cannot coerce {} to {} at {}", found, expected, path)
            }
            StreamError::Exhausted => f.write_str("endpoint already finished"),
        }
    }
}

impl std::error::Error for StreamError {}

/// Options consulted by pipeline stages.
///
/// All off by default. Stages ignore options they do not recognize.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Settings {
    /// Emit/consume one leading header row in matrix transforms.
    pub has_headers: bool,
    /// Omit the Document wrapper so streams can be spliced together.
    pub is_fragment: bool,
    /// Skip unmatched structure at writers instead of failing.
    pub is_lenient: bool,
    /// Leave the underlying resource open on close().
    pub keep_open: bool,
}

impl Settings {
    pub fn new() -> Settings {
        Settings::default()
    }

    pub fn with_headers(mut self) -> Settings {
        self.has_headers = true;
        self
    }

    pub fn fragment(mut self) -> Settings {
        self.is_fragment = true;
        self
    }

    pub fn lenient(mut self) -> Settings {
        self.is_lenient = true;
        self
    }

    pub fn keeping_open(mut self) -> Settings {
        self.keep_open = true;
        self
    }
}

/// Pull-based, single-pass producer of an ordered node sequence.
///
/// Forward-only and single-consumer: `current()` is `None` until the
/// first successful `advance()` and after exhaustion. Implementations
/// must be lazy - one `advance()` produces at most the work for one node.
pub trait Reader {
    /// Move to the next node. `Ok(false)` once the stream is exhausted.
    fn advance(&mut self) -> Result<bool, StreamError>;

    /// The node the cursor is on, if any.
    fn current(&self) -> Option<&Node>;
}

/// Push-based, single-pass consumer that materializes a target.
pub trait Writer {
    /// Accept the next node of a valid stream.
    fn write(&mut self, node: &Node) -> Result<(), StreamError>;

    /// Flush: the stream is over, finish the target. Balance is checked here.
    fn complete(&mut self) -> Result<(), StreamError>;

    /// Release the underlying resource. Honors `keep_open` where one exists.
    fn close(&mut self) -> Result<(), StreamError>;
}

/// Stream-to-stream transducer with internal state and deferred flush.
///
/// One instance serves exactly one pass; buffers (field stacks, row
/// queues, depth counters) are owned for the duration of that pass and
/// are not reentrant.
pub trait Transform {
    /// Process one input node, pushing zero or more output nodes.
    fn transform(&mut self, node: Node, out: &mut Vec<Node>) -> Result<(), StreamError>;

    /// Flush nodes that could only be produced once the source ended
    /// (a discovered schema, a deferred close pair).
    fn complete(&mut self, out: &mut Vec<Node>) -> Result<(), StreamError>;
}

impl<R: Reader + ?Sized> Reader for &mut R {
    fn advance(&mut self) -> Result<bool, StreamError> {
        (**self).advance()
    }

    fn current(&self) -> Option<&Node> {
        (**self).current()
    }
}

impl<W: Writer + ?Sized> Writer for &mut W {
    fn write(&mut self, node: &Node) -> Result<(), StreamError> {
        (**self).write(node)
    }

    fn complete(&mut self) -> Result<(), StreamError> {
        (**self).complete()
    }

    fn close(&mut self) -> Result<(), StreamError> {
        (**self).close()
    }
}

impl<T: Transform + ?Sized> Transform for &mut T {
    fn transform(&mut self, node: Node, out: &mut Vec<Node>) -> Result<(), StreamError> {
        (**self).transform(node, out)
    }

    fn complete(&mut self, out: &mut Vec<Node>) -> Result<(), StreamError> {
        (**self).complete(out)
    }
}

impl<'a> Reader for Box<dyn Reader + 'a> {
    fn advance(&mut self) -> Result<bool, StreamError> {
        (**self).advance()
    }

    fn current(&self) -> Option<&Node> {
        (**self).current()
    }
}

impl<'a> Writer for Box<dyn Writer + 'a> {
    fn write(&mut self, node: &Node) -> Result<(), StreamError> {
        (**self).write(node)
    }

    fn complete(&mut self) -> Result<(), StreamError> {
        (**self).complete()
    }

    fn close(&mut self) -> Result<(), StreamError> {
        (**self).close()
    }
}

/// Balanced-nesting tracker: an explicit stack of open container kinds.
///
/// Shared by transforms and writers to enforce the stream invariant.
/// Mismatches are fatal - nesting is never silently repaired.
#[derive(Debug, Default)]
pub struct Nesting {
    stack: Vec<NodeKind>,
}

impl Nesting {
    pub fn new() -> Nesting {
        Nesting::default()
    }

    /// Current open-container depth.
    #[inline]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// The innermost open container kind, if any.
    #[inline]
    pub fn innermost(&self) -> Option<NodeKind> {
        self.stack.last().copied()
    }

    /// Account for one node, raising on any violation of the invariant.
    pub fn track(&mut self, node: &Node) -> Result<(), StreamError> {
        match node.phase {
            Some(Phase::Start) => {
                self.stack.push(node.kind);
                Ok(())
            }
            Some(Phase::End) => match self.stack.pop() {
                Some(open) if open == node.kind => Ok(()),
                Some(open) => Err(StreamError::malformed(format!(
                    "{:?} end closes an open {:?}",
                    node.kind, open
                ))),
                None => Err(StreamError::malformed(format!(
                    "{:?} end with nothing open",
                    node.kind
                ))),
            },
            None => {
                if self.stack.is_empty() {
                    Err(StreamError::malformed("value outside any container"))
                } else {
                    Ok(())
                }
            }
        }
    }

    /// The stream is over: everything opened must have closed.
    pub fn finish(&self) -> Result<(), StreamError> {
        if let Some(open) = self.stack.last() {
            return Err(StreamError::malformed(format!(
                "stream ended with {:?} still open ({} unclosed)",
                open,
                self.stack.len()
            )));
        }
        Ok(())
    }
}

/// Reader over an in-memory node sequence. The synthetic-source end of
/// every test pipeline, and the replay end of buffered compositions.
#[derive(Debug)]
pub struct VecReader {
    nodes: Vec<Node>,
    pos: usize,
    started: bool,
}

impl VecReader {
    pub fn new(nodes: Vec<Node>) -> VecReader {
        VecReader { nodes, pos: 0, started: false }
    }
}

impl Reader for VecReader {
    fn advance(&mut self) -> Result<bool, StreamError> {
        if !self.started {
            self.started = true;
        } else if self.pos < self.nodes.len() {
            self.pos += 1;
        }
        Ok(self.pos < self.nodes.len())
    }

    fn current(&self) -> Option<&Node> {
        if self.started {
            self.nodes.get(self.pos)
        } else {
            None
        }
    }
}

/// Writer accumulating nodes in memory, validating nesting as they arrive.
#[derive(Debug, Default)]
pub struct VecWriter {
    nodes: Vec<Node>,
    nesting: Nesting,
    closed: bool,
}

impl VecWriter {
    pub fn new() -> VecWriter {
        VecWriter::default()
    }

    /// Nodes accepted so far.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn into_nodes(self) -> Vec<Node> {
        self.nodes
    }
}

impl Writer for VecWriter {
    fn write(&mut self, node: &Node) -> Result<(), StreamError> {
        if self.closed {
            return Err(StreamError::Exhausted);
        }
        self.nesting.track(node)?;
        self.nodes.push(node.clone());
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

/// Drive a full pass: pull `reader` dry through `transform` into `writer`,
/// drain the transform's completion, then complete the writer.
pub fn run<R, T, W>(reader: &mut R, transform: &mut T, writer: &mut W) -> Result<(), StreamError>
where
    R: Reader + ?Sized,
    T: Transform + ?Sized,
    W: Writer + ?Sized,
{
    let mut out = Vec::new();
    while reader.advance()? {
        let node = match reader.current() {
            Some(n) => n.clone(),
            None => return Err(StreamError::Exhausted),
        };
        transform.transform(node, &mut out)?;
        for n in out.drain(..) {
            writer.write(&n)?;
        }
    }
    transform.complete(&mut out)?;
    for n in out.drain(..) {
        writer.write(&n)?;
    }
    writer.complete()
}

/// Drive a pass with no transform between the endpoints.
pub fn copy<R, W>(reader: &mut R, writer: &mut W) -> Result<(), StreamError>
where
    R: Reader + ?Sized,
    W: Writer + ?Sized,
{
    while reader.advance()? {
        let node = match reader.current() {
            Some(n) => n.clone(),
            None => return Err(StreamError::Exhausted),
        };
        writer.write(&node)?;
    }
    writer.complete()
}
