//! Composition primitives over transforms, readers and writers.
//!
//! - `ChainTransform` pipes transforms back to back, depth-first.
//! - `ForkTransform` tees every node to side writers, yielding the
//!   original downstream unchanged.
//! - `JoinReader` splices N source readers into one combined document.
//! - `TransformReader` adapts a reader + transform back into a reader.

use std::collections::VecDeque;

use crate::node::{Node, NodeKind};
use crate::stream::{Nesting, Reader, Settings, StreamError, Transform, Writer};

/// Feed `node` through `stages` in order, depth-first: every output of a
/// stage runs through the remaining stages before its next sibling.
fn feed(stages: &mut [Box<dyn Transform>], node: Node, out: &mut Vec<Node>) -> Result<(), StreamError> {
    match stages.split_first_mut() {
        None => {
            out.push(node);
            Ok(())
        }
        Some((head, rest)) => {
            let mut buf = Vec::new();
            head.transform(node, &mut buf)?;
            for n in buf {
                feed(rest, n, out)?;
            }
            Ok(())
        }
    }
}

/// Pipes each output node of one transform into the next.
///
/// A single input node fans out through the entire chain before the next
/// input node is processed. Completion drains stages in declaration
/// order: stage 1's flush runs through stages 2..n, then stage 2's flush
/// through 3..n, and so on.
#[derive(Default)]
pub struct ChainTransform {
    stages: Vec<Box<dyn Transform>>,
}

impl ChainTransform {
    pub fn new() -> ChainTransform {
        ChainTransform { stages: Vec::new() }
    }

    /// Append a stage to the end of the chain.
    pub fn then(mut self, stage: impl Transform + 'static) -> ChainTransform {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl Transform for ChainTransform {
    fn transform(&mut self, node: Node, out: &mut Vec<Node>) -> Result<(), StreamError> {
        feed(&mut self.stages, node, out)
    }

    fn complete(&mut self, out: &mut Vec<Node>) -> Result<(), StreamError> {
        let mut i = 0;
        while i < self.stages.len() {
            let (left, rest) = self.stages.split_at_mut(i + 1);
            let mut buf = Vec::new();
            left[i].complete(&mut buf)?;
            for n in buf {
                feed(rest, n, out)?;
            }
            i += 1;
        }
        Ok(())
    }
}

/// Tees every node to each side writer, in order, then yields the
/// original downstream unchanged.
///
/// Side writes are synchronous and in-line: a failing side writer aborts
/// the whole pass immediately. The fork never calls `complete()`/`close()`
/// on its side writers - their lifecycle belongs to the caller.
pub struct ForkTransform<'w> {
    sides: Vec<&'w mut dyn Writer>,
    nesting: Nesting,
}

impl<'w> ForkTransform<'w> {
    pub fn new(sides: Vec<&'w mut dyn Writer>) -> ForkTransform<'w> {
        ForkTransform { sides, nesting: Nesting::new() }
    }
}

impl Transform for ForkTransform<'_> {
    fn transform(&mut self, node: Node, out: &mut Vec<Node>) -> Result<(), StreamError> {
        self.nesting.track(&node)?;
        for side in &mut self.sides {
            side.write(&node)?;
        }
        out.push(node);
        Ok(())
    }

    fn complete(&mut self, _out: &mut Vec<Node>) -> Result<(), StreamError> {
        self.nesting.finish()
    }
}

enum JoinState {
    /// Next: open the combined wrapper (unless fragment), then sources.
    Preamble,
    /// Replaying source `i`; `entered` once its PropertyStart went out.
    Source { index: usize, entered: bool },
    /// Next: close the combined wrapper (unless fragment).
    Postamble,
    Done,
}

/// One combined stream over N source readers.
///
/// Unless fragment mode, the result is wrapped as
/// `DocumentStart, ObjectStart("root")`; each source contributes
/// `PropertyStart("Document{i}")`, its body with its own Document wrapper
/// stripped, `PropertyEnd`; then `ObjectEnd, DocumentEnd`. N independent
/// top-level documents become one object keyed by document position.
pub struct JoinReader<'r> {
    sources: Vec<&'r mut dyn Reader>,
    settings: Settings,
    state: JoinState,
    pending: VecDeque<Node>,
    current: Option<Node>,
}

impl<'r> JoinReader<'r> {
    pub fn new(sources: Vec<&'r mut dyn Reader>) -> JoinReader<'r> {
        JoinReader::with_settings(sources, Settings::default())
    }

    pub fn with_settings(sources: Vec<&'r mut dyn Reader>, settings: Settings) -> JoinReader<'r> {
        JoinReader {
            sources,
            settings,
            state: JoinState::Preamble,
            pending: VecDeque::new(),
            current: None,
        }
    }

    fn next_node(&mut self) -> Result<Option<Node>, StreamError> {
        loop {
            if let Some(node) = self.pending.pop_front() {
                return Ok(Some(node));
            }
            match self.state {
                JoinState::Preamble => {
                    if !self.settings.is_fragment {
                        self.pending.push_back(Node::document_start());
                        self.pending.push_back(Node::object_start(Some("root")));
                    }
                    self.state = if self.sources.is_empty() {
                        JoinState::Postamble
                    } else {
                        JoinState::Source { index: 0, entered: false }
                    };
                }
                JoinState::Source { index, entered } => {
                    if !entered {
                        self.pending
                            .push_back(Node::property_start(&format!("Document{}", index + 1)));
                        self.state = JoinState::Source { index, entered: true };
                        continue;
                    }
                    if self.sources[index].advance()? {
                        let node = match self.sources[index].current() {
                            Some(n) => n.clone(),
                            None => return Err(StreamError::Exhausted),
                        };
                        // Strip each source's own Document wrapper
                        if node.kind != NodeKind::Document {
                            self.pending.push_back(node);
                        }
                    } else {
                        self.pending.push_back(Node::property_end());
                        let next = index + 1;
                        self.state = if next < self.sources.len() {
                            JoinState::Source { index: next, entered: false }
                        } else {
                            JoinState::Postamble
                        };
                    }
                }
                JoinState::Postamble => {
                    if !self.settings.is_fragment {
                        self.pending.push_back(Node::object_end());
                        self.pending.push_back(Node::document_end());
                    }
                    self.state = JoinState::Done;
                    if self.pending.is_empty() {
                        return Ok(None);
                    }
                }
                JoinState::Done => return Ok(None),
            }
        }
    }
}

impl Reader for JoinReader<'_> {
    fn advance(&mut self) -> Result<bool, StreamError> {
        self.current = self.next_node()?;
        Ok(self.current.is_some())
    }

    fn current(&self) -> Option<&Node> {
        self.current.as_ref()
    }
}

/// Adapts a source reader plus a transform into a reader.
///
/// Lazy: the source is pulled only when the output queue is empty, and
/// the transform's `complete()` runs exactly once, at source exhaustion.
pub struct TransformReader<R: Reader, T: Transform> {
    source: R,
    transform: T,
    queue: VecDeque<Node>,
    buf: Vec<Node>,
    current: Option<Node>,
    completed: bool,
}

impl<R: Reader, T: Transform> TransformReader<R, T> {
    pub fn new(source: R, transform: T) -> TransformReader<R, T> {
        TransformReader {
            source,
            transform,
            queue: VecDeque::new(),
            buf: Vec::new(),
            current: None,
            completed: false,
        }
    }
}

impl<R: Reader, T: Transform> Reader for TransformReader<R, T> {
    fn advance(&mut self) -> Result<bool, StreamError> {
        loop {
            if let Some(node) = self.queue.pop_front() {
                self.current = Some(node);
                return Ok(true);
            }
            if self.completed {
                self.current = None;
                return Ok(false);
            }
            if self.source.advance()? {
                let node = match self.source.current() {
                    Some(n) => n.clone(),
                    None => return Err(StreamError::Exhausted),
                };
                self.transform.transform(node, &mut self.buf)?;
            } else {
                self.transform.complete(&mut self.buf)?;
                self.completed = true;
            }
            self.queue.extend(self.buf.drain(..));
        }
    }

    fn current(&self) -> Option<&Node> {
        self.current.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{copy, run, VecReader, VecWriter};
    use crate::value::Value;
    use pretty_assertions::assert_eq;

    /// Doubles every value node; used to observe fan-out order.
    struct Repeat;

    impl Transform for Repeat {
        fn transform(&mut self, node: Node, out: &mut Vec<Node>) -> Result<(), StreamError> {
            if node.is_value() {
                out.push(node.clone());
            }
            out.push(node);
            Ok(())
        }

        fn complete(&mut self, _out: &mut Vec<Node>) -> Result<(), StreamError> {
            Ok(())
        }
    }

    /// Tags labels with a suffix; flushes a marker value on completion.
    struct Tag(&'static str);

    impl Transform for Tag {
        fn transform(&mut self, mut node: Node, out: &mut Vec<Node>) -> Result<(), StreamError> {
            if let Some(label) = node.label.take() {
                node.label = Some(format!("{}{}", label, self.0));
            }
            out.push(node);
            Ok(())
        }

        fn complete(&mut self, out: &mut Vec<Node>) -> Result<(), StreamError> {
            out.push(Node::value(Value::String(format!("flush{}", self.0))));
            Ok(())
        }
    }

    fn sample() -> Vec<Node> {
        vec![
            Node::document_start(),
            Node::collection_start(Some("items")),
            Node::value(Value::Integer(1)),
            Node::collection_end(),
            Node::document_end(),
        ]
    }

    #[test]
    fn test_chain_depth_first() {
        let mut chain = ChainTransform::new().then(Repeat).then(Repeat);
        let mut out = Vec::new();
        chain.transform(Node::value(Value::Integer(7)), &mut out).unwrap();
        // One input value fans out to 2 in stage one, each doubled again
        assert_eq!(out.len(), 4);
        assert!(out.iter().all(|n| n.payload() == Some(&Value::Integer(7))));
    }

    #[test]
    fn test_chain_completion_order() {
        // Stage 1's flush must pass through stage 2, then stage 2 flushes.
        let mut chain = ChainTransform::new().then(Tag("-a")).then(Tag("-b"));
        let mut out = Vec::new();
        chain.complete(&mut out).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].payload(), Some(&Value::String("flush-a".into())));
        assert_eq!(out[1].payload(), Some(&Value::String("flush-b".into())));
    }

    #[test]
    fn test_chain_label_composition() {
        let input = Node::object_start(Some("x"));
        let mut chain = ChainTransform::new().then(Tag("-a")).then(Tag("-b"));
        let mut out = Vec::new();
        chain.transform(input, &mut out).unwrap();
        assert_eq!(out[0].label(), Some("x-a-b"));
    }

    #[test]
    fn test_fork_pass_through_equality() {
        let mut left = VecWriter::new();
        let mut right = VecWriter::new();
        let mut fork = ForkTransform::new(vec![&mut left, &mut right]);

        let mut reader = VecReader::new(sample());
        let mut downstream = VecWriter::new();
        run(&mut reader, &mut fork, &mut downstream).unwrap();

        assert_eq!(downstream.nodes(), sample().as_slice());
        assert_eq!(left.nodes(), sample().as_slice());
        assert_eq!(right.nodes(), sample().as_slice());
    }

    #[test]
    fn test_fork_rejects_unbalanced() {
        let mut side = VecWriter::new();
        let mut fork = ForkTransform::new(vec![&mut side]);
        let mut out = Vec::new();
        fork.transform(Node::document_start(), &mut out).unwrap();
        assert!(fork.complete(&mut out).is_err());
    }

    #[test]
    fn test_join_two_documents() {
        let mut a = VecReader::new(vec![
            Node::document_start(),
            Node::object_start(Some("a")),
            Node::object_end(),
            Node::document_end(),
        ]);
        let mut b = VecReader::new(vec![
            Node::document_start(),
            Node::collection_start(Some("items")),
            Node::value(Value::Integer(2)),
            Node::collection_end(),
            Node::document_end(),
        ]);
        let mut join = JoinReader::new(vec![&mut a, &mut b]);
        let mut writer = VecWriter::new();
        copy(&mut join, &mut writer).unwrap();

        let expected = vec![
            Node::document_start(),
            Node::object_start(Some("root")),
            Node::property_start("Document1"),
            Node::object_start(Some("a")),
            Node::object_end(),
            Node::property_end(),
            Node::property_start("Document2"),
            Node::collection_start(Some("items")),
            Node::value(Value::Integer(2)),
            Node::collection_end(),
            Node::property_end(),
            Node::object_end(),
            Node::document_end(),
        ];
        assert_eq!(writer.nodes(), expected.as_slice());
    }

    #[test]
    fn test_join_fragment_mode() {
        let mut a = VecReader::new(vec![
            Node::document_start(),
            Node::object_start(None),
            Node::object_end(),
            Node::document_end(),
        ]);
        let mut join = JoinReader::with_settings(vec![&mut a], Settings::new().fragment());
        let mut collected = Vec::new();
        while join.advance().unwrap() {
            collected.push(join.current().cloned().unwrap());
        }
        // No root wrapper, just the per-document property pair
        let expected = vec![
            Node::property_start("Document1"),
            Node::object_start(None),
            Node::object_end(),
            Node::property_end(),
        ];
        assert_eq!(collected, expected);
    }

    #[test]
    fn test_join_empty_source_still_keyed() {
        let mut empty = VecReader::new(vec![]);
        let mut join = JoinReader::new(vec![&mut empty]);
        let mut writer = VecWriter::new();
        copy(&mut join, &mut writer).unwrap();
        let expected = vec![
            Node::document_start(),
            Node::object_start(Some("root")),
            Node::property_start("Document1"),
            Node::property_end(),
            Node::object_end(),
            Node::document_end(),
        ];
        assert_eq!(writer.nodes(), expected.as_slice());
    }

    #[test]
    fn test_transform_reader_completes_once() {
        let reader = VecReader::new(vec![Node::object_start(Some("x")), Node::object_end()]);
        let mut tr = TransformReader::new(reader, Tag("-t"));
        let mut seen = Vec::new();
        while tr.advance().unwrap() {
            seen.push(tr.current().cloned());
        }
        // Two passed-through nodes plus exactly one flush marker
        assert_eq!(seen.len(), 3);
        assert_eq!(
            seen[2].as_ref().and_then(|n| n.payload().cloned()),
            Some(Value::String("flush-t".into()))
        );
        // Exhausted stays exhausted, no second completion
        assert!(!tr.advance().unwrap());
    }
}
