//! Node-Stream Engine
//!
//! Format-agnostic pipeline converting hierarchical, semi-structured data
//! into a uniform stream of structural events, reshaping that stream -
//! flattened tables, positional matrices, merged/forked/joined
//! compositions - and materializing it back.
//!
//! # Architecture
//!
//! - **node.rs** - Node/NodeKind/Phase, the event unit
//! - **value.rs** - scalar payloads with syntactic typing
//! - **stream.rs** - Reader/Writer/Transform contracts, settings, errors
//! - **compose.rs** - Chain/Fork/Join combinators, TransformReader
//! - **table.rs** - row detection and schema unification
//! - **matrix.rs** - positional re-framing, header rows
//! - **merge.rs** - wrapper suppression across batches
//! - **rows.rs** - row-oriented navigators and creators
//! - **tree.rs** - in-memory object-graph reader/writer
//! - **delim.rs** - delimited-text matrix adapter

pub mod compose;
pub mod delim;
pub mod matrix;
pub mod merge;
pub mod node;
pub mod rows;
pub mod stream;
pub mod table;
pub mod tree;
pub mod value;

pub use compose::{ChainTransform, ForkTransform, JoinReader, TransformReader};
pub use delim::{DelimReader, DelimWriter};
pub use matrix::{FlatMatrixTransform, MatrixTransform};
pub use merge::{MergeMatrixTransform, MergeTableTransform};
pub use node::{Node, NodeKind, Phase};
pub use rows::{MatrixCreator, MatrixNavigator, TableCreator, TableNavigator};
pub use stream::{copy, run, Nesting, Reader, Settings, StreamError, Transform, VecReader, VecWriter, Writer};
pub use table::{FlatTableTransform, TableTransform};
pub use tree::{Shape, ShapeRegistry, Tree, TreeNode, TreeReader, TreeWriter};
pub use value::{ScalarKind, Value};
