//! Pure project logic for Arche.
//!
//! The persistent tree and its command log, solve-impact classification,
//! project snapshots, tree queries, the surface codec and shape generators.
//! Nothing here performs IO or spawns tasks.

#![allow(clippy::missing_errors_doc)]

mod classify;
pub mod codec;
pub mod query;
pub mod shapes;
mod state;
pub mod tree;

pub use classify::needs_solve;
pub use codec::{CodecError, FieldSamples, decode_non_empty, decode_surfaces, encode_surfaces};
pub use shapes::{Orientation, ShapeKind};
pub use state::ProjectState;
pub use tree::{Command, CommandId, CommandOp, NodeAttributes, TreeError, Update, apply, apply_batch};
