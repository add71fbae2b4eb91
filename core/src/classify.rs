//! Which edits make a computed solution stale.
//!
//! This table is the single place that decides solve impact. Any new command
//! touching surfaces, material, remotes or constraints belongs here.

use std::sync::Arc;

use arche_types::NodeKind;

use crate::tree::{Command, CommandOp};

impl Command {
    #[must_use]
    pub fn needs_solve(&self) -> bool {
        match self.op() {
            CommandOp::AddChild { child, .. } => matches!(
                child.kind(),
                NodeKind::DiscontinuityMesh(_) | NodeKind::Constraint(_) | NodeKind::Remote(_)
            ),
            CommandOp::ReplaceAttributes { target, .. } => matches!(
                target.kind(),
                NodeKind::Material(_)
                    | NodeKind::BoundaryCondition(_)
                    | NodeKind::Constraint(_)
                    | NodeKind::Remote(_)
            ),
            CommandOp::ReplaceNode { new, .. } => matches!(new.kind(), NodeKind::Material(_)),
            CommandOp::Init | CommandOp::RemoveNode { .. } => false,
        }
    }
}

/// True when any command of the list invalidates the solution.
#[must_use]
pub fn needs_solve(commands: &[Arc<Command>]) -> bool {
    commands.iter().any(|command| command.needs_solve())
}
