//! What a state manager publishes to its subscribers.

use std::fmt;
use std::sync::Arc;

use arche_core::{CommandId, ProjectState};
use arche_types::{Node, NodeId, SolutionId};

use crate::environment::Environment;

/// One published project state.
#[derive(Clone)]
pub struct ProjectOutput {
    pub environment: Arc<dyn Environment>,
    pub manager_id: String,
    pub manager_name: String,
    pub state: Arc<ProjectState>,
    /// Watched nodes added or replaced by the batch behind this state.
    pub selection: Vec<Arc<Node>>,
}

impl fmt::Debug for ProjectOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectOutput")
            .field("manager_id", &self.manager_id)
            .field("manager_name", &self.manager_name)
            .field("state", &self.state)
            .field("selection", &self.selection)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureContext {
    /// `command` is the newest command the solve covered, if any.
    Solve { command: Option<CommandId> },
    Resolve {
        mesh_id: NodeId,
        solution_id: SolutionId,
    },
}

/// Background work that failed. The published state is left untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessFailure {
    pub context: FailureContext,
    pub message: String,
}

#[derive(Debug, Clone)]
pub enum ManagerOutput {
    State(ProjectOutput),
    Failure(ProcessFailure),
}

impl ManagerOutput {
    #[must_use]
    pub fn state(&self) -> Option<&Arc<ProjectState>> {
        match self {
            ManagerOutput::State(output) => Some(&output.state),
            ManagerOutput::Failure(_) => None,
        }
    }

    #[must_use]
    pub fn failure(&self) -> Option<&ProcessFailure> {
        match self {
            ManagerOutput::State(_) => None,
            ManagerOutput::Failure(failure) => Some(failure),
        }
    }
}
