//! Immutable project snapshots.

use std::sync::Arc;

use arche_types::{Component, Node, Solution};

use crate::classify::needs_solve;
use crate::tree::Command;

/// Tree + command history + solution, as published by a manager.
///
/// `solution_changed` tells consumers whether the commands of this state
/// invalidated the solution of `initial`.
#[derive(Debug, Clone)]
pub struct ProjectState {
    id: String,
    initial: Option<Arc<ProjectState>>,
    commands: Vec<Arc<Command>>,
    components: Vec<Component>,
    node: Option<Arc<Node>>,
    solution: Option<Solution>,
    solution_changed: bool,
}

impl ProjectState {
    /// Build a state, inheriting from `initial` what was not given.
    ///
    /// The root is inherited only when no non-`Init` command was applied.
    /// The solution is inherited only when the commands are solve-neutral.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        initial: Option<Arc<ProjectState>>,
        commands: Vec<Arc<Command>>,
        components: Vec<Component>,
        node: Option<Arc<Node>>,
        solution: Option<Solution>,
    ) -> Self {
        let solution_changed = needs_solve(&commands);
        let has_meaningful = commands.iter().any(|c| !c.is_init());
        let node = match node {
            Some(node) => Some(node),
            None if !has_meaningful => initial.as_ref().and_then(|s| s.node.clone()),
            None => None,
        };
        let solution = match solution {
            Some(solution) => Some(solution),
            None if !solution_changed => initial.as_ref().and_then(|s| s.solution.clone()),
            None => None,
        };
        Self {
            id: id.into(),
            initial,
            commands,
            components,
            node,
            solution,
            solution_changed,
        }
    }

    /// Starting state of a fresh project.
    #[must_use]
    pub fn from_root(id: impl Into<String>, node: Arc<Node>) -> Self {
        Self::new(id, None, Vec::new(), Vec::new(), Some(node), None)
    }

    /// Same state with `solution` attached.
    #[must_use]
    pub fn with_solution(&self, solution: Solution) -> Self {
        Self {
            solution: Some(solution),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn initial(&self) -> Option<&Arc<ProjectState>> {
        self.initial.as_ref()
    }

    #[must_use]
    pub fn commands(&self) -> &[Arc<Command>] {
        &self.commands
    }

    pub fn meaningful_commands(&self) -> impl Iterator<Item = &Arc<Command>> {
        self.commands.iter().filter(|c| !c.is_init())
    }

    #[must_use]
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    #[must_use]
    pub fn node(&self) -> Option<&Arc<Node>> {
        self.node.as_ref()
    }

    #[must_use]
    pub fn solution(&self) -> Option<&Solution> {
        self.solution.as_ref()
    }

    #[must_use]
    pub fn solution_changed(&self) -> bool {
        self.solution_changed
    }
}
