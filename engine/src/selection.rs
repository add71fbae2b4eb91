use std::sync::Arc;

use arche_core::Update;
use arche_types::{Node, NodeId};

/// Node ids whose additions and replacements are surfaced as selection.
#[derive(Debug, Default, Clone)]
pub struct WatchList {
    ids: Vec<NodeId>,
}

impl WatchList {
    pub fn add(&mut self, id: NodeId) {
        if !self.ids.contains(&id) {
            self.ids.push(id);
        }
    }

    pub fn remove(&mut self, id: &NodeId) {
        self.ids.retain(|w| w != id);
    }

    #[must_use]
    pub fn contains(&self, id: &NodeId) -> bool {
        self.ids.contains(id)
    }

    /// Watched nodes added or replaced anywhere in `updates`, latest version
    /// of each, in first-touched order.
    #[must_use]
    pub fn select(&self, updates: &[Update]) -> Vec<Arc<Node>> {
        let mut selected: Vec<Arc<Node>> = Vec::new();
        let touched = updates
            .iter()
            .flat_map(|u| u.replaced.iter().chain(u.added.iter()))
            .filter(|n| self.contains(n.id()));
        for node in touched {
            match selected.iter_mut().find(|s| s.id() == node.id()) {
                Some(slot) => *slot = Arc::clone(node),
                None => selected.push(Arc::clone(node)),
            }
        }
        selected
    }
}
