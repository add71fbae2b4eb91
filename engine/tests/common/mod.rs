//! Shared test utilities and fixtures
//!
//! Common infrastructure for state manager integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arche_core::FieldSamples;
use arche_core::query::find_first;
use arche_engine::{
    Drive, EnvFut, Environment, EnvironmentError, File, ManagerOutput, MemoryDrive, StateMgr,
};
use arche_types::{FileId, Model, Node, NodeId, NodeKind, Solution, SolutionId};
use tokio::sync::mpsc;

pub const FOLDER: &str = "project-folder";

pub const TRIANGLE: &str = "\
GOCAD TSurf 1
HEADER {
name: fault
}
TFACE
VRTX 1 0 0 0
VRTX 2 10 0 0
VRTX 3 0 10 -5
TRGL 1 2 3
END
";

/// Environment recording every call, with injectable failures.
#[derive(Default)]
pub struct MockEnvironment {
    pub drive: Arc<MemoryDrive>,
    solve_calls: AtomicUsize,
    resolve_calls: AtomicUsize,
    resolved: Mutex<Vec<(NodeId, SolutionId)>>,
    fail_solves: AtomicBool,
    crash_solves: AtomicBool,
    crash_resolves: AtomicBool,
    failing_meshes: Mutex<HashSet<NodeId>>,
}

impl MockEnvironment {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn solve_calls(&self) -> usize {
        self.solve_calls.load(Ordering::SeqCst)
    }

    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    pub fn resolved(&self) -> Vec<(NodeId, SolutionId)> {
        self.resolved.lock().unwrap().clone()
    }

    pub fn set_fail_solves(&self, fail: bool) {
        self.fail_solves.store(fail, Ordering::SeqCst);
    }

    /// Make the solve or resolve worker panic instead of returning.
    pub fn set_crash(&self, solves: bool, resolves: bool) {
        self.crash_solves.store(solves, Ordering::SeqCst);
        self.crash_resolves.store(resolves, Ordering::SeqCst);
    }

    pub fn fail_resolve_of(&self, mesh_id: NodeId) {
        self.failing_meshes.lock().unwrap().insert(mesh_id);
    }
}

impl Environment for MockEnvironment {
    fn drive(&self) -> Arc<dyn Drive> {
        self.drive.clone()
    }

    fn folder_id(&self) -> &str {
        FOLDER
    }

    fn solve(&self, _model: Arc<Model>) -> EnvFut<'_, Solution> {
        Box::pin(async move {
            self.solve_calls.fetch_add(1, Ordering::SeqCst);
            assert!(!self.crash_solves.load(Ordering::SeqCst), "solver crashed");
            if self.fail_solves.load(Ordering::SeqCst) {
                return Err(EnvironmentError::Backend(anyhow::anyhow!("did not converge")));
            }
            Ok(Solution::new(SolutionId::random()))
        })
    }

    fn resolve<'a>(
        &'a self,
        solution: &'a Solution,
        _owner_id: &'a str,
        mesh_id: &'a NodeId,
        _mesh_file_id: &'a FileId,
    ) -> EnvFut<'a, File> {
        Box::pin(async move {
            self.resolve_calls.fetch_add(1, Ordering::SeqCst);
            assert!(!self.crash_resolves.load(Ordering::SeqCst), "resolver crashed");
            if self.failing_meshes.lock().unwrap().contains(mesh_id) {
                return Err(EnvironmentError::Backend(anyhow::anyhow!("worker lost")));
            }
            self.resolved
                .lock()
                .unwrap()
                .push((mesh_id.clone(), solution.solution_id.clone()));
            let content = FieldSamples::default().to_json()?;
            let name = format!("{mesh_id}-realization-{}", solution.solution_id);
            Ok(self.drive.create_file(FOLDER, &name, content).await?)
        })
    }
}

pub fn manager(env: &Arc<MockEnvironment>) -> StateMgr {
    StateMgr::builder("project", "demo")
        .environment(env.clone())
        .build()
        .unwrap()
}

pub fn node_of_kind(mgr: &StateMgr, kind: fn(&NodeKind) -> bool) -> Arc<Node> {
    find_first(mgr.root(), |n| kind(n.kind())).unwrap()
}

pub fn discontinuity_folder(mgr: &StateMgr) -> NodeId {
    node_of_kind(mgr, |k| matches!(k, NodeKind::FolderDiscontinuity))
        .id()
        .clone()
}

pub fn observation_folder(mgr: &StateMgr) -> NodeId {
    node_of_kind(mgr, |k| matches!(k, NodeKind::FolderObservation))
        .id()
        .clone()
}

pub fn material_id(mgr: &StateMgr) -> NodeId {
    node_of_kind(mgr, |k| matches!(k, NodeKind::Material(_)))
        .id()
        .clone()
}

/// Add a discontinuity carrying one triangle. Returns its id.
pub async fn add_fault(mgr: &mut StateMgr) -> NodeId {
    let folder = discontinuity_folder(mgr);
    let fault = mgr
        .add_child(&folder, Node::discontinuity("project", "fault"))
        .unwrap();
    mgr.drop_file(&fault, "fault.ts", TRIANGLE.to_string())
        .await
        .unwrap();
    fault
}

/// Run pending work to completion, failing the test if it hangs.
pub async fn settle(mgr: &mut StateMgr) {
    tokio::time::timeout(Duration::from_secs(5), mgr.settle())
        .await
        .expect("state manager did not settle");
}

pub fn drain(outputs: &mut mpsc::UnboundedReceiver<ManagerOutput>) -> Vec<ManagerOutput> {
    let mut drained = Vec::new();
    while let Ok(output) = outputs.try_recv() {
        drained.push(output);
    }
    drained
}
