//! Continuing from upstream states and injecting external components.

use std::sync::Arc;

use arche_core::query::{find_all, material, remote_folder};
use arche_core::{Command, CommandOp, ProjectState};
use arche_engine::{ManagerError, StateMgr};
use arche_types::{AndersonianParams, Component, MaterialParams, Node, NodeKind, Remote};

use crate::common::{MockEnvironment, add_fault, manager, settle};

async fn solved_upstream(env: &Arc<MockEnvironment>) -> Arc<ProjectState> {
    let mut upstream = manager(env);
    add_fault(&mut upstream).await;
    settle(&mut upstream).await;
    let state = upstream.latest_state();
    assert!(state.solution().is_some());
    state
}

#[tokio::test]
async fn material_component_replaces_the_existing_node() {
    let env = MockEnvironment::new();
    let upstream = solved_upstream(&env).await;
    let upstream_material = material(upstream.node().unwrap()).unwrap();
    let injected = MaterialParams::new(0.3, 2.0, 1200.0);

    let mut mgr = StateMgr::builder("downstream", "demo")
        .from_state(Arc::clone(&upstream))
        .components(vec![Component::Material(injected)])
        .environment(env.clone())
        .build()
        .unwrap();

    let state = mgr.latest_state();
    let node = material(state.node().unwrap()).unwrap();
    assert_eq!(node.id(), upstream_material.id());
    assert!(matches!(node.kind(), NodeKind::Material(p) if *p == injected));
    assert!(node.tags().iter().any(|t| t == "fromComponent"));
    assert!(matches!(state.commands()[0].op(), CommandOp::ReplaceNode { .. }));
    assert!(state.solution_changed());
    assert!(state.solution().is_none());
    assert_eq!(state.components(), &[Component::Material(injected)]);
    assert!(Arc::ptr_eq(state.initial().unwrap(), &upstream));

    settle(&mut mgr).await;
    assert_eq!(env.solve_calls(), 2);
    assert_ne!(mgr.latest_state().solution(), upstream.solution());
}

#[tokio::test]
async fn remote_component_is_added_under_the_remote_folder() {
    let env = MockEnvironment::new();
    let remote = Remote::Andersonian(AndersonianParams {
        h_sigma_max: 2.0,
        h_sigma_min: 1.0,
        v_sigma: 3.0,
        theta: 45.0,
    });
    let mgr = StateMgr::builder("project", "demo")
        .components(vec![Component::Remote(remote)])
        .environment(env.clone())
        .build()
        .unwrap();

    let root = mgr.root();
    let folder = remote_folder(root).unwrap();
    assert_eq!(folder.children().len(), 1);
    assert!(matches!(folder.children()[0].kind(), NodeKind::Remote(r) if *r == remote));
    assert!(mgr.latest_state().solution_changed());
    assert!(!mgr.has_pending_work(), "no discontinuity mesh, nothing to solve");
}

#[tokio::test]
async fn untouched_continuation_inherits_node_and_solution() {
    let env = MockEnvironment::new();
    let upstream = solved_upstream(&env).await;

    let mgr = StateMgr::builder("downstream", "demo")
        .from_state(Arc::clone(&upstream))
        .environment(env.clone())
        .build()
        .unwrap();

    let state = mgr.latest_state();
    assert!(Arc::ptr_eq(state.node().unwrap(), upstream.node().unwrap()));
    assert_eq!(state.solution(), upstream.solution());
    assert!(!state.solution_changed());
    assert!(!mgr.has_pending_work());
    assert_eq!(env.solve_calls(), 1);
}

#[tokio::test]
async fn prior_commands_are_replayed_as_one_batch() {
    let env = MockEnvironment::new();
    let upstream = solved_upstream(&env).await;
    let root = upstream.node().unwrap();
    let folder = find_all(root, |n| matches!(n.kind(), NodeKind::FolderDiscontinuity))
        .remove(0)
        .id()
        .clone();
    let prior = vec![
        Command::add_child(folder.clone(), Node::discontinuity("downstream", "second")),
        Command::init(),
        Command::add_child(folder, Node::discontinuity("downstream", "third")),
    ];

    let mut mgr = StateMgr::builder("downstream", "demo")
        .from_state(Arc::clone(&upstream))
        .prior_commands(prior)
        .environment(env.clone())
        .build()
        .unwrap();
    let mut outputs = mgr.subscribe();

    let first = outputs.try_recv().unwrap();
    let state = first.state().unwrap();
    assert_eq!(state.commands().len(), 2, "init commands are dropped");
    assert_eq!(state.solution(), upstream.solution(), "solve-neutral history keeps the solution");
    assert!(outputs.try_recv().is_err());

    let discontinuities =
        find_all(mgr.root(), |n| matches!(n.kind(), NodeKind::Discontinuity)).len();
    assert_eq!(discontinuities, 3);
    mgr.dispose();
}

#[tokio::test]
async fn construction_errors_surface_immediately() {
    let env = MockEnvironment::new();
    let err = StateMgr::builder("p", "demo").build().err().unwrap();
    assert!(matches!(err, ManagerError::MissingEnvironment));

    let rootless = Arc::new(ProjectState::new("p", None, Vec::new(), Vec::new(), None, None));
    let err = StateMgr::builder("p", "demo")
        .from_state(rootless)
        .environment(env.clone())
        .build()
        .err()
        .unwrap();
    assert!(matches!(err, ManagerError::MissingRoot));

    let folder_only = Node::discontinuity("p", "not a project");
    let state = Arc::new(ProjectState::from_root("p", Arc::new(folder_only)));
    let err = StateMgr::builder("p", "demo")
        .from_state(state)
        .environment(env.clone())
        .build()
        .err()
        .unwrap();
    assert!(matches!(err, ManagerError::NotARoot { kind: "discontinuity" }));

    let bare = Node::root("p", Vec::new());
    let state = Arc::new(ProjectState::from_root("p", Arc::new(bare)));
    let err = StateMgr::builder("p", "demo")
        .from_state(state)
        .components(vec![Component::Material(MaterialParams::default())])
        .environment(env)
        .build()
        .err()
        .unwrap();
    assert!(matches!(err, ManagerError::MissingMaterial));
}
