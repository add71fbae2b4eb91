//! Solve triggering, solution reuse and resolve fan-out.

use std::collections::HashSet;

use arche_core::query::{find_by_id, observation_meshes};
use arche_core::{Orientation, ShapeKind};
use arche_engine::{EngineConfig, StateMgr};
use arche_types::{BoundingBox, Constraint, CoulombParams, MaterialParams, Node, NodeId, NodeKind};

use crate::common::{
    MockEnvironment, TRIANGLE, add_fault, drain, manager, material_id, observation_folder,
    settle,
};

fn observation_mesh_count(mgr: &StateMgr) -> usize {
    observation_meshes(mgr.root()).len()
}

#[tokio::test]
async fn end_to_end_solve_resolve_and_invalidate() {
    let env = MockEnvironment::new();
    let mut mgr = manager(&env);
    let mut outputs = mgr.subscribe();

    let material = find_by_id(mgr.root(), &material_id(&mgr)).unwrap();
    assert!(matches!(material.kind(), NodeKind::Material(p) if *p == MaterialParams::new(0.25, 1.0, 1000.0)));

    add_fault(&mut mgr).await;
    let state = mgr.latest_state();
    assert!(state.solution_changed());
    assert!(state.solution().is_none(), "pending until the solve completes");
    settle(&mut mgr).await;
    assert_eq!(env.solve_calls(), 1);
    let first = mgr.latest_state().solution().cloned().unwrap();

    let grids = observation_folder(&mgr);
    let mesh_id = mgr
        .add_simple_shape(&grids, ShapeKind::Plane, Orientation::XY)
        .await
        .unwrap();
    settle(&mut mgr).await;
    assert_eq!(env.resolve_calls(), 1);
    assert_eq!(env.solve_calls(), 1, "adding a grid is solve-neutral");
    let mesh = find_by_id(mgr.root(), &mesh_id).unwrap();
    assert_eq!(mesh.children().len(), 1);
    assert_eq!(mesh.children()[0].id().as_str(), format!("realization-{mesh_id}"));
    assert_eq!(mesh.current_realization().unwrap().solution_id, first.solution_id);

    drain(&mut outputs);
    mgr.save_node(&material_id(&mgr), MaterialParams::new(0.3, 2.0, 1000.0))
        .unwrap();
    let next = drain(&mut outputs);
    assert_eq!(next.len(), 1);
    assert!(next[0].state().unwrap().solution().is_none());

    settle(&mut mgr).await;
    assert_eq!(env.solve_calls(), 2);
    let second = mgr.latest_state().solution().cloned().unwrap();
    assert_ne!(second, first);
    let mesh = find_by_id(mgr.root(), &mesh_id).unwrap();
    assert_eq!(mesh.current_realization().unwrap().solution_id, second.solution_id);
}

#[tokio::test]
async fn neutral_edits_keep_the_solution() {
    let env = MockEnvironment::new();
    let mut mgr = manager(&env);
    let fault = add_fault(&mut mgr).await;
    settle(&mut mgr).await;
    let solution = mgr.latest_state().solution().cloned().unwrap();

    mgr.rename(&fault, "main fault").unwrap();
    let group = Node::new(NodeId::random(), "project", "group", NodeKind::Observation)
        .with_tags(vec!["folder".to_string()]);
    mgr.add_child(&observation_folder(&mgr), group).unwrap();

    let state = mgr.latest_state();
    assert_eq!(state.solution(), Some(&solution));
    assert!(!mgr.has_pending_work());
    assert_eq!(env.solve_calls(), 1);
}

#[tokio::test]
async fn needs_solve_edit_after_reuse_point_drops_the_solution() {
    let env = MockEnvironment::new();
    let mut mgr = manager(&env);
    let fault = add_fault(&mut mgr).await;
    settle(&mut mgr).await;
    let solution = mgr.latest_state().solution().cloned().unwrap();

    mgr.rename(&fault, "renamed").unwrap();
    let coulomb = Constraint::Coulomb(CoulombParams {
        friction: 0.6,
        cohesion: 0.0,
    });
    mgr.add_child(&fault, Node::constraint("project", coulomb))
        .unwrap();
    assert!(mgr.latest_state().solution().is_none());

    mgr.rename(&fault, "renamed again").unwrap();
    assert!(
        mgr.latest_state().solution().is_none(),
        "neutral edits do not revive an invalidated solution"
    );

    settle(&mut mgr).await;
    let fresh = mgr.latest_state().solution().cloned().unwrap();
    assert_ne!(fresh, solution);
}

#[tokio::test]
async fn fresh_solution_resolves_every_mesh() {
    let env = MockEnvironment::new();
    let mut mgr = manager(&env);
    env.set_fail_solves(true);
    add_fault(&mut mgr).await;
    settle(&mut mgr).await;
    assert!(mgr.latest_state().solution().is_none());

    let grids = observation_folder(&mgr);
    for orientation in [Orientation::XY, Orientation::XZ, Orientation::YZ] {
        mgr.add_simple_shape(&grids, ShapeKind::Disk, orientation)
            .await
            .unwrap();
    }
    assert_eq!(observation_mesh_count(&mgr), 3);
    assert_eq!(env.resolve_calls(), 0);

    env.set_fail_solves(false);
    assert!(mgr.retry_solve().unwrap());
    settle(&mut mgr).await;

    let solution = mgr.latest_state().solution().cloned().unwrap();
    assert_eq!(env.resolve_calls(), 3);
    let realizations: HashSet<NodeId> = observation_meshes(mgr.root())
        .iter()
        .map(|mesh| {
            assert_eq!(mesh.current_realization().unwrap().solution_id, solution.solution_id);
            mesh.children()[0].id().clone()
        })
        .collect();
    assert_eq!(realizations.len(), 3);
    assert!(mgr.processing().resolving.is_empty());
}

#[tokio::test]
async fn resolved_meshes_are_not_resolved_again() {
    let env = MockEnvironment::new();
    let mut mgr = manager(&env);
    let fault = add_fault(&mut mgr).await;
    settle(&mut mgr).await;
    mgr.add_simple_shape(&observation_folder(&mgr), ShapeKind::Plane, Orientation::XZ)
        .await
        .unwrap();
    settle(&mut mgr).await;
    assert_eq!(env.resolve_calls(), 1);

    mgr.rename(&fault, "quiet edit").unwrap();
    assert_eq!(mgr.retry_resolves().unwrap(), 0);
    settle(&mut mgr).await;
    assert_eq!(env.resolve_calls(), 1);

    let downstream = StateMgr::builder("downstream", "demo")
        .from_state(mgr.latest_state())
        .environment(env.clone())
        .build()
        .unwrap();
    assert!(!downstream.has_pending_work());
    assert_eq!(env.solve_calls(), 1);
    assert_eq!(env.resolve_calls(), 1);
}

#[tokio::test]
async fn unfenced_stale_solution_is_never_published() {
    let env = MockEnvironment::new();
    let config = EngineConfig {
        fence_stale_solves: false,
        ..EngineConfig::default()
    };
    let mut mgr = StateMgr::builder("project", "demo")
        .environment(env.clone())
        .config(config)
        .build()
        .unwrap();
    let mut outputs = mgr.subscribe();

    add_fault(&mut mgr).await;
    mgr.save_node(&material_id(&mgr), MaterialParams::new(0.2, 3.0, 900.0))
        .unwrap();
    assert_eq!(mgr.processing().solving, 2);
    drain(&mut outputs);

    settle(&mut mgr).await;
    assert_eq!(env.solve_calls(), 2);
    let solved: Vec<_> = drain(&mut outputs)
        .into_iter()
        .filter_map(|o| o.state().and_then(|s| s.solution().cloned()))
        .collect();
    assert_eq!(solved.len(), 1);
    assert_eq!(mgr.latest_state().solution(), solved.first());
}

#[tokio::test]
async fn foreign_meshes_wait_for_an_owned_solution() {
    let env = MockEnvironment::new();
    let mut mgr = manager(&env);
    add_fault(&mut mgr).await;
    settle(&mut mgr).await;

    let foreign = Node::observation_mesh(
        NodeId::new("mesh-foreign"),
        "someone-else",
        "mesh",
        env.drive.insert("elsewhere", "grid.ts", TRIANGLE).id,
        BoundingBox::new([0.0; 3], [1.0; 3]),
    );
    mgr.add_child(&observation_folder(&mgr), foreign).unwrap();
    assert!(!mgr.has_pending_work());

    mgr.save_node(&material_id(&mgr), MaterialParams::new(0.3, 1.0, 1000.0))
        .unwrap();
    settle(&mut mgr).await;
    let mesh = find_by_id(mgr.root(), &NodeId::new("mesh-foreign")).unwrap();
    assert!(mesh.current_realization().is_some());
    assert_eq!(mesh.owner_id(), "project");
}
