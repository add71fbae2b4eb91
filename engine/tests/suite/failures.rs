//! Solve and resolve failures surface as outputs and leave the tree intact.

use std::sync::Arc;

use arche_core::query::{find_by_id, observation_meshes};
use arche_core::{Orientation, ShapeKind, TreeError};
use arche_engine::{FailureContext, ManagerError};
use arche_types::{BoundingBox, Constraint, CoulombParams, Node, NodeId};

use crate::common::{
    MockEnvironment, TRIANGLE, add_fault, drain, manager, observation_folder, settle,
};

#[tokio::test]
async fn failed_solve_is_reported_and_retried_by_the_next_edit() {
    let env = MockEnvironment::new();
    let mut mgr = manager(&env);
    let mut outputs = mgr.subscribe();
    env.set_fail_solves(true);

    let fault = add_fault(&mut mgr).await;
    let trigger = mgr.latest_state().commands().last().unwrap().id();
    settle(&mut mgr).await;

    let failures: Vec<_> = drain(&mut outputs)
        .into_iter()
        .filter_map(|o| o.failure().cloned())
        .collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(
        failures[0].context,
        FailureContext::Solve {
            command: Some(trigger)
        }
    );
    assert!(failures[0].message.contains("did not converge"));
    assert!(mgr.latest_state().solution().is_none());
    assert_eq!(mgr.processing().solving, 0);

    env.set_fail_solves(false);
    let slip = Constraint::Coulomb(CoulombParams {
        friction: 0.4,
        cohesion: 1.0,
    });
    mgr.add_child(&fault, Node::constraint("project", slip))
        .unwrap();
    settle(&mut mgr).await;
    assert_eq!(env.solve_calls(), 2);
    assert!(mgr.latest_state().solution().is_some());
}

#[tokio::test]
async fn manual_retry_only_runs_when_pending() {
    let env = MockEnvironment::new();
    let mut mgr = manager(&env);
    assert!(!mgr.retry_solve().unwrap(), "nothing to solve without meshes");

    env.set_fail_solves(true);
    add_fault(&mut mgr).await;
    settle(&mut mgr).await;
    env.set_fail_solves(false);

    assert!(mgr.retry_solve().unwrap());
    settle(&mut mgr).await;
    assert!(mgr.latest_state().solution().is_some());
    assert!(!mgr.retry_solve().unwrap(), "already solved");
    assert_eq!(env.solve_calls(), 2);
}

#[tokio::test]
async fn resolve_failure_is_isolated_per_mesh() {
    let env = MockEnvironment::new();
    let mut mgr = manager(&env);
    let mut outputs = mgr.subscribe();
    add_fault(&mut mgr).await;
    settle(&mut mgr).await;
    let solution = mgr.latest_state().solution().cloned().unwrap();

    let grids = observation_folder(&mgr);
    let good = mgr
        .add_simple_shape(&grids, ShapeKind::Plane, Orientation::XY)
        .await
        .unwrap();
    let bad = NodeId::new("mesh-unlucky");
    env.fail_resolve_of(bad.clone());
    let file = env.drive.insert("elsewhere", "unlucky.ts", TRIANGLE);
    let unlucky = Node::observation_mesh(
        bad.clone(),
        "project",
        "mesh",
        file.id,
        BoundingBox::new([0.0; 3], [1.0; 3]),
    );
    mgr.add_child(&grids, unlucky).unwrap();
    settle(&mut mgr).await;

    assert!(find_by_id(mgr.root(), &good).unwrap().current_realization().is_some());
    let failed = find_by_id(mgr.root(), &bad).unwrap();
    assert!(failed.children().is_empty());

    let failures: Vec<_> = drain(&mut outputs)
        .into_iter()
        .filter_map(|o| o.failure().cloned())
        .collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(
        failures[0].context,
        FailureContext::Resolve {
            mesh_id: bad.clone(),
            solution_id: solution.solution_id.clone(),
        }
    );
    assert_eq!(mgr.latest_state().solution(), Some(&solution));

    let calls = env.resolve_calls();
    mgr.rename(&grids, "grids (renamed)").unwrap();
    settle(&mut mgr).await;
    assert_eq!(env.resolve_calls(), calls, "failed resolves are not retried implicitly");

    assert_eq!(mgr.retry_resolves().unwrap(), 1);
    settle(&mut mgr).await;
    assert_eq!(env.resolve_calls(), calls + 1);
    assert_eq!(observation_meshes(mgr.root()).len(), 2);
}

#[tokio::test]
async fn crashed_solve_worker_is_reported_and_released() {
    let env = MockEnvironment::new();
    let mut mgr = manager(&env);
    let mut outputs = mgr.subscribe();
    env.set_crash(true, false);

    add_fault(&mut mgr).await;
    settle(&mut mgr).await;
    assert!(!mgr.has_pending_work());
    assert_eq!(mgr.processing().solving, 0);

    let failures: Vec<_> = drain(&mut outputs)
        .into_iter()
        .filter_map(|o| o.failure().cloned())
        .collect();
    assert_eq!(failures.len(), 1);
    assert!(matches!(failures[0].context, FailureContext::Solve { .. }));
    assert!(failures[0].message.contains("solver crashed"));

    env.set_crash(false, false);
    assert!(mgr.retry_solve().unwrap());
    settle(&mut mgr).await;
    assert!(mgr.latest_state().solution().is_some());
}

#[tokio::test]
async fn crashed_resolve_worker_is_reported_and_released() {
    let env = MockEnvironment::new();
    let mut mgr = manager(&env);
    add_fault(&mut mgr).await;
    settle(&mut mgr).await;
    let mut outputs = mgr.subscribe();
    drain(&mut outputs);

    env.set_crash(false, true);
    let mesh = mgr
        .add_simple_shape(&observation_folder(&mgr), ShapeKind::Plane, Orientation::XY)
        .await
        .unwrap();
    settle(&mut mgr).await;
    assert!(mgr.processing().resolving.is_empty());
    assert!(find_by_id(mgr.root(), &mesh).unwrap().children().is_empty());

    let failures: Vec<_> = drain(&mut outputs)
        .into_iter()
        .filter_map(|o| o.failure().cloned())
        .collect();
    assert_eq!(failures.len(), 1);
    assert!(matches!(&failures[0].context, FailureContext::Resolve { mesh_id, .. } if *mesh_id == mesh));
    assert!(failures[0].message.contains("resolver crashed"));

    env.set_crash(false, false);
    assert_eq!(mgr.retry_resolves().unwrap(), 1);
    settle(&mut mgr).await;
    assert!(find_by_id(mgr.root(), &mesh).unwrap().current_realization().is_some());
}

#[tokio::test]
async fn rejected_commands_surface_to_the_caller() {
    let env = MockEnvironment::new();
    let mut mgr = manager(&env);
    let mut outputs = mgr.subscribe();
    drain(&mut outputs);
    let before = mgr.latest_state();

    let err = mgr.rename(&NodeId::new("ghost"), "boo").unwrap_err();
    assert!(matches!(err, ManagerError::Tree(TreeError::NodeNotFound { .. })));
    let root_id = mgr.root().id().clone();
    let err = mgr.remove_node(&root_id).unwrap_err();
    assert!(matches!(err, ManagerError::Tree(TreeError::RootRemoval)));

    assert!(drain(&mut outputs).is_empty());
    assert!(Arc::ptr_eq(&before, &mgr.latest_state()));
}
