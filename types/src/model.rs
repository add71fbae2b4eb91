//! Solver input and output handles.

use serde::{Deserialize, Serialize};

use crate::ids::SolutionId;
use crate::params::{BoundaryConditionParams, Constraint, MaterialParams, Remote};

/// One triangulated discontinuity surface with its loading conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Surface {
    pub positions: Vec<f64>,
    pub indices: Vec<u32>,
    pub boundary_condition: BoundaryConditionParams,
    pub constraints: Vec<Constraint>,
}

/// Plain description of the whole project as handed to `solve`.
///
/// Surface and remote order follows tree pre-order, so the same tree always
/// serializes to the same model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub surfaces: Vec<Surface>,
    pub material: MaterialParams,
    pub remotes: Vec<Remote>,
}

/// Opaque handle to a completed solve.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Solution {
    pub solution_id: SolutionId,
}

impl Solution {
    #[must_use]
    pub fn new(solution_id: SolutionId) -> Self {
        Self { solution_id }
    }
}

/// Configuration injected by an upstream producer at manager construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "parameters")]
pub enum Component {
    Material(MaterialParams),
    Remote(Remote),
}
