//! Physical parameters carried by tree nodes and forwarded to the solver.

use serde::{Deserialize, Serialize};

/// Linear elastic material of the whole project.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaterialParams {
    pub poisson: f64,
    pub young: f64,
    pub density: f64,
}

impl MaterialParams {
    #[must_use]
    pub const fn new(poisson: f64, young: f64, density: f64) -> Self {
        Self {
            poisson,
            young,
            density,
        }
    }
}

impl Default for MaterialParams {
    /// Material of a freshly created project.
    fn default() -> Self {
        Self::new(0.25, 1.0, 1000.0)
    }
}

/// Whether a displacement component is left free or imposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisKind {
    Free,
    #[default]
    #[serde(alias = "locked")]
    Fixed,
}

/// Value of a boundary condition: a constant or a field expression in `x, y, z`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldSpec {
    Value(f64),
    Expression(String),
}

impl Default for FieldSpec {
    fn default() -> Self {
        Self::Value(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AxisCondition {
    #[serde(rename = "type")]
    pub kind: AxisKind,
    pub field: FieldSpec,
}

impl AxisCondition {
    #[must_use]
    pub fn free() -> Self {
        Self {
            kind: AxisKind::Free,
            field: FieldSpec::Value(0.0),
        }
    }

    #[must_use]
    pub fn fixed(value: f64) -> Self {
        Self {
            kind: AxisKind::Fixed,
            field: FieldSpec::Value(value),
        }
    }
}

/// Boundary condition of a discontinuity, one spec per local axis.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundaryConditionParams {
    pub dip_axis: AxisCondition,
    pub strike_axis: AxisCondition,
    pub normal_axis: AxisCondition,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CoulombParams {
    pub friction: f64,
    pub cohesion: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoulombOrthoParams {
    pub theta: f64,
    pub friction_dip: f64,
    pub friction_strike: f64,
}

/// Frictional constraint applied on a discontinuity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "parameters")]
pub enum Constraint {
    Coulomb(CoulombParams),
    CoulombOrtho(CoulombOrthoParams),
}

impl Constraint {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Coulomb(_) => "coulomb",
            Self::CoulombOrtho(_) => "coulomb-ortho",
        }
    }
}

/// Andersonian far-field stress: principal magnitudes plus azimuth.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AndersonianParams {
    #[serde(rename = "HSigma")]
    pub h_sigma_max: f64,
    #[serde(rename = "hSigma")]
    pub h_sigma_min: f64,
    #[serde(rename = "vSigma")]
    pub v_sigma: f64,
    pub theta: f64,
}

/// Remote stress loading of the model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "parameters")]
pub enum Remote {
    Andersonian(AndersonianParams),
}

impl Remote {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Andersonian(_) => "Andersonian",
        }
    }
}

/// Parameter payload of any parameterised node, as edited through
/// attribute replacement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Parameters {
    Material(MaterialParams),
    BoundaryCondition(BoundaryConditionParams),
    Constraint(Constraint),
    Remote(Remote),
}

impl From<MaterialParams> for Parameters {
    fn from(value: MaterialParams) -> Self {
        Self::Material(value)
    }
}

impl From<BoundaryConditionParams> for Parameters {
    fn from(value: BoundaryConditionParams) -> Self {
        Self::BoundaryCondition(value)
    }
}

impl From<Constraint> for Parameters {
    fn from(value: Constraint) -> Self {
        Self::Constraint(value)
    }
}

impl From<Remote> for Parameters {
    fn from(value: Remote) -> Self {
        Self::Remote(value)
    }
}
