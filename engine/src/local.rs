//! In-process environment backed by a pluggable solver.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use arche_core::{FieldSamples, decode_non_empty};
use arche_types::{FileId, Model, NodeId, Remote, Solution, SolutionId};
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;

use crate::config::EngineConfig;
use crate::drive::{Drive, File};
use crate::environment::{EnvFut, Environment, EnvironmentError};

/// Name of the series written by [`LocalEnvironment::resolve`].
pub const STRESS_SERIES: &str = "stress";

/// Numerical solver run on the blocking pool.
pub trait SolverBackend: Send + Sync + 'static {
    type Field: FieldEvaluator;

    fn solve(&self, model: &Model) -> anyhow::Result<Self::Field>;
}

/// Solved field, queried point by point.
pub trait FieldEvaluator: Send + Sync + 'static {
    /// Stress tensor `[xx, xy, xz, yy, yz, zz]` at `point`.
    fn stress_at(&self, point: [f64; 3]) -> anyhow::Result<[f64; 6]>;
}

type ModelKey = [u8; 32];

fn model_key(model: &Model) -> Result<ModelKey, EnvironmentError> {
    let bytes = serde_json::to_vec(model)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hasher.finalize().into())
}

/// Environment solving in-process.
///
/// Solves are memoized per instance by a hash of the model content, and
/// concurrent solves of the same model share a single computation.
pub struct LocalEnvironment<B: SolverBackend> {
    drive: Arc<dyn Drive>,
    folder_id: String,
    backend: Arc<B>,
    memoize: bool,
    solutions: Mutex<HashMap<ModelKey, Arc<OnceCell<Solution>>>>,
    fields: RwLock<HashMap<SolutionId, Arc<B::Field>>>,
}

impl<B: SolverBackend> LocalEnvironment<B> {
    pub fn new(drive: Arc<dyn Drive>, folder_id: impl Into<String>, backend: B) -> Self {
        Self {
            drive,
            folder_id: folder_id.into(),
            backend: Arc::new(backend),
            memoize: true,
            solutions: Mutex::new(HashMap::new()),
            fields: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(
        drive: Arc<dyn Drive>,
        folder_id: impl Into<String>,
        backend: B,
        config: &EngineConfig,
    ) -> Self {
        Self::new(drive, folder_id, backend).with_memoization(config.memoize_solutions)
    }

    #[must_use]
    pub fn with_memoization(mut self, memoize: bool) -> Self {
        self.memoize = memoize;
        self
    }

    async fn compute(&self, model: Arc<Model>) -> Result<Solution, EnvironmentError> {
        let backend = Arc::clone(&self.backend);
        let field = tokio::task::spawn_blocking(move || backend.solve(&model))
            .await
            .map_err(|e| EnvironmentError::Backend(anyhow::anyhow!("solver task failed: {e}")))?
            .map_err(EnvironmentError::Backend)?;

        let solution = Solution::new(SolutionId::random());
        self.fields
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(solution.solution_id.clone(), Arc::new(field));
        tracing::debug!(solution = %solution.solution_id, "Local solve finished");
        Ok(solution)
    }

    fn field(&self, solution_id: &SolutionId) -> Option<Arc<B::Field>> {
        self.fields
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(solution_id)
            .cloned()
    }
}

impl<B: SolverBackend> Environment for LocalEnvironment<B> {
    fn drive(&self) -> Arc<dyn Drive> {
        Arc::clone(&self.drive)
    }

    fn folder_id(&self) -> &str {
        &self.folder_id
    }

    fn solve(&self, model: Arc<Model>) -> EnvFut<'_, Solution> {
        Box::pin(async move {
            if !self.memoize {
                return self.compute(model).await;
            }
            let key = model_key(&model)?;
            let cell = {
                let mut solutions = self.solutions.lock().unwrap_or_else(PoisonError::into_inner);
                Arc::clone(solutions.entry(key).or_default())
            };
            if let Some(solution) = cell.get() {
                tracing::debug!(solution = %solution.solution_id, "Reusing memoized solution");
                return Ok(solution.clone());
            }
            cell.get_or_try_init(|| self.compute(model))
                .await
                .cloned()
        })
    }

    fn resolve<'a>(
        &'a self,
        solution: &'a Solution,
        _owner_id: &'a str,
        mesh_id: &'a NodeId,
        mesh_file_id: &'a FileId,
    ) -> EnvFut<'a, File> {
        Box::pin(async move {
            let field =
                self.field(&solution.solution_id)
                    .ok_or_else(|| EnvironmentError::UnknownSolution {
                        solution_id: solution.solution_id.clone(),
                    })?;
            let content = self.drive.read_as_text(mesh_file_id).await?;
            let points: Vec<[f64; 3]> = decode_non_empty(&content)?
                .iter()
                .flat_map(|surface| surface.points().collect::<Vec<_>>())
                .collect();

            let rows = tokio::task::spawn_blocking(move || {
                points
                    .into_iter()
                    .map(|p| field.stress_at(p).map(Vec::from))
                    .collect::<anyhow::Result<Vec<_>>>()
            })
            .await
            .map_err(|e| EnvironmentError::Backend(anyhow::anyhow!("resolve task failed: {e}")))?
            .map_err(EnvironmentError::Backend)?;

            let mut samples = FieldSamples::default();
            samples.series.insert(STRESS_SERIES.to_string(), rows);
            let name = format!("{mesh_id}-realization-{}", solution.solution_id);
            let file = self
                .drive
                .create_file(&self.folder_id, &name, samples.to_json()?)
                .await?;
            Ok(file)
        })
    }
}

/// Backend returning the homogeneous far-field stress of the model's remotes.
///
/// Discontinuities are ignored: the field is the superposition of every
/// Andersonian remote, constant in space.
#[derive(Debug, Clone, Copy, Default)]
pub struct FarFieldBackend;

/// Constant stress tensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniformField(pub [f64; 6]);

impl SolverBackend for FarFieldBackend {
    type Field = UniformField;

    fn solve(&self, model: &Model) -> anyhow::Result<UniformField> {
        let mut total = [0.0; 6];
        for remote in &model.remotes {
            let Remote::Andersonian(p) = remote;
            let (sin, cos) = p.theta.to_radians().sin_cos();
            let tensor = [
                p.h_sigma_max * cos * cos + p.h_sigma_min * sin * sin,
                (p.h_sigma_max - p.h_sigma_min) * sin * cos,
                0.0,
                p.h_sigma_max * sin * sin + p.h_sigma_min * cos * cos,
                0.0,
                p.v_sigma,
            ];
            for (acc, v) in total.iter_mut().zip(tensor) {
                *acc += v;
            }
        }
        Ok(UniformField(total))
    }
}

impl FieldEvaluator for UniformField {
    fn stress_at(&self, _point: [f64; 3]) -> anyhow::Result<[f64; 6]> {
        Ok(self.0)
    }
}
