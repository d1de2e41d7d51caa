//! Load test orchestration against an external engine session.
//!
//! The model is registered through a `ModelBuilder`, then the footing is
//! loaded in equal increments. Every step tries the configured algorithms in
//! order; a step no algorithm can converge ends the test and the steps before
//! it are kept.

use std::{
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
};

use indicatif::ProgressBar;
use log::{debug, info, warn};
use nalgebra::Vector3;

use crate::{
    boundary::{self, BoundaryConditions},
    config::ModelConfig,
    datatypes::{MaterialId, NodeTag},
    error::FootingError,
    materials,
    mesher::MeshBuild,
    session::{
        Algorithm, AnalysisSession, AnalysisSetup, MaterialModel, ModelBuilder, NodalLoad,
        ScriptSession, StepOutcome,
    },
};

#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Converged,
    Diverged,
    /// The engine raised an error instead of reporting a result.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub algorithm: Algorithm,
    pub outcome: AttemptOutcome,
}

/// Ordered list of algorithms tried on each step.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackPolicy {
    algorithms: Vec<Algorithm>,
}

impl FallbackPolicy {
    pub fn new(algorithms: Vec<Algorithm>) -> Result<FallbackPolicy, FootingError> {
        if algorithms.is_empty() {
            return Err(FootingError::Solver(
                "no solution algorithm configured".to_owned(),
            ));
        }
        Ok(FallbackPolicy { algorithms })
    }

    pub fn primary(&self) -> Algorithm {
        self.algorithms[0]
    }

    pub fn algorithms(&self) -> &[Algorithm] {
        &self.algorithms
    }

    /// Runs one step, trying algorithms until one converges. Every attempt is
    /// recorded. After a fallback the primary algorithm is restored.
    pub fn run_step<S: AnalysisSession>(&self, session: &mut S) -> Vec<Attempt> {
        let mut attempts = Vec::new();

        for &algorithm in &self.algorithms {
            let outcome = match session
                .set_algorithm(algorithm)
                .and_then(|_| session.analyze())
            {
                Ok(StepOutcome::Converged) => AttemptOutcome::Converged,
                Ok(StepOutcome::Diverged) => AttemptOutcome::Diverged,
                Err(err) => AttemptOutcome::Failed(err.to_string()),
            };
            debug!("{} -> {:?}", algorithm.name(), outcome);

            let converged = outcome == AttemptOutcome::Converged;
            attempts.push(Attempt { algorithm, outcome });
            if converged {
                break;
            }
        }

        if attempts.len() > 1 {
            if let Err(err) = session.set_algorithm(self.primary()) {
                warn!(
                    target: "solver",
                    "could not restore {}: {err}",
                    self.primary().name()
                );
            }
        }

        attempts
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    pub step: usize,
    /// Load carried by the modeled domain, kN.
    pub model_load: f64,
    /// Load on the whole physical footing, kN.
    pub total_load: f64,
    /// Mean downward displacement of the load nodes in mm, when converged.
    pub settlement: Option<f64>,
    pub attempts: Vec<Attempt>,
}

impl StepRecord {
    pub fn converged(&self) -> bool {
        self.settlement.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadTestResult {
    pub steps: Vec<StepRecord>,
    /// Step that failed to converge, if the test stopped early.
    pub halted_at: Option<usize>,
}

impl LoadTestResult {
    pub fn converged_steps(&self) -> impl Iterator<Item = &StepRecord> {
        self.steps.iter().filter(|s| s.converged())
    }

    pub fn last_converged(&self) -> Option<&StepRecord> {
        self.converged_steps().last()
    }

    /// `(total load kN, settlement mm)` for every converged step.
    pub fn curve(&self) -> Vec<(f64, f64)> {
        self.converged_steps()
            .filter_map(|s| s.settlement.map(|u| (s.total_load, u)))
            .collect()
    }
}

/// Material registered for an id, with the models the engine turned down.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialAssignment {
    pub material: MaterialId,
    pub model: MaterialModel,
    pub rejected: Vec<(&'static str, String)>,
}

fn define_with_fallback<S: ModelBuilder>(
    session: &mut S,
    material: MaterialId,
    candidates: Vec<MaterialModel>,
) -> Result<MaterialAssignment, FootingError> {
    let mut rejected = Vec::new();
    for model in candidates {
        match session.define_material(material, &model) {
            Ok(()) => {
                if !rejected.is_empty() {
                    warn!(
                        target: "solver",
                        "material {material} fell back to {}",
                        model.name()
                    );
                }
                return Ok(MaterialAssignment {
                    material,
                    model,
                    rejected,
                });
            }
            Err(FootingError::Unsupported(reason)) => rejected.push((model.name(), reason)),
            Err(err) => return Err(err),
        }
    }

    Err(FootingError::Unsupported(format!(
        "material model for material {material} ({})",
        rejected
            .iter()
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join(", ")
    )))
}

/// Registers materials, nodes, elements and supports with the engine.
///
/// # Arguments
/// * `session` - Engine handle
/// * `config` - The model record
/// * `build` - The finished mesh
/// * `conditions` - Support conditions for every node
///
/// # Returns
/// The material model chosen for each material id
pub fn register_model<S: ModelBuilder>(
    session: &mut S,
    config: &ModelConfig,
    build: &MeshBuild,
    conditions: &BoundaryConditions,
) -> Result<Vec<MaterialAssignment>, FootingError> {
    let mut assignments = Vec::new();
    for layer in config.stratigraphy.layers() {
        assignments.push(define_with_fallback(
            session,
            layer.material,
            materials::soil_candidates(&layer.params),
        )?);
    }
    assignments.push(define_with_fallback(
        session,
        config.footing_material.material,
        vec![materials::elastic(&config.footing_material.params)],
    )?);

    info!(
        "registering {} nodes and {} elements",
        build.mesh.node_count(),
        build.mesh.element_count()
    );
    for node in build.mesh.nodes() {
        session.define_node(node)?;
    }
    for element in &build.mesh.elements {
        session.define_element(element)?;
    }
    for constraint in conditions.fixed() {
        session.fix(constraint.tag, constraint.fixity)?;
    }

    Ok(assignments)
}

/// Reference load pattern: the modeled share of the maximum load spread
/// evenly over the load nodes, pointing down.
pub fn nodal_loads(
    config: &ModelConfig,
    load_nodes: &[NodeTag],
) -> Result<Vec<NodalLoad>, FootingError> {
    if load_nodes.is_empty() {
        return Err(FootingError::Solver("footing has no load nodes".to_owned()));
    }
    let model_load = config.load_test.max_load / config.domain.symmetry.load_factor();
    let per_node = -model_load / load_nodes.len() as f64;

    Ok(load_nodes
        .iter()
        .map(|&node| NodalLoad {
            node,
            force: Vector3::new(0.0, 0.0, per_node),
        })
        .collect())
}

pub fn analysis_setup(config: &ModelConfig) -> AnalysisSetup {
    AnalysisSetup {
        tolerance: config.analysis.tolerance,
        max_iterations: config.analysis.max_iterations,
        load_increment: 1.0 / config.load_test.num_steps as f64,
    }
}

/// Mean downward displacement of `nodes`, in mm.
pub fn settlement<S: AnalysisSession>(
    session: &mut S,
    nodes: &[NodeTag],
) -> Result<f64, FootingError> {
    let mut sum = 0.0;
    for &node in nodes {
        sum += session.vertical_displacement(node)?;
    }
    Ok(-1000.0 * sum / nodes.len() as f64)
}

/// Steps the load up to its maximum, halting at the first step no algorithm
/// converges.
pub fn run_load_test<S: AnalysisSession>(
    session: &mut S,
    config: &ModelConfig,
    policy: &FallbackPolicy,
    load_nodes: &[NodeTag],
) -> Result<LoadTestResult, FootingError> {
    let num_steps = config.load_test.num_steps;
    let factor = config.domain.symmetry.load_factor();
    let step_load = config.load_test.max_load / factor / num_steps as f64;

    session.set_algorithm(policy.primary())?;

    let mut result = LoadTestResult {
        steps: Vec::with_capacity(num_steps),
        halted_at: None,
    };
    info!("applying {} load steps", num_steps);
    let bar = ProgressBar::new(num_steps as u64);
    for step in 1..=num_steps {
        let attempts = policy.run_step(session);
        let converged = attempts
            .last()
            .map_or(false, |a| a.outcome == AttemptOutcome::Converged);

        let model_load = step_load * step as f64;
        let settlement = if converged {
            Some(settlement(session, load_nodes)?)
        } else {
            None
        };
        result.steps.push(StepRecord {
            step,
            model_load,
            total_load: model_load * factor,
            settlement,
            attempts,
        });
        bar.inc(1);

        if !converged {
            bar.abandon();
            warn!(
                target: "solver",
                "step {step} did not converge with any algorithm, stopping at {:.2} kN",
                model_load * factor
            );
            result.halted_at = Some(step);
            return Ok(result);
        }
    }
    bar.finish();

    if let Some(last) = result.last_converged() {
        info!(
            "load test complete: {:.2} kN, settlement {:.4} mm",
            last.total_load,
            last.settlement.unwrap_or_default()
        );
    }
    Ok(result)
}

/// Registers the model and runs the load test.
pub fn run<S: AnalysisSession>(
    session: &mut S,
    config: &ModelConfig,
    build: &MeshBuild,
) -> Result<LoadTestResult, FootingError> {
    let policy = FallbackPolicy::new(config.analysis.algorithms.clone())?;
    let conditions = boundary::classify(&build.mesh, &config.extents(), config.domain.symmetry);

    register_model(session, config, build, &conditions)?;
    session.apply_loads(&nodal_loads(config, &build.load_nodes)?)?;
    session.configure(&analysis_setup(config))?;

    run_load_test(session, config, &policy, &build.load_nodes)
}

/// Writes a self-contained Tcl deck running the whole load test.
pub fn write_deck(
    config: &ModelConfig,
    build: &MeshBuild,
    dir: &Path,
) -> Result<PathBuf, FootingError> {
    let path = dir.join(format!("{}.tcl", config.output.filename));
    let file = File::create(&path).map_err(|err| FootingError::io(&path, err))?;

    let mut session = ScriptSession::new(BufWriter::new(file))?;
    let conditions = boundary::classify(&build.mesh, &config.extents(), config.domain.symmetry);

    session.comment("materials, nodes, elements and supports")?;
    register_model(&mut session, config, build, &conditions)?;
    session.comment("footing load")?;
    session.apply_loads(&nodal_loads(config, &build.load_nodes)?)?;
    session.comment("analysis")?;
    session.configure(&analysis_setup(config))?;
    session.write_load_steps(
        config.load_test.num_steps,
        &config.analysis.algorithms,
        &build.load_nodes,
        config.load_test.max_load / config.load_test.num_steps as f64,
    )?;
    session.finish()?;

    info!("wrote analysis deck {}", path.display());
    Ok(path)
}
