#![allow(dead_code)]

use std::collections::HashSet;

use footing::{
    config::{parse_config, ModelConfig},
    datatypes::{Element, Fixity, MaterialId, Node, NodeTag},
    error::FootingError,
    session::{
        Algorithm, AnalysisSession, AnalysisSetup, MaterialModel, ModelBuilder, NodalLoad,
        StepOutcome,
    },
};

/// Quarter of a 6 m x 6 m x 10 m block under a 3 m square footing, uniform
/// depth spacing so every lattice level is known in advance.
pub const QUARTER_MODEL: &str = r#"{
    "geometry": {
        "domain": { "Lx": 6.0, "Ly": 6.0, "Lz": 10.0, "quarter_domain": true },
        "footing": { "B": 3.0, "L": 3.0, "Df": 1.5, "tz": 0.5 }
    },
    "soil_layers": [
        { "name": "SOIL_1", "thickness": 5.0, "material_id": 1,
          "E": 10000.0, "nu": 0.35, "rho": 1700.0, "cohesion": 25.0, "friction_angle": 15.0 },
        { "name": "SOIL_2", "thickness": 4.0, "material_id": 2,
          "E": 30000.0, "nu": 0.3, "rho": 1900.0, "cohesion": 10.0, "friction_angle": 30.0 },
        { "name": "SOIL_3", "thickness": 1.0, "material_id": 3,
          "E": 80000.0, "nu": 0.25, "rho": 2100.0 }
    ],
    "footing_material": { "name": "FOOTING", "material_id": 4, "E": 2.5e7, "nu": 0.2, "rho": 2400.0 },
    "mesh_refinement": { "nx_near": 4, "nx_far": 6, "ny_near": 4, "ny_far": 6,
                         "nz": 20, "nz_footing": 1, "depth_grading": 0.0, "merge_tolerance": 0.1 },
    "load_test": { "max_load": 1000.0, "num_steps": 4 },
    "output": { "filename": "footing_quarter", "formats": ["tcl", "vtu"] }
}"#;

pub fn quarter_config() -> ModelConfig {
    parse_config(QUARTER_MODEL).expect("quarter model parses")
}

pub fn full_config() -> ModelConfig {
    let text = QUARTER_MODEL.replace("\"quarter_domain\": true", "\"quarter_domain\": false");
    parse_config(&text).expect("full model parses")
}

/// In-memory engine behaving like a linear spring under the footing.
///
/// Displacement grows with the applied load factor. Steps from `fail_from`
/// on never converge, and `diverging` lists `(step, algorithm)` pairs that
/// diverge once.
#[derive(Debug, Default)]
pub struct SpringSession {
    /// Settlement in metres at the full reference load.
    pub compliance: f64,
    pub fail_from: Option<usize>,
    pub diverging: HashSet<(usize, Algorithm)>,
    pub rejects_drucker_prager: bool,

    pub nodes: usize,
    pub elements: usize,
    pub fixes: Vec<(NodeTag, Fixity)>,
    pub materials: Vec<(MaterialId, &'static str)>,
    pub loads: Vec<NodalLoad>,
    pub setup: Option<AnalysisSetup>,
    pub algorithm_log: Vec<Algorithm>,

    algorithm: Option<Algorithm>,
    load_factor: f64,
    completed_steps: usize,
}

impl SpringSession {
    pub fn new(compliance: f64) -> SpringSession {
        SpringSession {
            compliance,
            ..Default::default()
        }
    }
}

impl ModelBuilder for SpringSession {
    fn define_node(&mut self, _node: &Node) -> Result<(), FootingError> {
        self.nodes += 1;
        Ok(())
    }

    fn define_material(
        &mut self,
        tag: MaterialId,
        model: &MaterialModel,
    ) -> Result<(), FootingError> {
        if self.rejects_drucker_prager && matches!(model, MaterialModel::DruckerPrager { .. }) {
            return Err(FootingError::Unsupported(
                "DruckerPrager is not compiled in".to_owned(),
            ));
        }
        self.materials.push((tag, model.name()));
        Ok(())
    }

    fn define_element(&mut self, _element: &Element) -> Result<(), FootingError> {
        self.elements += 1;
        Ok(())
    }

    fn fix(&mut self, node: NodeTag, fixity: Fixity) -> Result<(), FootingError> {
        self.fixes.push((node, fixity));
        Ok(())
    }

    fn apply_loads(&mut self, loads: &[NodalLoad]) -> Result<(), FootingError> {
        self.loads.extend_from_slice(loads);
        Ok(())
    }

    fn configure(&mut self, setup: &AnalysisSetup) -> Result<(), FootingError> {
        self.setup = Some(setup.clone());
        Ok(())
    }
}

impl AnalysisSession for SpringSession {
    fn set_algorithm(&mut self, algorithm: Algorithm) -> Result<(), FootingError> {
        self.algorithm = Some(algorithm);
        self.algorithm_log.push(algorithm);
        Ok(())
    }

    fn analyze(&mut self) -> Result<StepOutcome, FootingError> {
        let increment = self
            .setup
            .as_ref()
            .map(|s| s.load_increment)
            .ok_or_else(|| FootingError::Solver("analysis not configured".to_owned()))?;
        let algorithm = self
            .algorithm
            .ok_or_else(|| FootingError::Solver("no algorithm set".to_owned()))?;
        let step = self.completed_steps + 1;

        if self.fail_from.map_or(false, |f| step >= f) {
            return Ok(StepOutcome::Diverged);
        }
        if self.diverging.remove(&(step, algorithm)) {
            return Ok(StepOutcome::Diverged);
        }

        self.load_factor += increment;
        self.completed_steps = step;
        Ok(StepOutcome::Converged)
    }

    fn vertical_displacement(&mut self, _node: NodeTag) -> Result<f64, FootingError> {
        Ok(-self.compliance * self.load_factor)
    }
}
