//! Narrow interface to the external finite element engine.
//!
//! The engine is reached through an explicit session handle rather than
//! global state. `ModelBuilder` covers model definition, `AnalysisSession`
//! adds stepping and result queries. `ScriptSession` renders the same calls
//! as an OpenSees Tcl deck.

use std::io::Write;

use nalgebra::Vector3;

use crate::{
    datatypes::{Element, Fixity, MaterialId, Node, NodeTag},
    error::FootingError,
};

/// Nonlinear solution algorithms the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    Newton,
    /// Modified Newton with the initial tangent.
    ModifiedNewton,
    NewtonLineSearch,
    KrylovNewton,
}

impl Algorithm {
    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Newton => "Newton",
            Algorithm::ModifiedNewton => "ModifiedNewton",
            Algorithm::NewtonLineSearch => "NewtonLineSearch",
            Algorithm::KrylovNewton => "KrylovNewton",
        }
    }

    pub fn from_name(name: &str) -> Option<Algorithm> {
        match name {
            "Newton" => Some(Algorithm::Newton),
            "ModifiedNewton" => Some(Algorithm::ModifiedNewton),
            "NewtonLineSearch" => Some(Algorithm::NewtonLineSearch),
            "KrylovNewton" => Some(Algorithm::KrylovNewton),
            _ => None,
        }
    }

    /// Arguments of the engine's `algorithm` command.
    pub fn command(self) -> &'static str {
        match self {
            Algorithm::ModifiedNewton => "ModifiedNewton -initial",
            other => other.name(),
        }
    }
}

/// Result the engine reports for one analysis step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Converged,
    Diverged,
}

/// Constitutive model handed to the engine, in engine units (kPa, t/m3).
#[derive(Debug, Clone, PartialEq)]
pub enum MaterialModel {
    ElasticIsotropic {
        youngs_modulus: f64,
        poisson_ratio: f64,
        density: f64,
    },
    DruckerPrager {
        bulk_modulus: f64,
        shear_modulus: f64,
        /// Cohesion term `k`.
        yield_stress: f64,
        /// Friction term `alpha`, also used for dilatancy.
        friction: f64,
        density: f64,
    },
}

impl MaterialModel {
    pub fn name(&self) -> &'static str {
        match self {
            MaterialModel::ElasticIsotropic { .. } => "ElasticIsotropic",
            MaterialModel::DruckerPrager { .. } => "DruckerPrager",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodalLoad {
    pub node: NodeTag,
    pub force: Vector3<f64>,
}

/// Analysis controls sent once before stepping.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisSetup {
    pub tolerance: f64,
    pub max_iterations: usize,
    /// Load factor increment per step.
    pub load_increment: f64,
}

pub trait ModelBuilder {
    fn define_node(&mut self, node: &Node) -> Result<(), FootingError>;

    /// Fails with `FootingError::Unsupported` when the engine lacks the model.
    fn define_material(&mut self, tag: MaterialId, model: &MaterialModel)
        -> Result<(), FootingError>;

    fn define_element(&mut self, element: &Element) -> Result<(), FootingError>;

    fn fix(&mut self, node: NodeTag, fixity: Fixity) -> Result<(), FootingError>;

    /// Registers the reference load pattern, scaled by the load factor.
    fn apply_loads(&mut self, loads: &[NodalLoad]) -> Result<(), FootingError>;

    fn configure(&mut self, setup: &AnalysisSetup) -> Result<(), FootingError>;
}

pub trait AnalysisSession: ModelBuilder {
    fn set_algorithm(&mut self, algorithm: Algorithm) -> Result<(), FootingError>;

    /// Advances one load increment.
    fn analyze(&mut self) -> Result<StepOutcome, FootingError>;

    /// Current displacement of `node` along z, in metres.
    fn vertical_displacement(&mut self, node: NodeTag) -> Result<f64, FootingError>;
}

/// Writes engine commands as a Tcl deck.
pub struct ScriptSession<W: Write> {
    writer: W,
}

fn write_err(err: std::io::Error) -> FootingError {
    FootingError::Solver(format!("failed to write deck: {err}"))
}

impl<W: Write> ScriptSession<W> {
    /// Starts a fresh three-dimensional, three-dof model.
    pub fn new(mut writer: W) -> Result<ScriptSession<W>, FootingError> {
        writeln!(writer, "wipe").map_err(write_err)?;
        writeln!(writer, "model BasicBuilder -ndm 3 -ndf 3").map_err(write_err)?;
        Ok(ScriptSession { writer })
    }

    pub fn comment(&mut self, text: &str) -> Result<(), FootingError> {
        writeln!(self.writer, "\n# {text}").map_err(write_err)
    }

    /// Emits the stepping loop with per-step algorithm fallback and a
    /// settlement printout for every converged step.
    ///
    /// # Arguments
    /// * `steps` - Number of load increments
    /// * `algorithms` - Fallback order, the first one is restored after each step
    /// * `load_nodes` - Nodes whose mean vertical displacement is the settlement
    /// * `step_load` - Physical load added per step, in kN
    pub fn write_load_steps(
        &mut self,
        steps: usize,
        algorithms: &[Algorithm],
        load_nodes: &[NodeTag],
        step_load: f64,
    ) -> Result<(), FootingError> {
        let primary = algorithms.first().ok_or_else(|| {
            FootingError::Solver("no solution algorithm configured".to_owned())
        })?;
        let w = &mut self.writer;

        let names: Vec<String> = algorithms
            .iter()
            .map(|a| format!("{{{}}}", a.command()))
            .collect();
        writeln!(w, "\nset algorithms [list {}]", names.join(" ")).map_err(write_err)?;
        let nodes: Vec<String> = load_nodes.iter().map(|n| n.to_string()).collect();
        writeln!(w, "set load_nodes [list {}]", nodes.join(" ")).map_err(write_err)?;
        writeln!(w, "puts \"step load_kN settlement_mm\"").map_err(write_err)?;
        writeln!(w, "for {{set step 1}} {{$step <= {steps}}} {{incr step}} {{").map_err(write_err)?;
        writeln!(w, "    set ok -1").map_err(write_err)?;
        writeln!(w, "    foreach algo $algorithms {{").map_err(write_err)?;
        writeln!(w, "        eval algorithm $algo").map_err(write_err)?;
        writeln!(w, "        set ok [analyze 1]").map_err(write_err)?;
        writeln!(w, "        if {{$ok == 0}} break").map_err(write_err)?;
        writeln!(w, "    }}").map_err(write_err)?;
        writeln!(w, "    algorithm {}", primary.command()).map_err(write_err)?;
        writeln!(w, "    if {{$ok != 0}} {{").map_err(write_err)?;
        writeln!(w, "        puts \"step $step did not converge, stopping\"").map_err(write_err)?;
        writeln!(w, "        break").map_err(write_err)?;
        writeln!(w, "    }}").map_err(write_err)?;
        writeln!(w, "    set uz 0.0").map_err(write_err)?;
        writeln!(w, "    foreach n $load_nodes {{ set uz [expr {{$uz + [nodeDisp $n 3]}}] }}")
            .map_err(write_err)?;
        writeln!(
            w,
            "    puts \"$step [expr {{$step * {step_load}}}] [expr {{-1000.0 * $uz / [llength $load_nodes]}}]\""
        )
        .map_err(write_err)?;
        writeln!(w, "}}").map_err(write_err)?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<W, FootingError> {
        self.writer.flush().map_err(write_err)?;
        Ok(self.writer)
    }
}

impl<W: Write> ModelBuilder for ScriptSession<W> {
    fn define_node(&mut self, node: &Node) -> Result<(), FootingError> {
        let p = node.position;
        writeln!(self.writer, "node {} {} {} {}", node.tag, p.x, p.y, p.z).map_err(write_err)
    }

    fn define_material(
        &mut self,
        tag: MaterialId,
        model: &MaterialModel,
    ) -> Result<(), FootingError> {
        match *model {
            MaterialModel::ElasticIsotropic {
                youngs_modulus,
                poisson_ratio,
                density,
            } => writeln!(
                self.writer,
                "nDMaterial ElasticIsotropic {tag} {youngs_modulus} {poisson_ratio} {density}"
            ),
            MaterialModel::DruckerPrager {
                bulk_modulus,
                shear_modulus,
                yield_stress,
                friction,
                density,
            } => writeln!(
                self.writer,
                "nDMaterial DruckerPrager {tag} {bulk_modulus} {shear_modulus} {yield_stress} {friction} {friction} 0.0 0.0 0.0 0.0 0.0 1.0 {density}"
            ),
        }
        .map_err(write_err)
    }

    fn define_element(&mut self, element: &Element) -> Result<(), FootingError> {
        write!(self.writer, "element {} {}", element.kind.solver_name(), element.tag)
            .map_err(write_err)?;
        for node in &element.nodes {
            write!(self.writer, " {node}").map_err(write_err)?;
        }
        writeln!(self.writer, " {}", element.material).map_err(write_err)
    }

    fn fix(&mut self, node: NodeTag, fixity: Fixity) -> Result<(), FootingError> {
        let [x, y, z] = fixity.flags();
        writeln!(self.writer, "fix {node} {x} {y} {z}").map_err(write_err)
    }

    fn apply_loads(&mut self, loads: &[NodalLoad]) -> Result<(), FootingError> {
        writeln!(self.writer, "timeSeries Linear 1").map_err(write_err)?;
        writeln!(self.writer, "pattern Plain 1 1 {{").map_err(write_err)?;
        for load in loads {
            let f = load.force;
            writeln!(self.writer, "    load {} {} {} {}", load.node, f.x, f.y, f.z)
                .map_err(write_err)?;
        }
        writeln!(self.writer, "}}").map_err(write_err)
    }

    fn configure(&mut self, setup: &AnalysisSetup) -> Result<(), FootingError> {
        let w = &mut self.writer;
        writeln!(w, "constraints Transformation").map_err(write_err)?;
        writeln!(w, "numberer RCM").map_err(write_err)?;
        writeln!(w, "system BandGeneral").map_err(write_err)?;
        writeln!(
            w,
            "test NormDispIncr {} {}",
            setup.tolerance, setup.max_iterations
        )
        .map_err(write_err)?;
        writeln!(w, "integrator LoadControl {}", setup.load_increment).map_err(write_err)?;
        writeln!(w, "analysis Static").map_err(write_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    fn render(f: impl FnOnce(&mut ScriptSession<Vec<u8>>)) -> String {
        let mut session = ScriptSession::new(Vec::new()).unwrap();
        f(&mut session);
        String::from_utf8(session.finish().unwrap()).unwrap()
    }

    #[test]
    fn algorithm_names_round_trip() {
        for a in [
            Algorithm::Newton,
            Algorithm::ModifiedNewton,
            Algorithm::NewtonLineSearch,
            Algorithm::KrylovNewton,
        ] {
            assert_eq!(Algorithm::from_name(a.name()), Some(a));
        }
        assert_eq!(Algorithm::ModifiedNewton.command(), "ModifiedNewton -initial");
        assert_eq!(Algorithm::from_name("BFGS"), None);
    }

    #[test]
    fn renders_model_commands() {
        let deck = render(|s| {
            s.define_node(&Node {
                tag: 1,
                position: Point3::new(0.0, 1.5, -2.0),
            })
            .unwrap();
            s.define_material(
                4,
                &MaterialModel::ElasticIsotropic {
                    youngs_modulus: 2.5e7,
                    poisson_ratio: 0.2,
                    density: 2.4,
                },
            )
            .unwrap();
            s.fix(1, Fixity::new(true, true, false)).unwrap();
            s.apply_loads(&[NodalLoad {
                node: 1,
                force: Vector3::new(0.0, 0.0, -10.0),
            }])
            .unwrap();
        });

        assert!(deck.starts_with("wipe\nmodel BasicBuilder -ndm 3 -ndf 3\n"));
        assert!(deck.contains("node 1 0 1.5 -2\n"));
        assert!(deck.contains("nDMaterial ElasticIsotropic 4 25000000 0.2 2.4\n"));
        assert!(deck.contains("fix 1 1 1 0\n"));
        assert!(deck.contains("    load 1 0 0 -10\n"));
    }

    #[test]
    fn load_steps_restore_the_primary_algorithm() {
        let deck = render(|s| {
            s.write_load_steps(
                20,
                &[Algorithm::Newton, Algorithm::ModifiedNewton],
                &[3, 4],
                50.0,
            )
            .unwrap();
        });

        assert!(deck.contains("set algorithms [list {Newton} {ModifiedNewton -initial}]"));
        assert!(deck.contains("set load_nodes [list 3 4]"));
        assert!(deck.contains("for {set step 1} {$step <= 20} {incr step} {"));
        assert!(deck.contains("    algorithm Newton\n"));
    }
}
