mod common;

use approx::assert_relative_eq;
use footing::{
    mesher, post_processor,
    session::Algorithm,
    solver::{self, AttemptOutcome},
};

use common::{quarter_config, SpringSession};

#[test]
fn registers_the_whole_model() {
    let config = quarter_config();
    let build = mesher::run(&config).unwrap();
    let mut session = SpringSession::new(0.01);

    solver::run(&mut session, &config, &build).unwrap();

    assert_eq!(session.nodes, build.mesh.node_count());
    assert_eq!(session.elements, build.mesh.element_count());
    // base, symmetry and lateral nodes
    assert_eq!(session.fixes.len(), 121 + 399 + 380);
    assert_eq!(
        session.materials,
        vec![
            (1, "DruckerPrager"),
            (2, "DruckerPrager"),
            (3, "ElasticIsotropic"),
            (4, "ElasticIsotropic"),
        ]
    );

    // a quarter of the load, spread evenly over the footing top
    assert_eq!(session.loads.len(), 25);
    let total: f64 = session.loads.iter().map(|l| l.force.z).sum();
    assert_relative_eq!(total, -250.0, epsilon = 1e-9);
    assert_relative_eq!(session.setup.unwrap().load_increment, 0.25);
}

#[test]
fn settlement_grows_with_every_step() {
    let config = quarter_config();
    let build = mesher::run(&config).unwrap();
    let mut session = SpringSession::new(0.01);

    let result = solver::run(&mut session, &config, &build).unwrap();

    assert_eq!(result.halted_at, None);
    assert_eq!(result.steps.len(), 4);
    let curve = result.curve();
    assert_relative_eq!(curve[0].0, 250.0);
    assert_relative_eq!(curve[0].1, 2.5, epsilon = 1e-9);
    assert_relative_eq!(curve[3].0, 1000.0);
    assert_relative_eq!(curve[3].1, 10.0, epsilon = 1e-9);
    assert_relative_eq!(result.steps[3].model_load, 250.0);

    let summary = post_processor::summarize(&config, &result).unwrap();
    assert_eq!(summary.converged_steps, 4);
    assert_relative_eq!(summary.contact_pressure, 1000.0 / 9.0, epsilon = 1e-9);
    assert_relative_eq!(
        summary.subgrade_modulus.unwrap(),
        1000.0 / 9.0 / 0.01,
        epsilon = 1e-6
    );
    assert_relative_eq!(summary.secant_stiffness.unwrap(), 100.0, epsilon = 1e-9);
}

#[test]
fn fallback_algorithm_rescues_a_step() {
    let config = quarter_config();
    let build = mesher::run(&config).unwrap();
    let mut session = SpringSession::new(0.01);
    session.diverging.insert((2, Algorithm::Newton));

    let result = solver::run(&mut session, &config, &build).unwrap();

    assert_eq!(result.halted_at, None);
    let step = &result.steps[1];
    assert_eq!(step.attempts.len(), 2);
    assert_eq!(step.attempts[0].outcome, AttemptOutcome::Diverged);
    assert_eq!(step.attempts[1].algorithm, Algorithm::ModifiedNewton);
    assert_eq!(step.attempts[1].outcome, AttemptOutcome::Converged);

    // Newton is back in charge for the next step
    assert_eq!(result.steps[2].attempts.len(), 1);
    assert_eq!(result.steps[2].attempts[0].algorithm, Algorithm::Newton);
    assert!(session
        .algorithm_log
        .windows(2)
        .any(|w| w == [Algorithm::ModifiedNewton, Algorithm::Newton]));
}

#[test]
fn non_convergence_halts_and_keeps_earlier_steps() {
    let config = quarter_config();
    let build = mesher::run(&config).unwrap();
    let mut session = SpringSession::new(0.01);
    session.fail_from = Some(3);

    let result = solver::run(&mut session, &config, &build).unwrap();

    assert_eq!(result.halted_at, Some(3));
    assert_eq!(result.steps.len(), 3);
    assert_eq!(result.converged_steps().count(), 2);

    let failed = &result.steps[2];
    assert!(!failed.converged());
    assert_eq!(failed.attempts.len(), config.analysis.algorithms.len());
    assert!(failed
        .attempts
        .iter()
        .all(|a| a.outcome == AttemptOutcome::Diverged));

    let summary = post_processor::summarize(&config, &result).unwrap();
    assert_eq!(summary.halted_at, Some(3));
    assert_relative_eq!(summary.final_load, 500.0);
    assert_relative_eq!(summary.final_settlement, 5.0, epsilon = 1e-9);
}

#[test]
fn unsupported_plasticity_falls_back_to_elastic() {
    let config = quarter_config();
    let build = mesher::run(&config).unwrap();
    let mut session = SpringSession::new(0.01);
    session.rejects_drucker_prager = true;

    solver::run(&mut session, &config, &build).unwrap();

    assert!(session
        .materials
        .iter()
        .all(|(_, name)| *name == "ElasticIsotropic"));
    assert_eq!(session.materials.len(), 4);
}

#[test]
fn nothing_converged_gives_no_summary() {
    let config = quarter_config();
    let build = mesher::run(&config).unwrap();
    let mut session = SpringSession::new(0.01);
    session.fail_from = Some(1);

    let result = solver::run(&mut session, &config, &build).unwrap();

    assert_eq!(result.halted_at, Some(1));
    assert!(post_processor::summarize(&config, &result).is_none());
}
