//! Conversion of layer parameters into engine material models.

use crate::{datatypes::MaterialParams, session::MaterialModel};

/// Bulk modulus K = E / (3 (1 - 2 nu)).
pub fn bulk_modulus(youngs_modulus: f64, poisson_ratio: f64) -> f64 {
    youngs_modulus / (3.0 * (1.0 - 2.0 * poisson_ratio))
}

/// Shear modulus G = E / (2 (1 + nu)).
pub fn shear_modulus(youngs_modulus: f64, poisson_ratio: f64) -> f64 {
    youngs_modulus / (2.0 * (1.0 + poisson_ratio))
}

/// Drucker-Prager `(alpha, k)` matching Mohr-Coulomb in triaxial compression.
///
/// # Arguments
/// * `cohesion` - Cohesion in kPa
/// * `friction_angle` - Friction angle in degrees
pub fn drucker_prager_parameters(cohesion: f64, friction_angle: f64) -> (f64, f64) {
    let phi = friction_angle.to_radians();
    let denominator = 3.0_f64.sqrt() * (3.0 - phi.sin());
    let alpha = 2.0 * phi.sin() / denominator;
    let k = 6.0 * cohesion * phi.cos() / denominator;
    (alpha, k)
}

/// kg/m3 to the engine's t/m3.
pub fn engine_density(density: f64) -> f64 {
    density / 1000.0
}

pub fn elastic(params: &MaterialParams) -> MaterialModel {
    MaterialModel::ElasticIsotropic {
        youngs_modulus: params.youngs_modulus,
        poisson_ratio: params.poisson_ratio,
        density: engine_density(params.density),
    }
}

/// Models to try for a soil layer, most capable first. Layers with strength
/// parameters try Drucker-Prager before falling back to linear elasticity.
pub fn soil_candidates(params: &MaterialParams) -> Vec<MaterialModel> {
    let mut candidates = Vec::with_capacity(2);
    if let (Some(cohesion), Some(friction_angle)) = (params.cohesion, params.friction_angle) {
        let (alpha, k) = drucker_prager_parameters(cohesion, friction_angle);
        candidates.push(MaterialModel::DruckerPrager {
            bulk_modulus: bulk_modulus(params.youngs_modulus, params.poisson_ratio),
            shear_modulus: shear_modulus(params.youngs_modulus, params.poisson_ratio),
            yield_stress: k,
            friction: alpha,
            density: engine_density(params.density),
        });
    }
    candidates.push(elastic(params));
    candidates
}
