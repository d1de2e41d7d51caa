use std::{
    fmt::Write as _,
    io::Write,
    path::{Path, PathBuf},
};

use log::info;

use crate::{
    config::ModelConfig,
    datatypes::CellKind,
    error::FootingError,
    interchange::{ELEMENTS_FILE, NODES_FILE},
    mesh::Mesh,
    solver::LoadTestResult,
};

pub const MESH_INFO_FILE: &str = "mesh_info.txt";

/// Writes the load-settlement curve to a CSV file
///
/// # Arguments
/// * `result` - The finished load test
/// * `output` - The filename of the output csv
pub fn csv_output(result: &LoadTestResult, output: &Path) -> Result<(), FootingError> {
    let mut file = match std::fs::File::create(output) {
        Ok(f) => f,
        Err(err) => return Err(FootingError::io(output, err)),
    };

    let mut contents = String::from("step,load_kN,settlement_mm,algorithm,attempts\n");
    for step in result.converged_steps() {
        let algorithm = step
            .attempts
            .last()
            .map_or("", |a| a.algorithm.name());
        let _ = writeln!(
            contents,
            "{},{},{},{},{}",
            step.step,
            step.total_load,
            step.settlement.unwrap_or_default(),
            algorithm,
            step.attempts.len()
        );
    }

    file.write_all(contents.as_bytes())
        .map_err(|err| FootingError::io(output, err))?;

    info!("wrote load-settlement curve to {}", output.display());
    Ok(())
}

/// Human-readable description of a mesh: counts, bounds and the element
/// distribution per material.
pub fn mesh_info(mesh: &Mesh, source: &str) -> String {
    let mut text = String::new();
    let rule = "=".repeat(70);

    let _ = writeln!(text, "{rule}\nMESH INFORMATION\n{rule}\n");
    let _ = writeln!(text, "source: {source}\n");
    let _ = writeln!(text, "statistics:");
    let _ = writeln!(text, "  nodes: {}", mesh.node_count());
    let _ = writeln!(text, "  elements: {}", mesh.element_count());
    for kind in [CellKind::Tetrahedron, CellKind::Hexahedron] {
        let count = mesh.elements.iter().filter(|e| e.kind == kind).count();
        if count > 0 {
            let _ = writeln!(text, "  {}: {count}", kind.solver_name());
        }
    }

    if !mesh.nodes().is_empty() {
        let _ = writeln!(text, "\nbounds:");
        for (axis, pick) in [("x", 0), ("y", 1), ("z", 2)] {
            let values = mesh.nodes().iter().map(|n| n.position[pick]);
            let lo = values.clone().fold(f64::INFINITY, f64::min);
            let hi = values.fold(f64::NEG_INFINITY, f64::max);
            let _ = writeln!(text, "  {axis}: [{lo:.3}, {hi:.3}] m");
        }
    }

    let _ = writeln!(text, "\nelements per material:");
    let total = mesh.element_count().max(1) as f64;
    for (material, count) in mesh.material_counts() {
        let _ = writeln!(
            text,
            "  material {material}: {count} ({:.1}%)",
            100.0 * count as f64 / total
        );
    }

    let _ = writeln!(text, "\n{rule}\nfiles:\n{rule}");
    let _ = writeln!(text, "  {NODES_FILE:<14} node definitions");
    let _ = writeln!(text, "  {ELEMENTS_FILE:<14} element definitions");
    let _ = writeln!(text, "  {MESH_INFO_FILE:<14} this file");
    let _ = writeln!(text, "\nsource {NODES_FILE}\nsource {ELEMENTS_FILE}");

    text
}

pub fn write_mesh_info(mesh: &Mesh, source: &str, dir: &Path) -> Result<PathBuf, FootingError> {
    let path = dir.join(MESH_INFO_FILE);
    std::fs::write(&path, mesh_info(mesh, source)).map_err(|err| FootingError::io(&path, err))?;
    info!("wrote {}", path.display());
    Ok(path)
}

/// Headline numbers of a load test.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadTestSummary {
    pub converged_steps: usize,
    pub halted_at: Option<usize>,
    /// kN
    pub final_load: f64,
    /// mm
    pub final_settlement: f64,
    /// kPa
    pub contact_pressure: f64,
    /// kN/m3, undefined without settlement.
    pub subgrade_modulus: Option<f64>,
    /// kN/mm
    pub secant_stiffness: Option<f64>,
}

/// Summarizes the last converged step. `None` when nothing converged.
pub fn summarize(config: &ModelConfig, result: &LoadTestResult) -> Option<LoadTestSummary> {
    let last = result.last_converged()?;
    let final_settlement = last.settlement?;
    let contact_pressure = last.total_load / config.footing.area();

    let (subgrade_modulus, secant_stiffness) = if final_settlement > 0.0 {
        (
            Some(contact_pressure / (final_settlement / 1000.0)),
            Some(last.total_load / final_settlement),
        )
    } else {
        (None, None)
    };

    Some(LoadTestSummary {
        converged_steps: result.converged_steps().count(),
        halted_at: result.halted_at,
        final_load: last.total_load,
        final_settlement,
        contact_pressure,
        subgrade_modulus,
        secant_stiffness,
    })
}
