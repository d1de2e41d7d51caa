//! Model record loading and fail-fast validation.
//!
//! Everything the mesher and the load test need is read from a single json
//! document. Nothing is built until the whole record has been checked.

use json::JsonValue;
use log::info;

use crate::{
    datatypes::{Domain, Extents, Footing, Footprint, Layer, MaterialId, MaterialParams, Symmetry},
    error::FootingError,
    session::Algorithm,
};

/// Layer thicknesses must add up to the domain depth within this.
pub const LAYER_SUM_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
pub struct FootingMaterial {
    pub name: String,
    pub material: MaterialId,
    pub params: MaterialParams,
}

/// Division counts and tolerances for the structured lattice.
#[derive(Debug, Clone, PartialEq)]
pub struct Refinement {
    pub nx_near: usize,
    pub nx_far: usize,
    pub ny_near: usize,
    pub ny_far: usize,
    pub nz: usize,
    pub nz_footing: usize,
    pub depth_grading: f64,
    pub merge_tolerance: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadTest {
    /// Total physical load in kN.
    pub max_load: f64,
    pub num_steps: usize,
}

impl Default for LoadTest {
    fn default() -> Self {
        LoadTest {
            max_load: 1000.0,
            num_steps: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOptions {
    pub tolerance: f64,
    pub max_iterations: usize,
    /// Tried in order on every load step until one converges.
    pub algorithms: Vec<Algorithm>,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        AnalysisOptions {
            tolerance: 1e-6,
            max_iterations: 100,
            algorithms: vec![
                Algorithm::Newton,
                Algorithm::ModifiedNewton,
                Algorithm::NewtonLineSearch,
                Algorithm::KrylovNewton,
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Tcl,
    Vtu,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputOptions {
    pub filename: String,
    pub formats: Vec<OutputFormat>,
}

impl Default for OutputOptions {
    fn default() -> Self {
        OutputOptions {
            filename: "footing".to_owned(),
            formats: vec![OutputFormat::Tcl, OutputFormat::Vtu],
        }
    }
}

/// Ordered soil layers partitioning the domain depth.
#[derive(Debug, Clone, PartialEq)]
pub struct Stratigraphy {
    layers: Vec<Layer>,
}

impl Stratigraphy {
    /// Stacks layers from the surface down, rejecting any partition whose
    /// thicknesses do not add up to `total_depth`.
    pub fn new(
        layers: Vec<(String, MaterialId, f64, MaterialParams)>,
        total_depth: f64,
    ) -> Result<Stratigraphy, FootingError> {
        if layers.is_empty() {
            return Err(FootingError::Config("no soil layers defined".to_owned()));
        }

        let mut stacked = Vec::with_capacity(layers.len());
        let mut depth = 0.0;
        for (name, material, thickness, params) in layers {
            if !(thickness > 0.0) {
                return Err(FootingError::Config(format!(
                    "layer '{name}' has non-positive thickness {thickness}"
                )));
            }
            stacked.push(Layer {
                name,
                material,
                thickness,
                depth_top: depth,
                depth_bottom: depth + thickness,
                params,
            });
            depth += thickness;
        }

        if (depth - total_depth).abs() > LAYER_SUM_TOLERANCE {
            return Err(FootingError::LayerThickness {
                total: depth,
                depth: total_depth,
            });
        }

        // the last bottom is pinned to the declared depth
        if let Some(last) = stacked.last_mut() {
            last.depth_bottom = total_depth;
        }

        Ok(Stratigraphy { layers: stacked })
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Layer whose `[depth_top, depth_bottom)` holds `depth`. Depths at or
    /// past the base fall to the deepest layer.
    pub fn layer_at_depth(&self, depth: f64) -> &Layer {
        self.layers
            .iter()
            .find(|layer| layer.contains_depth(depth))
            .unwrap_or_else(|| &self.layers[self.layers.len() - 1])
    }

    /// Depths of the boundaries between consecutive layers.
    pub fn interface_depths(&self) -> Vec<f64> {
        self.layers[..self.layers.len() - 1]
            .iter()
            .map(|layer| layer.depth_bottom)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub domain: Domain,
    pub footing: Footing,
    pub stratigraphy: Stratigraphy,
    pub footing_material: FootingMaterial,
    pub refinement: Refinement,
    pub load_test: LoadTest,
    pub analysis: AnalysisOptions,
    pub output: OutputOptions,
}

impl ModelConfig {
    pub fn footprint(&self) -> Footprint {
        Footprint::new(&self.domain, &self.footing)
    }

    pub fn extents(&self) -> Extents {
        self.domain.modeled_extents()
    }

    pub fn print_summary(&self) {
        let extents = self.extents();
        info!(
            "footing: {} m x {} m x {} m, embedment Df = {} m",
            self.footing.width, self.footing.length, self.footing.thickness, self.footing.embedment
        );
        info!(
            "domain: {} m x {} m x {} m ({})",
            self.domain.lx,
            self.domain.ly,
            self.domain.lz,
            match self.domain.symmetry {
                Symmetry::Quarter => format!(
                    "quarter model {} m x {} m",
                    extents.max.x - extents.min.x,
                    extents.max.y - extents.min.y
                ),
                Symmetry::Full => "full model".to_owned(),
            }
        );
        for layer in self.stratigraphy.layers() {
            info!(
                "layer {} (material {}): {:.2} - {:.2} m, E = {:.1} MPa",
                layer.name,
                layer.material,
                layer.depth_top,
                layer.depth_bottom,
                layer.params.youngs_modulus / 1000.0
            );
        }
        info!(
            "load test: {} kN in {} steps",
            self.load_test.max_load, self.load_test.num_steps
        );
    }
}

/// Reads and validates a model record from disk.
pub fn load_config(input_file: &str) -> Result<ModelConfig, FootingError> {
    let contents =
        std::fs::read_to_string(input_file).map_err(|err| FootingError::io(input_file, err))?;

    parse_config(&contents)
}

/// Parses and validates a model record.
pub fn parse_config(contents: &str) -> Result<ModelConfig, FootingError> {
    let root = match json::parse(contents) {
        Ok(j) => j,
        Err(err) => {
            return Err(FootingError::Input(format!(
                "Error in input file json: {err}"
            )))
        }
    };

    for section in ["geometry", "soil_layers", "footing_material", "mesh_refinement"] {
        if !root.has_key(section) {
            return Err(FootingError::Input(format!(
                "Input json missing {section} field"
            )));
        }
    }

    let domain = parse_domain(&root["geometry"])?;
    let footing = parse_footing(&root["geometry"], &domain)?;
    let stratigraphy = parse_layers(&root["soil_layers"], domain.lz)?;
    let footing_material = parse_footing_material(&root["footing_material"])?;
    let refinement = parse_refinement(&root["mesh_refinement"])?;

    if stratigraphy
        .layers()
        .iter()
        .any(|layer| layer.material == footing_material.material)
    {
        return Err(FootingError::Config(format!(
            "footing material id {} is also used by a soil layer",
            footing_material.material
        )));
    }

    let load_test = if root.has_key("load_test") {
        parse_load_test(&root["load_test"])?
    } else {
        LoadTest::default()
    };
    let analysis = if root.has_key("analysis") {
        parse_analysis(&root["analysis"])?
    } else {
        AnalysisOptions::default()
    };
    let output = if root.has_key("output") {
        parse_output(&root["output"])?
    } else {
        OutputOptions::default()
    };

    Ok(ModelConfig {
        domain,
        footing,
        stratigraphy,
        footing_material,
        refinement,
        load_test,
        analysis,
        output,
    })
}

fn require_f64(value: &JsonValue, section: &str, key: &str) -> Result<f64, FootingError> {
    if !value.has_key(key) {
        return Err(FootingError::Input(format!(
            "Input json missing {key} field in {section} section"
        )));
    }
    match value[key].as_f64() {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(FootingError::Input(format!(
            "Bad value for {key} in {section} section"
        ))),
    }
}

fn require_positive(value: &JsonValue, section: &str, key: &str) -> Result<f64, FootingError> {
    let v = require_f64(value, section, key)?;
    if v <= 0.0 {
        return Err(FootingError::Config(format!(
            "{key} in {section} section must be positive, got {v}"
        )));
    }
    Ok(v)
}

fn optional_f64(value: &JsonValue, section: &str, key: &str) -> Result<Option<f64>, FootingError> {
    if !value.has_key(key) || value[key].is_null() {
        return Ok(None);
    }
    require_f64(value, section, key).map(Some)
}

fn require_count(value: &JsonValue, section: &str, key: &str) -> Result<usize, FootingError> {
    if !value.has_key(key) {
        return Err(FootingError::Input(format!(
            "Input json missing {key} field in {section} section"
        )));
    }
    match value[key].as_usize() {
        Some(n) if n > 0 => Ok(n),
        _ => Err(FootingError::Config(format!(
            "{key} in {section} section must be a positive integer"
        ))),
    }
}

fn optional_count(
    value: &JsonValue,
    section: &str,
    key: &str,
    default: usize,
) -> Result<usize, FootingError> {
    if value.has_key(key) {
        require_count(value, section, key)
    } else {
        Ok(default)
    }
}

fn require_material_id(value: &JsonValue, section: &str) -> Result<MaterialId, FootingError> {
    if !value.has_key("material_id") {
        return Err(FootingError::Input(format!(
            "Input json missing material_id field in {section} section"
        )));
    }
    match value["material_id"].as_u32() {
        Some(id) if id > 0 => Ok(id),
        _ => Err(FootingError::Input(format!(
            "Bad value for material_id in {section} section"
        ))),
    }
}

fn parse_material_params(value: &JsonValue, section: &str) -> Result<MaterialParams, FootingError> {
    let youngs_modulus = require_positive(value, section, "E")?;
    let poisson_ratio = require_f64(value, section, "nu")?;
    if !(0.0..0.5).contains(&poisson_ratio) {
        return Err(FootingError::Config(format!(
            "nu in {section} section must lie in [0, 0.5), got {poisson_ratio}"
        )));
    }

    Ok(MaterialParams {
        youngs_modulus,
        poisson_ratio,
        density: require_positive(value, section, "rho")?,
        cohesion: optional_f64(value, section, "cohesion")?,
        friction_angle: optional_f64(value, section, "friction_angle")?,
    })
}

fn parse_domain(geometry: &JsonValue) -> Result<Domain, FootingError> {
    if !geometry.has_key("domain") {
        return Err(FootingError::Input(
            "Input json missing domain field in geometry section".to_owned(),
        ));
    }
    let domain = &geometry["domain"];
    let symmetry = match domain["quarter_domain"].as_bool() {
        Some(false) => Symmetry::Full,
        Some(true) | None => Symmetry::Quarter,
    };

    Ok(Domain {
        lx: require_positive(domain, "domain", "Lx")?,
        ly: require_positive(domain, "domain", "Ly")?,
        lz: require_positive(domain, "domain", "Lz")?,
        symmetry,
    })
}

fn parse_footing(geometry: &JsonValue, domain: &Domain) -> Result<Footing, FootingError> {
    if !geometry.has_key("footing") {
        return Err(FootingError::Input(
            "Input json missing footing field in geometry section".to_owned(),
        ));
    }
    let section = &geometry["footing"];
    let width = require_positive(section, "footing", "B")?;
    let length = match optional_f64(section, "footing", "L")? {
        Some(l) if l > 0.0 => l,
        Some(l) => {
            return Err(FootingError::Config(format!(
                "L in footing section must be positive, got {l}"
            )))
        }
        None => width,
    };
    let footing = Footing {
        width,
        length,
        embedment: require_positive(section, "footing", "Df")?,
        thickness: require_positive(section, "footing", "tz")?,
    };

    if footing.width > domain.lx || footing.length > domain.ly {
        return Err(FootingError::Config(format!(
            "footing {} m x {} m does not fit in the {} m x {} m domain",
            footing.width, footing.length, domain.lx, domain.ly
        )));
    }
    if footing.embedment + footing.thickness >= domain.lz {
        return Err(FootingError::Config(format!(
            "footing base at {} m is not above the domain base at {} m",
            footing.embedment + footing.thickness,
            domain.lz
        )));
    }

    Ok(footing)
}

fn parse_layers(layers: &JsonValue, total_depth: f64) -> Result<Stratigraphy, FootingError> {
    if !layers.is_array() {
        return Err(FootingError::Input(
            "soil_layers must be a list of layers".to_owned(),
        ));
    }

    let mut parsed = Vec::new();
    for (i, layer) in layers.members().enumerate() {
        let default_name = format!("SOIL_{}", i + 1);
        let name = layer["name"].as_str().unwrap_or(&default_name).to_owned();
        let section = format!("soil_layers[{i}]");
        let thickness = require_f64(layer, &section, "thickness")?;
        let material = require_material_id(layer, &section)?;
        let params = parse_material_params(layer, &section)?;

        if parsed.iter().any(|(_, m, _, _)| *m == material) {
            return Err(FootingError::Config(format!(
                "material id {material} is used by more than one soil layer"
            )));
        }
        parsed.push((name, material, thickness, params));
    }

    Stratigraphy::new(parsed, total_depth)
}

fn parse_footing_material(value: &JsonValue) -> Result<FootingMaterial, FootingError> {
    Ok(FootingMaterial {
        name: value["name"].as_str().unwrap_or("FOOTING").to_owned(),
        material: require_material_id(value, "footing_material")?,
        params: parse_material_params(value, "footing_material")?,
    })
}

fn parse_refinement(value: &JsonValue) -> Result<Refinement, FootingError> {
    let nx_near = require_count(value, "mesh_refinement", "nx_near")?;
    let nx_far = require_count(value, "mesh_refinement", "nx_far")?;
    let depth_grading = optional_f64(value, "mesh_refinement", "depth_grading")?.unwrap_or(0.5);
    if !(0.0..=1.0).contains(&depth_grading) {
        return Err(FootingError::Config(format!(
            "depth_grading must lie in [0, 1], got {depth_grading}"
        )));
    }
    let merge_tolerance =
        optional_f64(value, "mesh_refinement", "merge_tolerance")?.unwrap_or(0.1);
    if merge_tolerance <= 0.0 {
        return Err(FootingError::Config(format!(
            "merge_tolerance must be positive, got {merge_tolerance}"
        )));
    }

    Ok(Refinement {
        nx_near,
        nx_far,
        ny_near: optional_count(value, "mesh_refinement", "ny_near", nx_near)?,
        ny_far: optional_count(value, "mesh_refinement", "ny_far", nx_far)?,
        nz: require_count(value, "mesh_refinement", "nz")?,
        nz_footing: optional_count(value, "mesh_refinement", "nz_footing", 1)?,
        depth_grading,
        merge_tolerance,
    })
}

fn parse_load_test(value: &JsonValue) -> Result<LoadTest, FootingError> {
    Ok(LoadTest {
        max_load: require_positive(value, "load_test", "max_load")?,
        num_steps: require_count(value, "load_test", "num_steps")?,
    })
}

fn parse_analysis(value: &JsonValue) -> Result<AnalysisOptions, FootingError> {
    let defaults = AnalysisOptions::default();
    let algorithms = if value.has_key("algorithms") {
        let mut algorithms = Vec::new();
        for name in value["algorithms"].members() {
            let name = name.as_str().unwrap_or_default();
            match Algorithm::from_name(name) {
                Some(a) => algorithms.push(a),
                None => {
                    return Err(FootingError::Config(format!(
                        "unknown solution algorithm '{name}'"
                    )))
                }
            }
        }
        if algorithms.is_empty() {
            return Err(FootingError::Config(
                "analysis.algorithms must name at least one algorithm".to_owned(),
            ));
        }
        algorithms
    } else {
        defaults.algorithms
    };

    Ok(AnalysisOptions {
        tolerance: optional_f64(value, "analysis", "tolerance")?.unwrap_or(defaults.tolerance),
        max_iterations: optional_count(
            value,
            "analysis",
            "max_iterations",
            defaults.max_iterations,
        )?,
        algorithms,
    })
}

fn parse_output(value: &JsonValue) -> Result<OutputOptions, FootingError> {
    let defaults = OutputOptions::default();
    let formats = if value.has_key("formats") {
        let mut formats = Vec::new();
        for format in value["formats"].members() {
            match format.as_str() {
                Some("tcl") => formats.push(OutputFormat::Tcl),
                Some("vtu") => formats.push(OutputFormat::Vtu),
                Some(other) => {
                    log::warn!(target: "config", "skipping unsupported output format {other}")
                }
                None => {
                    return Err(FootingError::Input(
                        "output.formats must be a list of strings".to_owned(),
                    ))
                }
            }
        }
        formats
    } else {
        defaults.formats
    };

    Ok(OutputOptions {
        filename: value["filename"]
            .as_str()
            .map(str::to_owned)
            .unwrap_or(defaults.filename),
        formats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "geometry": {
            "domain": { "Lx": 6.0, "Ly": 6.0, "Lz": 10.0, "quarter_domain": true },
            "footing": { "B": 3.0, "Df": 1.5, "tz": 0.5 }
        },
        "soil_layers": [
            { "name": "clay", "thickness": 5.0, "material_id": 1, "E": 10000.0, "nu": 0.35, "rho": 1700.0,
              "cohesion": 25.0, "friction_angle": 15.0 },
            { "thickness": 4.0, "material_id": 2, "E": 30000.0, "nu": 0.3, "rho": 1900.0 },
            { "thickness": 1.0, "material_id": 3, "E": 50000.0, "nu": 0.28, "rho": 2000.0 }
        ],
        "footing_material": { "material_id": 4, "E": 2.5e7, "nu": 0.2, "rho": 2400.0 },
        "mesh_refinement": { "nx_near": 4, "nx_far": 6, "nz": 20 }
    }"#;

    #[test]
    fn parses_sample_with_defaults() {
        let config = parse_config(SAMPLE).expect("sample parses");

        assert_eq!(config.domain.symmetry, Symmetry::Quarter);
        assert_eq!(config.footing.length, 3.0);
        assert_eq!(config.refinement.ny_near, 4);
        assert_eq!(config.refinement.nz_footing, 1);
        assert_eq!(config.stratigraphy.layers()[1].name, "SOIL_2");
        assert_eq!(config.stratigraphy.interface_depths(), vec![5.0, 9.0]);
        assert_eq!(config.load_test, LoadTest::default());
        assert_eq!(config.analysis.algorithms[0], Algorithm::Newton);
    }

    #[test]
    fn rejects_layers_not_matching_depth() {
        let bad = SAMPLE.replace("\"thickness\": 1.0", "\"thickness\": 1.5");
        match parse_config(&bad) {
            Err(FootingError::LayerThickness { total, depth }) => {
                assert!((total - 10.5).abs() < 1e-12);
                assert_eq!(depth, 10.0);
            }
            other => panic!("expected layer thickness error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_missing_sections_and_fields() {
        let no_refinement = SAMPLE.replace("\"mesh_refinement\"", "\"refinement\"");
        assert!(matches!(
            parse_config(&no_refinement),
            Err(FootingError::Input(msg)) if msg.contains("mesh_refinement")
        ));

        let no_embedment = SAMPLE.replace("\"Df\": 1.5,", "");
        assert!(matches!(
            parse_config(&no_embedment),
            Err(FootingError::Input(msg)) if msg.contains("Df")
        ));
    }

    #[test]
    fn rejects_footing_material_shared_with_soil() {
        let clash = SAMPLE.replace("\"material_id\": 4", "\"material_id\": 2");
        assert!(matches!(parse_config(&clash), Err(FootingError::Config(_))));
    }

    #[test]
    fn layer_lookup_uses_half_open_intervals() {
        let config = parse_config(SAMPLE).expect("sample parses");
        let strata = &config.stratigraphy;

        assert_eq!(strata.layer_at_depth(0.0).material, 1);
        assert_eq!(strata.layer_at_depth(4.999).material, 1);
        assert_eq!(strata.layer_at_depth(5.0).material, 2);
        assert_eq!(strata.layer_at_depth(10.0).material, 3);
        assert_eq!(strata.layer_at_depth(12.0).material, 3);
    }

    #[test]
    fn missing_file_keeps_the_io_cause() {
        match load_config("no/such/model.json") {
            Err(FootingError::Io { path, source }) => {
                assert_eq!(path, std::path::PathBuf::from("no/such/model.json"));
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("expected io error, got {other:?}"),
        }
    }
}
