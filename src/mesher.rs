//! Structured hexahedral mesher for a stratified soil block with an embedded
//! footing.
//!
//! The soil is a tensor-product lattice refined under the footing. The
//! excavated column above the footing base is left out of it, and the footing
//! is meshed separately on the same grid lines, reusing soil nodes wherever
//! the two meet.

pub mod axis;
pub mod spatial;

use indicatif::ProgressBar;
use log::{debug, info, warn};
use nalgebra::Point3;

use crate::{
    config::ModelConfig,
    datatypes::{Element, ElementTag, Footprint, NodeTag},
    error::FootingError,
    mesh::Mesh,
};

use self::spatial::NodeArena;

/// Tolerance for geometric membership tests against exact lattice levels.
pub const GEOMETRY_TOLERANCE: f64 = 1e-6;

/// Lattice coordinates along each axis, z ascending from the base.
#[derive(Debug, Clone, PartialEq)]
pub struct LatticeAxes {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
}

impl LatticeAxes {
    /// Builds the refined x/y axes and the graded z axis for a model.
    pub fn build(config: &ModelConfig) -> LatticeAxes {
        let extents = config.extents();
        let footprint = config.footprint();
        let refinement = &config.refinement;

        let x = axis::refined_axis(
            extents.min.x,
            extents.max.x,
            footprint.x,
            refinement.nx_far,
            refinement.nx_near,
        );
        let y = axis::refined_axis(
            extents.min.y,
            extents.max.y,
            footprint.y,
            refinement.ny_far,
            refinement.ny_near,
        );

        let footing = &config.footing;
        let mut breakpoints: Vec<f64> = axis::linspace(
            footing.embedment,
            footing.embedment + footing.thickness,
            refinement.nz_footing,
        );
        breakpoints.extend(config.stratigraphy.interface_depths());

        let depths = axis::depth_levels(
            config.domain.lz,
            refinement.nz,
            refinement.depth_grading,
            &breakpoints,
        );

        LatticeAxes {
            x,
            y,
            z: axis::depths_to_z(&depths),
        }
    }

    pub fn dims(&self) -> (usize, usize, usize) {
        (self.x.len(), self.y.len(), self.z.len())
    }

    /// Number of lattice points, before any exclusion.
    pub fn point_count(&self) -> usize {
        self.x.len() * self.y.len() * self.z.len()
    }

    /// Number of lattice cells, before any exclusion.
    pub fn cell_count(&self) -> usize {
        (self.x.len() - 1) * (self.y.len() - 1) * (self.z.len() - 1)
    }

    /// Flat index of lattice point (i, j, k).
    pub fn index(&self, i: usize, j: usize, k: usize) -> usize {
        (k * self.y.len() + j) * self.x.len() + i
    }

    pub fn point(&self, i: usize, j: usize, k: usize) -> Point3<f64> {
        Point3::new(self.x[i], self.y[j], self.z[k])
    }

    /// Shortest gap between neighbouring coordinates on any axis.
    pub fn min_spacing(&self) -> f64 {
        [&self.x, &self.y, &self.z]
            .iter()
            .flat_map(|axis| axis.windows(2).map(|w| w[1] - w[0]))
            .fold(f64::INFINITY, f64::min)
    }

    /// Coincidence tolerance for node merging: the configured value, capped
    /// at a quarter of the smallest cell so neighbouring lattice points never
    /// merge.
    pub fn merge_tolerance(&self, configured: f64) -> f64 {
        configured.min(0.25 * self.min_spacing())
    }
}

/// Corner offsets of a hexahedral cell: bottom face then top face, each
/// counter-clockwise seen from above.
pub const HEX_CORNERS: [(usize, usize, usize); 8] = [
    (0, 0, 0),
    (1, 0, 0),
    (1, 1, 0),
    (0, 1, 0),
    (0, 0, 1),
    (1, 0, 1),
    (1, 1, 1),
    (0, 1, 1),
];

/// Result of a mesher run with the bookkeeping downstream stages need.
#[derive(Debug, Clone)]
pub struct MeshBuild {
    pub mesh: Mesh,
    pub axes: LatticeAxes,
    pub footprint: Footprint,
    /// Soil nodes reused by the footing, sorted.
    pub interface_nodes: Vec<NodeTag>,
    /// Nodes on the footing's top face, sorted.
    pub load_nodes: Vec<NodeTag>,
    pub soil_elements: usize,
    pub footing_elements: usize,
    pub excluded_nodes: usize,
    pub excluded_elements: usize,
    /// Soil cells dropped because one of their corners was excluded.
    pub dropped_elements: usize,
}

struct SoilLattice {
    /// Tag per lattice point, `None` where the point was excluded.
    tags: Vec<Option<NodeTag>>,
    excluded_nodes: usize,
    excluded_elements: usize,
    dropped_elements: usize,
}

/// Creates soil nodes and hexahedra, leaving out the footing column.
///
/// # Arguments
/// * `config` - The validated model
/// * `axes` - Lattice coordinates
/// * `footprint` - Footing footprint in the modeled domain
/// * `arena` - Node arena receiving the soil nodes
/// * `elements` - Element list receiving the soil hexahedra
fn build_soil(
    config: &ModelConfig,
    axes: &LatticeAxes,
    footprint: &Footprint,
    arena: &mut NodeArena,
    elements: &mut Vec<Element>,
) -> SoilLattice {
    let (nx, ny, nz) = axes.dims();
    let z_bottom = config.footing.bottom_z();

    let mut tags = vec![None; axes.point_count()];
    let mut excluded_nodes = 0;
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let point = axes.point(i, j, k);
                let excavated = footprint.covers(point.x, point.y, GEOMETRY_TOLERANCE)
                    && point.z > z_bottom + GEOMETRY_TOLERANCE;
                if excavated {
                    excluded_nodes += 1;
                    continue;
                }
                tags[axes.index(i, j, k)] = Some(arena.push(point));
            }
        }
    }

    let mut excluded_elements = 0;
    let mut dropped_elements = 0;
    let bar = ProgressBar::new((nz - 1) as u64);
    for k in 0..nz - 1 {
        let zc = 0.5 * (axes.z[k] + axes.z[k + 1]);
        let material = config.stratigraphy.layer_at_depth(-zc).material;

        for j in 0..ny - 1 {
            let yc = 0.5 * (axes.y[j] + axes.y[j + 1]);
            for i in 0..nx - 1 {
                let xc = 0.5 * (axes.x[i] + axes.x[i + 1]);

                let in_column = footprint.contains(xc, yc, GEOMETRY_TOLERANCE)
                    && zc >= z_bottom - GEOMETRY_TOLERANCE
                    && zc <= GEOMETRY_TOLERANCE;
                if in_column {
                    excluded_elements += 1;
                    continue;
                }

                let corners: Option<Vec<NodeTag>> = HEX_CORNERS
                    .iter()
                    .map(|&(di, dj, dk)| tags[axes.index(i + di, j + dj, k + dk)])
                    .collect();
                let Some(corners) = corners else {
                    dropped_elements += 1;
                    continue;
                };

                let mut nodes = [0; 8];
                nodes.copy_from_slice(&corners);
                elements.push(Element::hexahedron(elements.len() + 1, nodes, material));
            }
        }
        bar.inc(1);
    }
    bar.finish();

    SoilLattice {
        tags,
        excluded_nodes,
        excluded_elements,
        dropped_elements,
    }
}

struct FootingLattice {
    interface_nodes: Vec<NodeTag>,
    load_nodes: Vec<NodeTag>,
    elements: usize,
}

/// Meshes the footing on the soil grid lines, reusing coincident soil nodes.
fn build_footing(
    config: &ModelConfig,
    axes: &LatticeAxes,
    footprint: &Footprint,
    arena: &mut NodeArena,
    elements: &mut Vec<Element>,
) -> Result<FootingLattice, FootingError> {
    let footing = &config.footing;
    let sub = LatticeAxes {
        x: axis::sub_axis(&axes.x, footprint.x.0, footprint.x.1, GEOMETRY_TOLERANCE),
        y: axis::sub_axis(&axes.y, footprint.y.0, footprint.y.1, GEOMETRY_TOLERANCE),
        z: axis::sub_axis(
            &axes.z,
            footing.bottom_z(),
            footing.top_z(),
            GEOMETRY_TOLERANCE,
        ),
    };
    let (nx, ny, nz) = sub.dims();
    debug!("footing lattice {} x {} x {} points", nx, ny, nz);

    let mut tags = vec![0; sub.point_count()];
    let mut interface_nodes = Vec::new();
    let mut load_nodes = Vec::new();
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let (tag, reused) = arena.find_or_push(sub.point(i, j, k));
                if reused {
                    interface_nodes.push(tag);
                }
                if k == nz - 1 {
                    load_nodes.push(tag);
                }
                tags[sub.index(i, j, k)] = tag;
            }
        }
    }

    let material = config.footing_material.material;
    let first: ElementTag = elements.len() + 1;
    for k in 0..nz - 1 {
        for j in 0..ny - 1 {
            for i in 0..nx - 1 {
                let mut nodes = [0; 8];
                for (slot, &(di, dj, dk)) in nodes.iter_mut().zip(HEX_CORNERS.iter()) {
                    *slot = tags[sub.index(i + di, j + dj, k + dk)];
                }
                let mut unique = nodes.to_vec();
                unique.sort_unstable();
                unique.dedup();
                if unique.len() != 8 {
                    return Err(FootingError::Mesher(format!(
                        "footing cell ({i}, {j}, {k}) collapsed onto {} distinct nodes, merge tolerance {} is too coarse",
                        unique.len(),
                        arena.tolerance()
                    )));
                }
                elements.push(Element::hexahedron(elements.len() + 1, nodes, material));
            }
        }
    }

    interface_nodes.sort_unstable();
    interface_nodes.dedup();
    load_nodes.sort_unstable();
    load_nodes.dedup();

    Ok(FootingLattice {
        interface_nodes,
        load_nodes,
        elements: elements.len() + 1 - first,
    })
}

/// Runs the mesher
///
/// # Arguments
/// * `config` - The validated model record
///
/// # Returns
/// The mesh plus interface and load node sets
pub fn run(config: &ModelConfig) -> Result<MeshBuild, FootingError> {
    let axes = LatticeAxes::build(config);
    let footprint = config.footprint();
    let (nx, ny, nz) = axes.dims();
    info!(
        "building {} x {} x {} lattice ({} points, {} cells)",
        nx,
        ny,
        nz,
        axes.point_count(),
        axes.cell_count()
    );

    let tolerance = axes.merge_tolerance(config.refinement.merge_tolerance);
    if tolerance < config.refinement.merge_tolerance {
        debug!("merge tolerance capped at {:.4} m by the smallest cell", tolerance);
    }
    let mut arena = NodeArena::new(tolerance);
    let mut elements = Vec::with_capacity(axes.cell_count());

    let soil = build_soil(config, &axes, &footprint, &mut arena, &mut elements);
    let soil_elements = elements.len();
    info!(
        "created {} soil nodes and {} soil elements ({} nodes and {} elements excavated)",
        arena.len(),
        soil_elements,
        soil.excluded_nodes,
        soil.excluded_elements
    );
    if soil.dropped_elements > 0 {
        warn!(
            target: "mesh",
            "dropped {} soil elements referencing excavated nodes",
            soil.dropped_elements
        );
    }
    debug!(
        "{} of {} lattice points kept",
        soil.tags.iter().filter(|t| t.is_some()).count(),
        soil.tags.len()
    );

    let footing = build_footing(config, &axes, &footprint, &mut arena, &mut elements)?;
    info!(
        "created {} footing elements sharing {} nodes with the soil",
        footing.elements,
        footing.interface_nodes.len()
    );
    if footing.interface_nodes.is_empty() {
        warn!(target: "mesh", "footing shares no nodes with the soil");
    }

    let mesh = Mesh::from_parts(arena.into_nodes(), elements)?;
    info!(
        "mesh has {} nodes and {} elements",
        mesh.node_count(),
        mesh.element_count()
    );

    Ok(MeshBuild {
        mesh,
        axes,
        footprint,
        interface_nodes: footing.interface_nodes,
        load_nodes: footing.load_nodes,
        soil_elements,
        footing_elements: footing.elements,
        excluded_nodes: soil.excluded_nodes,
        excluded_elements: soil.excluded_elements,
        dropped_elements: soil.dropped_elements,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use std::collections::HashSet;

    const SMALL: &str = r#"{
        "geometry": {
            "domain": { "Lx": 4.0, "Ly": 4.0, "Lz": 4.0 },
            "footing": { "B": 2.0, "Df": 1.0, "tz": 1.0 }
        },
        "soil_layers": [
            { "thickness": 2.0, "material_id": 1, "E": 10000.0, "nu": 0.3, "rho": 1800.0 },
            { "thickness": 2.0, "material_id": 2, "E": 20000.0, "nu": 0.3, "rho": 1900.0 }
        ],
        "footing_material": { "material_id": 3, "E": 2.5e7, "nu": 0.2, "rho": 2400.0 },
        "mesh_refinement": { "nx_near": 1, "nx_far": 1, "nz": 4, "depth_grading": 0.0 }
    }"#;

    #[test]
    fn lattice_index_is_x_fastest() {
        let axes = LatticeAxes {
            x: vec![0.0, 1.0, 2.0],
            y: vec![0.0, 1.0],
            z: vec![-1.0, 0.0],
        };
        assert_eq!(axes.index(1, 0, 0), 1);
        assert_eq!(axes.index(0, 1, 0), 3);
        assert_eq!(axes.index(0, 0, 1), 6);
        assert_eq!(axes.cell_count(), 2);
    }

    #[test]
    fn small_quarter_model_counts() {
        let config = parse_config(SMALL).unwrap();
        let build = run(&config).unwrap();

        // 3 x 3 x 5 lattice, the single excavated column holds 2 points
        assert_eq!(build.axes.dims(), (3, 3, 5));
        assert_eq!(build.excluded_nodes, 2);
        assert_eq!(build.excluded_elements, 2);
        assert_eq!(build.dropped_elements, 0);
        assert_eq!(build.soil_elements, 14);
        assert_eq!(build.footing_elements, 1);

        // footing base and its outer top edge come from the soil
        assert_eq!(build.interface_nodes.len(), 7);
        assert_eq!(build.mesh.node_count(), 45 - 2 + 1);
        assert_eq!(build.load_nodes.len(), 4);
    }

    #[test]
    fn layer_materials_follow_centroid_depth() {
        let config = parse_config(SMALL).unwrap();
        let build = run(&config).unwrap();
        let counts = build.mesh.material_counts();

        // layer 1 spans the top two cell levels minus the excavated column
        assert_eq!(counts.get(&1), Some(&6));
        assert_eq!(counts.get(&2), Some(&8));
        assert_eq!(counts.get(&3), Some(&1));
    }

    #[test]
    fn tolerance_is_capped_by_the_smallest_cell() {
        let axes = LatticeAxes {
            x: vec![0.0, 0.075, 0.15],
            y: vec![0.0, 1.0],
            z: vec![-1.0, 0.0],
        };
        assert!((axes.min_spacing() - 0.075).abs() < 1e-12);
        assert!((axes.merge_tolerance(0.1) - 0.01875).abs() < 1e-12);
        assert_eq!(axes.merge_tolerance(0.001), 0.001);
    }

    #[test]
    fn cells_touching_excavated_nodes_are_dropped_whole() {
        let config = parse_config(SMALL).unwrap();
        let grid = vec![0.0, 0.5, 1.0, 1.5, 2.0];
        let axes = LatticeAxes {
            x: grid.clone(),
            y: grid,
            z: vec![-4.0, -3.0, -2.0, -1.0, 0.0],
        };
        // off the grid lines: the footing column takes one cell but the
        // points at x or y = 0.5 above the base go with it
        let footprint = Footprint {
            x: (0.0, 0.6),
            y: (0.0, 0.6),
            closed_x_min: true,
            closed_y_min: true,
        };
        let mut arena = NodeArena::new(0.01);
        let mut elements = Vec::new();

        let soil = build_soil(&config, &axes, &footprint, &mut arena, &mut elements);

        assert_eq!(soil.excluded_nodes, 8);
        assert_eq!(soil.excluded_elements, 2);
        assert_eq!(soil.dropped_elements, 6);
        assert_eq!(elements.len(), 64 - 2 - 6);

        let existing: HashSet<NodeTag> = arena.into_nodes().iter().map(|n| n.tag).collect();
        assert!(elements
            .iter()
            .all(|e| e.nodes.len() == 8 && e.nodes.iter().all(|t| existing.contains(t))));
    }
}
