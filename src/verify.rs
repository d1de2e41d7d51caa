//! Post-construction checks on a finished mesh.
//!
//! The mesher can produce bad topology silently, so these passes look for it
//! afterwards and report instead of aborting.

use std::collections::{BTreeMap, HashSet};

use log::{info, warn};
use nalgebra::Point3;

use crate::{
    datatypes::{CellKind, Element, ElementTag, MaterialId, NodeTag},
    mesh::Mesh,
};

/// Number of offending items printed per problem.
pub const MAX_EXAMPLES: usize = 5;

/// Tetrahedra splitting a hexahedron around its 0-6 diagonal.
const HEX_TETS: [[usize; 4]; 6] = [
    [0, 1, 2, 6],
    [0, 2, 3, 6],
    [0, 3, 7, 6],
    [0, 7, 4, 6],
    [0, 4, 5, 6],
    [0, 5, 1, 6],
];

const TET_EDGES: [(usize, usize); 6] = [(0, 1), (1, 2), (2, 0), (0, 3), (1, 3), (2, 3)];

const HEX_EDGES: [(usize, usize); 12] = [
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 0),
    (4, 5),
    (5, 6),
    (6, 7),
    (7, 4),
    (0, 4),
    (1, 5),
    (2, 6),
    (3, 7),
];

/// Signed volume of the tetrahedron `a b c d`, positive when `d` lies on the
/// side of `a b c` given by the right-hand rule.
pub fn tet_volume(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>, d: &Point3<f64>) -> f64 {
    (b - a).dot(&(c - a).cross(&(d - a))) / 6.0
}

/// Signed volume of a cell from its corner positions in solver order.
pub fn signed_volume(kind: CellKind, corners: &[Point3<f64>]) -> f64 {
    match kind {
        CellKind::Tetrahedron => tet_volume(&corners[0], &corners[1], &corners[2], &corners[3]),
        CellKind::Hexahedron => HEX_TETS
            .iter()
            .map(|t| tet_volume(&corners[t[0]], &corners[t[1]], &corners[t[2]], &corners[t[3]]))
            .sum(),
    }
}

/// Longest over shortest edge length.
pub fn aspect_ratio(kind: CellKind, corners: &[Point3<f64>]) -> f64 {
    let edges: &[(usize, usize)] = match kind {
        CellKind::Tetrahedron => &TET_EDGES,
        CellKind::Hexahedron => &HEX_EDGES,
    };
    let lengths = edges.iter().map(|&(a, b)| (corners[b] - corners[a]).norm());
    let (shortest, longest) = lengths.fold((f64::INFINITY, 0.0_f64), |(lo, hi), l| {
        (lo.min(l), hi.max(l))
    });

    if shortest > 0.0 {
        longest / shortest
    } else {
        f64::INFINITY
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VerificationReport {
    pub nodes: usize,
    pub elements: usize,
    /// Elements with zero or negative volume.
    pub inverted: Vec<(ElementTag, f64)>,
    /// Element references to nodes that do not exist.
    pub dangling: Vec<(ElementTag, NodeTag)>,
    /// Nodes no element uses.
    pub orphans: Vec<NodeTag>,
    pub material_counts: BTreeMap<MaterialId, usize>,
    /// Nodes shared by the footing and the soil, when a footing material was given.
    pub interface_nodes: Option<Vec<NodeTag>>,
    pub total_volume: f64,
    pub min_volume: f64,
    pub max_volume: f64,
    pub worst_aspect_ratio: Option<(ElementTag, f64)>,
}

impl VerificationReport {
    /// Inverted elements, dangling references and a missing interface fail
    /// the mesh. Orphan nodes only warn.
    pub fn is_valid(&self) -> bool {
        self.inverted.is_empty()
            && self.dangling.is_empty()
            && self
                .interface_nodes
                .as_ref()
                .map_or(true, |nodes| !nodes.is_empty())
    }

    pub fn log(&self) {
        info!("verified {} nodes and {} elements", self.nodes, self.elements);
        for (material, count) in &self.material_counts {
            info!("material {material}: {count} elements");
        }
        if self.elements > 0 {
            info!(
                "element volume {:.4e} to {:.4e} m3, total {:.4} m3",
                self.min_volume, self.max_volume, self.total_volume
            );
        }
        if let Some((tag, ratio)) = self.worst_aspect_ratio {
            info!("worst aspect ratio {ratio:.2} (element {tag})");
        }

        if !self.inverted.is_empty() {
            warn!(
                target: "verify",
                "{} elements with non-positive volume, e.g. {}",
                self.inverted.len(),
                examples(self.inverted.iter().map(|(t, v)| format!("{t} ({v:.3e})")))
            );
        }
        if !self.dangling.is_empty() {
            warn!(
                target: "verify",
                "{} references to missing nodes, e.g. {}",
                self.dangling.len(),
                examples(
                    self.dangling
                        .iter()
                        .map(|(e, n)| format!("element {e} -> node {n}"))
                )
            );
        }
        if !self.orphans.is_empty() {
            warn!(
                target: "verify",
                "{} nodes not used by any element, e.g. {}",
                self.orphans.len(),
                examples(self.orphans.iter().map(|t| t.to_string()))
            );
        }
        match &self.interface_nodes {
            Some(nodes) if nodes.is_empty() => {
                warn!(target: "verify", "footing and soil share no nodes")
            }
            Some(nodes) => info!("footing-soil interface: {} shared nodes", nodes.len()),
            None => {}
        }
    }
}

fn examples(items: impl Iterator<Item = String>) -> String {
    items.take(MAX_EXAMPLES).collect::<Vec<_>>().join(", ")
}

fn check_element(
    mesh: &Mesh,
    element: &Element,
    dangling: &mut Vec<(ElementTag, NodeTag)>,
) -> Option<Vec<Point3<f64>>> {
    let mut corners = Vec::with_capacity(element.nodes.len());
    let mut complete = true;
    for &tag in &element.nodes {
        match mesh.position(tag) {
            Some(p) => corners.push(p),
            None => {
                dangling.push((element.tag, tag));
                complete = false;
            }
        }
    }
    if complete && corners.len() == element.kind.node_count() {
        Some(corners)
    } else {
        None
    }
}

/// Runs every verification pass over `mesh`.
///
/// # Arguments
/// * `mesh` - The mesh to check
/// * `footing_material` - Material of the footing, enables the interface check
pub fn verify(mesh: &Mesh, footing_material: Option<MaterialId>) -> VerificationReport {
    let mut inverted = Vec::new();
    let mut dangling = Vec::new();
    let mut used: HashSet<NodeTag> = HashSet::new();
    let mut total_volume = 0.0;
    let mut min_volume = f64::INFINITY;
    let mut max_volume = f64::NEG_INFINITY;
    let mut worst_aspect_ratio: Option<(ElementTag, f64)> = None;

    for element in &mesh.elements {
        used.extend(element.nodes.iter().copied());

        let Some(corners) = check_element(mesh, element, &mut dangling) else {
            continue;
        };

        let volume = signed_volume(element.kind, &corners);
        if volume <= 0.0 {
            inverted.push((element.tag, volume));
        }
        total_volume += volume;
        min_volume = min_volume.min(volume);
        max_volume = max_volume.max(volume);

        let ratio = aspect_ratio(element.kind, &corners);
        if worst_aspect_ratio.map_or(true, |(_, worst)| ratio > worst) {
            worst_aspect_ratio = Some((element.tag, ratio));
        }
    }

    let orphans = mesh
        .nodes()
        .iter()
        .map(|n| n.tag)
        .filter(|tag| !used.contains(tag))
        .collect();

    VerificationReport {
        nodes: mesh.node_count(),
        elements: mesh.element_count(),
        inverted,
        dangling,
        orphans,
        material_counts: mesh.material_counts(),
        interface_nodes: footing_material.map(|m| mesh.shared_nodes(m)),
        total_volume,
        min_volume,
        max_volume,
        worst_aspect_ratio,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::Node;
    use approx::assert_relative_eq;

    fn unit_cube() -> Vec<Point3<f64>> {
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(1.0, 0.0, 1.0),
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(0.0, 1.0, 1.0),
        ]
    }

    #[test]
    fn unit_cube_has_unit_volume() {
        assert_relative_eq!(signed_volume(CellKind::Hexahedron, &unit_cube()), 1.0);
        assert_relative_eq!(aspect_ratio(CellKind::Hexahedron, &unit_cube()), 1.0);
    }

    #[test]
    fn swapped_faces_invert_the_cell() {
        let mut cube = unit_cube();
        cube.rotate_left(4);
        assert_relative_eq!(signed_volume(CellKind::Hexahedron, &cube), -1.0);

        let tet = &unit_cube()[..];
        let v = signed_volume(CellKind::Tetrahedron, &[tet[0], tet[1], tet[3], tet[4]]);
        assert_relative_eq!(v, 1.0 / 6.0);
    }

    #[test]
    fn reports_dangling_inverted_and_orphans() {
        let nodes: Vec<Node> = unit_cube()
            .into_iter()
            .enumerate()
            .map(|(i, position)| Node {
                tag: i + 1,
                position,
            })
            .collect();
        let elements = vec![
            Element::new(1, CellKind::Tetrahedron, vec![1, 2, 4, 5], 1).unwrap(),
            Element::new(2, CellKind::Tetrahedron, vec![1, 4, 2, 5], 1).unwrap(),
            Element::new(3, CellKind::Tetrahedron, vec![1, 2, 4, 42], 2).unwrap(),
        ];
        let mesh = Mesh::from_parts(nodes, elements).unwrap();
        let report = verify(&mesh, Some(2));

        assert_eq!(report.inverted.len(), 1);
        assert_eq!(report.inverted[0].0, 2);
        assert_eq!(report.dangling, vec![(3, 42)]);
        assert_eq!(report.orphans, vec![3, 6, 7, 8]);
        assert_eq!(report.interface_nodes, Some(vec![1, 2, 4]));
        assert!(!report.is_valid());
    }
}
