//! Support conditions for the soil block.

use log::info;

use crate::{
    datatypes::{Extents, Fixity, Node, NodeTag, Symmetry},
    mesh::Mesh,
};

/// Distance from a boundary plane within which a node lies on it.
pub const BOUNDARY_TOLERANCE: f64 = 0.01;

/// Which precedence rule classified a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryRule {
    Base,
    Symmetry,
    Lateral,
    Free,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Constraint {
    pub tag: NodeTag,
    pub fixity: Fixity,
    pub rule: BoundaryRule,
}

/// Per-node constraints plus how many nodes each rule caught.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundaryConditions {
    pub constraints: Vec<Constraint>,
    pub base: usize,
    pub symmetry: usize,
    pub lateral: usize,
    pub free: usize,
}

impl BoundaryConditions {
    /// Constraints that fix at least one axis, in node order.
    pub fn fixed(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter().filter(|c| !c.fixity.is_free())
    }
}

fn on_plane(value: f64, plane: f64) -> bool {
    (value - plane).abs() < BOUNDARY_TOLERANCE
}

/// Classifies a single node. Rules are tried in order and the first that
/// matches wins: base, symmetry planes, lateral faces, free.
///
/// # Arguments
/// * `node` - The node to classify
/// * `extents` - Modeled domain box
/// * `symmetry` - Whether the min-x and min-y faces are symmetry planes
pub fn classify_node(node: &Node, extents: &Extents, symmetry: Symmetry) -> (Fixity, BoundaryRule) {
    let p = node.position;

    if on_plane(p.z, extents.min.z) {
        return (Fixity::FIXED, BoundaryRule::Base);
    }

    let on_x_min = on_plane(p.x, extents.min.x);
    let on_y_min = on_plane(p.y, extents.min.y);
    let on_x_max = on_plane(p.x, extents.max.x);
    let on_y_max = on_plane(p.y, extents.max.y);

    if symmetry == Symmetry::Quarter && (on_x_min || on_y_min) {
        return (Fixity::new(on_x_min, on_y_min, false), BoundaryRule::Symmetry);
    }

    let (lateral_x, lateral_y) = match symmetry {
        Symmetry::Quarter => (on_x_max, on_y_max),
        Symmetry::Full => (on_x_min || on_x_max, on_y_min || on_y_max),
    };
    if lateral_x || lateral_y {
        return (Fixity::new(lateral_x, lateral_y, false), BoundaryRule::Lateral);
    }

    (Fixity::FREE, BoundaryRule::Free)
}

/// Classifies every node of the mesh.
pub fn classify(mesh: &Mesh, extents: &Extents, symmetry: Symmetry) -> BoundaryConditions {
    let mut conditions = BoundaryConditions::default();

    for node in mesh.nodes() {
        let (fixity, rule) = classify_node(node, extents, symmetry);
        match rule {
            BoundaryRule::Base => conditions.base += 1,
            BoundaryRule::Symmetry => conditions.symmetry += 1,
            BoundaryRule::Lateral => conditions.lateral += 1,
            BoundaryRule::Free => conditions.free += 1,
        }
        conditions.constraints.push(Constraint {
            tag: node.tag,
            fixity,
            rule,
        });
    }

    info!(
        "boundary conditions: {} base, {} symmetry, {} lateral, {} free",
        conditions.base, conditions.symmetry, conditions.lateral, conditions.free
    );

    conditions
}
