use std::collections::HashMap;

use nalgebra::Point3;

use crate::datatypes::{Node, NodeTag};

type CellKey = (i64, i64, i64);

/// Node arena with a uniform spatial hash for coincidence queries.
///
/// Tags are handed out densely from 1 in insertion order. Cells are one
/// tolerance wide, so any node within tolerance of a query point lives in one
/// of the 27 cells around it.
#[derive(Debug)]
pub struct NodeArena {
    nodes: Vec<Node>,
    cells: HashMap<CellKey, Vec<usize>>,
    tolerance: f64,
}

impl NodeArena {
    pub fn new(tolerance: f64) -> NodeArena {
        NodeArena {
            nodes: Vec::new(),
            cells: HashMap::new(),
            tolerance,
        }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    fn key(&self, position: &Point3<f64>) -> CellKey {
        (
            (position.x / self.tolerance).floor() as i64,
            (position.y / self.tolerance).floor() as i64,
            (position.z / self.tolerance).floor() as i64,
        )
    }

    /// Appends a node without looking for coincident ones.
    pub fn push(&mut self, position: Point3<f64>) -> NodeTag {
        let index = self.nodes.len();
        let tag = index + 1;
        let key = self.key(&position);
        self.cells.entry(key).or_default().push(index);
        self.nodes.push(Node { tag, position });
        tag
    }

    /// Tag of the nearest node within tolerance of `position`.
    pub fn find(&self, position: &Point3<f64>) -> Option<NodeTag> {
        let (cx, cy, cz) = self.key(position);
        let mut best: Option<(f64, usize)> = None;

        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let Some(bucket) = self.cells.get(&(cx + dx, cy + dy, cz + dz)) else {
                        continue;
                    };
                    for &i in bucket {
                        let distance = (self.nodes[i].position - position).norm();
                        if distance > self.tolerance {
                            continue;
                        }
                        // ties go to the older node
                        match best {
                            Some((d, j)) if d < distance || (d == distance && j < i) => {}
                            _ => best = Some((distance, i)),
                        }
                    }
                }
            }
        }

        best.map(|(_, i)| self.nodes[i].tag)
    }

    /// Reuses a coincident node or appends a new one. The flag is true when
    /// an existing node was reused.
    pub fn find_or_push(&mut self, position: Point3<f64>) -> (NodeTag, bool) {
        match self.find(&position) {
            Some(tag) => (tag, true),
            None => (self.push(position), false),
        }
    }

    pub fn into_nodes(self) -> Vec<Node> {
        self.nodes
    }
}
