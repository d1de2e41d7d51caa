use std::collections::{BTreeMap, HashMap};

use nalgebra::Point3;

use crate::{
    datatypes::{Element, MaterialId, Node, NodeTag},
    error::FootingError,
};

/// Nodes in a dense arena plus the element list referencing them by tag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    nodes: Vec<Node>,
    index: HashMap<NodeTag, usize>,
    pub elements: Vec<Element>,
}

impl Mesh {
    /// Builds a mesh from loose parts, rejecting repeated node tags.
    ///
    /// Element references are not checked here; see `verify`.
    pub fn from_parts(nodes: Vec<Node>, elements: Vec<Element>) -> Result<Mesh, FootingError> {
        let mut index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if index.insert(node.tag, i).is_some() {
                return Err(FootingError::Mesher(format!(
                    "duplicate node tag {}",
                    node.tag
                )));
            }
        }

        Ok(Mesh {
            nodes,
            index,
            elements,
        })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, tag: NodeTag) -> Option<&Node> {
        self.index.get(&tag).map(|&i| &self.nodes[i])
    }

    pub fn position(&self, tag: NodeTag) -> Option<Point3<f64>> {
        self.node(tag).map(|n| n.position)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    /// Element count per material, in ascending material order.
    pub fn material_counts(&self) -> BTreeMap<MaterialId, usize> {
        let mut counts = BTreeMap::new();
        for element in &self.elements {
            *counts.entry(element.material).or_insert(0) += 1;
        }
        counts
    }

    /// Sorted, deduplicated tags of every node used by `material` elements.
    pub fn nodes_of_material(&self, material: MaterialId) -> Vec<NodeTag> {
        let mut tags: Vec<NodeTag> = self
            .elements
            .iter()
            .filter(|e| e.material == material)
            .flat_map(|e| e.nodes.iter().copied())
            .collect();
        tags.sort_unstable();
        tags.dedup();
        tags
    }

    /// Tags of nodes shared between `material` elements and any other elements.
    pub fn shared_nodes(&self, material: MaterialId) -> Vec<NodeTag> {
        let own = self.nodes_of_material(material);
        let mut others: Vec<NodeTag> = self
            .elements
            .iter()
            .filter(|e| e.material != material)
            .flat_map(|e| e.nodes.iter().copied())
            .collect();
        others.sort_unstable();
        others.dedup();

        own.into_iter()
            .filter(|tag| others.binary_search(tag).is_ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::CellKind;

    fn node(tag: NodeTag, x: f64, y: f64, z: f64) -> Node {
        Node {
            tag,
            position: Point3::new(x, y, z),
        }
    }

    #[test]
    fn rejects_duplicate_tags() {
        let nodes = vec![node(1, 0.0, 0.0, 0.0), node(1, 1.0, 0.0, 0.0)];
        assert!(Mesh::from_parts(nodes, vec![]).is_err());
    }

    #[test]
    fn finds_nodes_shared_across_materials() {
        let nodes = vec![
            node(1, 0.0, 0.0, 0.0),
            node(2, 1.0, 0.0, 0.0),
            node(3, 0.0, 1.0, 0.0),
            node(4, 0.0, 0.0, 1.0),
            node(5, 0.0, 0.0, -1.0),
        ];
        let elements = vec![
            Element::new(1, CellKind::Tetrahedron, vec![1, 2, 3, 4], 4).unwrap(),
            Element::new(2, CellKind::Tetrahedron, vec![1, 3, 2, 5], 1).unwrap(),
        ];
        let mesh = Mesh::from_parts(nodes, elements).unwrap();

        assert_eq!(mesh.shared_nodes(4), vec![1, 2, 3]);
        assert_eq!(mesh.material_counts().get(&1), Some(&1));
        assert_eq!(mesh.position(5), Some(Point3::new(0.0, 0.0, -1.0)));
        assert!(mesh.node(9).is_none());
    }
}
