//! VTK unstructured grid (`.vtu`) output and input, ASCII encoding only.
//!
//! The document model below is serialized with quick-xml's serde support;
//! reading goes through roxmltree, which tolerates the layouts other tools
//! produce.

use std::{collections::HashMap, path::Path};

use log::{info, warn};
use nalgebra::Point3;
use serde::Serialize;

use crate::{
    datatypes::{CellKind, Element, MaterialId, Node},
    error::FootingError,
    mesh::Mesh,
};

/// Cell data array carrying the material of each cell.
pub const MATERIAL_ARRAY: &str = "material_id";
/// Accepted alternative name for the material array.
pub const LEGACY_MATERIAL_ARRAY: &str = "dominio";

#[derive(Debug, Serialize)]
#[serde(rename = "VTKFile")]
struct VtkFile {
    #[serde(rename = "@type")]
    kind: &'static str,
    #[serde(rename = "@version")]
    version: &'static str,
    #[serde(rename = "@byte_order")]
    byte_order: &'static str,
    #[serde(rename = "UnstructuredGrid")]
    grid: UnstructuredGrid,
}

#[derive(Debug, Serialize)]
struct UnstructuredGrid {
    #[serde(rename = "Piece")]
    piece: Piece,
}

#[derive(Debug, Serialize)]
struct Piece {
    #[serde(rename = "@NumberOfPoints")]
    number_of_points: usize,
    #[serde(rename = "@NumberOfCells")]
    number_of_cells: usize,
    #[serde(rename = "Points")]
    points: Points,
    #[serde(rename = "Cells")]
    cells: Cells,
    #[serde(rename = "CellData")]
    cell_data: CellData,
}

#[derive(Debug, Serialize)]
struct Points {
    #[serde(rename = "DataArray")]
    array: DataArray,
}

#[derive(Debug, Serialize)]
struct Cells {
    #[serde(rename = "DataArray")]
    arrays: Vec<DataArray>,
}

#[derive(Debug, Serialize)]
struct CellData {
    #[serde(rename = "@Scalars")]
    scalars: &'static str,
    #[serde(rename = "DataArray")]
    array: DataArray,
}

#[derive(Debug, Serialize)]
struct DataArray {
    #[serde(rename = "@type")]
    value_type: &'static str,
    #[serde(rename = "@Name", skip_serializing_if = "Option::is_none")]
    name: Option<&'static str>,
    #[serde(
        rename = "@NumberOfComponents",
        skip_serializing_if = "Option::is_none"
    )]
    components: Option<usize>,
    #[serde(rename = "@format")]
    format: &'static str,
    #[serde(rename = "$text")]
    values: String,
}

impl DataArray {
    fn ascii(value_type: &'static str, name: Option<&'static str>, values: String) -> DataArray {
        DataArray {
            value_type,
            name,
            components: None,
            format: "ascii",
            values,
        }
    }
}

fn join<T: ToString>(values: impl Iterator<Item = T>) -> String {
    values.map(|v| v.to_string()).collect::<Vec<_>>().join(" ")
}

/// Renders the mesh as a VTU document.
pub fn to_string(mesh: &Mesh) -> Result<String, FootingError> {
    let index: HashMap<usize, usize> = mesh
        .nodes()
        .iter()
        .enumerate()
        .map(|(i, n)| (n.tag, i))
        .collect();

    let mut connectivity = Vec::new();
    let mut offsets = Vec::with_capacity(mesh.element_count());
    for element in &mesh.elements {
        for tag in &element.nodes {
            let Some(&i) = index.get(tag) else {
                return Err(FootingError::Mesher(format!(
                    "element {} references missing node {tag}",
                    element.tag
                )));
            };
            connectivity.push(i);
        }
        offsets.push(connectivity.len());
    }

    let points = mesh.nodes().iter().map(|n| {
        let p = n.position;
        format!("{} {} {}", p.x, p.y, p.z)
    });

    let mut point_array = DataArray::ascii("Float64", None, join(points));
    point_array.components = Some(3);

    let document = VtkFile {
        kind: "UnstructuredGrid",
        version: "0.1",
        byte_order: "LittleEndian",
        grid: UnstructuredGrid {
            piece: Piece {
                number_of_points: mesh.node_count(),
                number_of_cells: mesh.element_count(),
                points: Points { array: point_array },
                cells: Cells {
                    arrays: vec![
                        DataArray::ascii(
                            "Int64",
                            Some("connectivity"),
                            join(connectivity.iter()),
                        ),
                        DataArray::ascii("Int64", Some("offsets"), join(offsets.iter())),
                        DataArray::ascii(
                            "UInt8",
                            Some("types"),
                            join(mesh.elements.iter().map(|e| e.kind.vtk_type())),
                        ),
                    ],
                },
                cell_data: CellData {
                    scalars: MATERIAL_ARRAY,
                    array: DataArray::ascii(
                        "Int32",
                        Some(MATERIAL_ARRAY),
                        join(mesh.elements.iter().map(|e| e.material)),
                    ),
                },
            },
        },
    };

    let body = quick_xml::se::to_string(&document)
        .map_err(|err| FootingError::PostProcessor(format!("VTU serialization failed: {err}")))?;
    Ok(format!("<?xml version=\"1.0\"?>\n{body}\n"))
}

pub fn write(mesh: &Mesh, path: &Path) -> Result<(), FootingError> {
    let contents = to_string(mesh)?;
    std::fs::write(path, contents).map_err(|err| FootingError::io(path, err))?;
    info!("wrote {}", path.display());
    Ok(())
}

fn vtu_error(message: impl Into<String>) -> FootingError {
    FootingError::Input(format!("VTU: {}", message.into()))
}

fn parse_values<T: std::str::FromStr>(
    array: roxmltree::Node,
    what: &str,
) -> Result<Vec<T>, FootingError> {
    if let Some(format) = array.attribute("format") {
        if format != "ascii" {
            return Err(FootingError::Unsupported(format!(
                "VTU data format '{format}' in {what}, only ascii is read"
            )));
        }
    }
    array
        .text()
        .unwrap_or_default()
        .split_whitespace()
        .map(|t| {
            t.parse()
                .map_err(|_| vtu_error(format!("invalid value '{t}' in {what}")))
        })
        .collect()
}

fn find_child<'a, 'input>(
    parent: roxmltree::Node<'a, 'input>,
    name: &str,
) -> Option<roxmltree::Node<'a, 'input>> {
    parent.children().find(|n| n.has_tag_name(name))
}

fn named_array<'a, 'input>(
    parent: roxmltree::Node<'a, 'input>,
    name: &str,
) -> Option<roxmltree::Node<'a, 'input>> {
    parent
        .children()
        .find(|n| n.has_tag_name("DataArray") && n.attribute("Name") == Some(name))
}

/// Parses a VTU document. Node tags follow point order from 1, element tags
/// follow the order of supported cells from 1.
pub fn from_str(contents: &str) -> Result<Mesh, FootingError> {
    let doc = roxmltree::Document::parse(contents)
        .map_err(|err| vtu_error(format!("malformed XML: {err}")))?;
    let piece = doc
        .descendants()
        .find(|n| n.has_tag_name("Piece"))
        .ok_or_else(|| vtu_error("no Piece element"))?;

    let points_array = find_child(piece, "Points")
        .and_then(|p| find_child(p, "DataArray"))
        .ok_or_else(|| vtu_error("no Points data"))?;
    let coords: Vec<f64> = parse_values(points_array, "Points")?;
    if coords.len() % 3 != 0 {
        return Err(vtu_error(format!(
            "{} point coordinates is not a multiple of 3",
            coords.len()
        )));
    }
    let nodes: Vec<Node> = coords
        .chunks_exact(3)
        .enumerate()
        .map(|(i, c)| Node {
            tag: i + 1,
            position: Point3::new(c[0], c[1], c[2]),
        })
        .collect();

    let cells = find_child(piece, "Cells").ok_or_else(|| vtu_error("no Cells element"))?;
    let array = |name: &str| -> Result<Vec<usize>, FootingError> {
        let node = named_array(cells, name)
            .ok_or_else(|| vtu_error(format!("no {name} array")))?;
        parse_values(node, name)
    };
    let connectivity = array("connectivity")?;
    let offsets = array("offsets")?;
    let types: Vec<u8> = named_array(cells, "types")
        .ok_or_else(|| vtu_error("no types array"))
        .and_then(|node| parse_values(node, "types"))?;
    if offsets.len() != types.len() {
        return Err(vtu_error(format!(
            "{} offsets for {} cell types",
            offsets.len(),
            types.len()
        )));
    }

    let materials: Option<Vec<MaterialId>> = match find_child(piece, "CellData").and_then(|cd| {
        named_array(cd, MATERIAL_ARRAY).or_else(|| named_array(cd, LEGACY_MATERIAL_ARRAY))
    }) {
        Some(node) => Some(parse_values(node, "cell materials")?),
        None => {
            warn!(target: "vtu", "no {MATERIAL_ARRAY} cell data, assigning material 1");
            None
        }
    };

    let mut elements = Vec::new();
    let mut skipped = 0;
    let mut start = 0;
    for (cell, (&end, &cell_type)) in offsets.iter().zip(types.iter()).enumerate() {
        if end < start || end > connectivity.len() {
            return Err(vtu_error(format!("cell {cell} has offset {end} out of range")));
        }
        let corners = &connectivity[start..end];
        start = end;

        let Some(kind) = CellKind::from_vtk_type(cell_type) else {
            skipped += 1;
            continue;
        };
        if let Some(&bad) = corners.iter().find(|&&i| i >= nodes.len()) {
            return Err(vtu_error(format!("cell {cell} references point {bad}")));
        }

        let material = match &materials {
            Some(m) => *m
                .get(cell)
                .ok_or_else(|| vtu_error(format!("no material for cell {cell}")))?,
            None => 1,
        };
        let tags = corners.iter().map(|&i| i + 1).collect();
        elements.push(Element::new(elements.len() + 1, kind, tags, material)?);
    }
    if skipped > 0 {
        warn!(target: "vtu", "skipped {skipped} cells of unsupported type");
    }

    Mesh::from_parts(nodes, elements)
}

pub fn read(path: &Path) -> Result<Mesh, FootingError> {
    let contents = std::fs::read_to_string(path).map_err(|err| FootingError::io(path, err))?;
    let mesh = from_str(&contents)?;
    info!(
        "loaded {} nodes and {} elements from {}",
        mesh.node_count(),
        mesh.element_count(),
        path.display()
    );
    Ok(mesh)
}
