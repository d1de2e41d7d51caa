//! Plain-text mesh interchange.
//!
//! One record per line, in the solver's own command syntax so the files can
//! be sourced directly:
//!
//! ```text
//! node <tag> <x> <y> <z>
//! element <type> <tag> <n1> ... <nk> <material>
//! fix <tag> <x> <y> <z>
//! ```
//!
//! `#` starts a comment. Blank lines are ignored.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use log::info;
use nalgebra::Point3;

use crate::{
    boundary::BoundaryConditions,
    datatypes::{CellKind, Element, Fixity, Node, NodeTag},
    error::FootingError,
    mesh::Mesh,
};

pub const NODES_FILE: &str = "nodes.tcl";
pub const ELEMENTS_FILE: &str = "elements.tcl";
pub const FIXITIES_FILE: &str = "fixities.tcl";

#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Node(Node),
    Element(Element),
    Fix { node: NodeTag, fixity: Fixity },
}

fn parse_flag(token: &str) -> Result<bool, String> {
    match token {
        "0" => Ok(false),
        "1" => Ok(true),
        other => Err(format!("invalid fixity flag '{other}', expected 0 or 1")),
    }
}

fn parse_number<T: std::str::FromStr>(token: &str, what: &str) -> Result<T, String> {
    token
        .parse()
        .map_err(|_| format!("invalid {what} '{token}'"))
}

/// Parses one line. Comments and blank lines yield `None`.
pub fn parse_line(line: &str) -> Result<Option<Record>, String> {
    let content = match line.find('#') {
        Some(i) => &line[..i],
        None => line,
    };
    let tokens: Vec<&str> = content.split_whitespace().collect();
    let Some((&keyword, rest)) = tokens.split_first() else {
        return Ok(None);
    };

    match keyword {
        "node" => {
            if rest.len() != 4 {
                return Err(format!(
                    "node record needs a tag and 3 coordinates, got {} values",
                    rest.len()
                ));
            }
            let tag = parse_number(rest[0], "node tag")?;
            let x = parse_number(rest[1], "x coordinate")?;
            let y = parse_number(rest[2], "y coordinate")?;
            let z = parse_number(rest[3], "z coordinate")?;
            Ok(Some(Record::Node(Node {
                tag,
                position: Point3::new(x, y, z),
            })))
        }
        "element" => {
            let Some((&type_name, values)) = rest.split_first() else {
                return Err("element record without a type".to_owned());
            };
            let kind = CellKind::from_solver_name(type_name)
                .ok_or_else(|| format!("unsupported element type '{type_name}'"))?;
            let expected = kind.node_count() + 2;
            if values.len() != expected {
                return Err(format!(
                    "{type_name} record needs {expected} values, got {}",
                    values.len()
                ));
            }

            let tag = parse_number(values[0], "element tag")?;
            let nodes = values[1..values.len() - 1]
                .iter()
                .map(|t| parse_number(t, "node tag"))
                .collect::<Result<Vec<_>, _>>()?;
            let material = parse_number(values[values.len() - 1], "material id")?;

            Element::new(tag, kind, nodes, material)
                .map(|e| Some(Record::Element(e)))
                .map_err(|err| err.to_string())
        }
        "fix" => {
            if rest.len() != 4 {
                return Err(format!(
                    "fix record needs a tag and 3 flags, got {} values",
                    rest.len()
                ));
            }
            Ok(Some(Record::Fix {
                node: parse_number(rest[0], "node tag")?,
                fixity: Fixity::new(
                    parse_flag(rest[1])?,
                    parse_flag(rest[2])?,
                    parse_flag(rest[3])?,
                ),
            }))
        }
        other => Err(format!("unknown record '{other}'")),
    }
}

/// Parses a whole document, naming `file` and the line in any error.
pub fn parse(contents: &str, file: &str) -> Result<Vec<Record>, FootingError> {
    let mut records = Vec::new();
    for (i, line) in contents.lines().enumerate() {
        match parse_line(line) {
            Ok(Some(record)) => records.push(record),
            Ok(None) => {}
            Err(message) => {
                return Err(FootingError::Parse {
                    file: file.to_owned(),
                    line: i + 1,
                    message,
                })
            }
        }
    }
    Ok(records)
}

pub fn write_nodes<W: Write>(writer: &mut W, nodes: &[Node]) -> std::io::Result<()> {
    writeln!(writer, "# {} nodes", nodes.len())?;
    for node in nodes {
        let p = node.position;
        writeln!(writer, "node {} {} {} {}", node.tag, p.x, p.y, p.z)?;
    }
    Ok(())
}

pub fn write_elements<W: Write>(writer: &mut W, elements: &[Element]) -> std::io::Result<()> {
    writeln!(writer, "# {} elements", elements.len())?;
    for element in elements {
        write!(writer, "element {} {}", element.kind.solver_name(), element.tag)?;
        for node in &element.nodes {
            write!(writer, " {node}")?;
        }
        writeln!(writer, " {}", element.material)?;
    }
    Ok(())
}

/// Writes a `fix` record for every node with at least one fixed axis.
pub fn write_fixities<W: Write>(
    writer: &mut W,
    conditions: &BoundaryConditions,
) -> std::io::Result<()> {
    writeln!(
        writer,
        "# {} base, {} symmetry, {} lateral",
        conditions.base, conditions.symmetry, conditions.lateral
    )?;
    for constraint in conditions.fixed() {
        let [x, y, z] = constraint.fixity.flags();
        writeln!(writer, "fix {} {x} {y} {z}", constraint.tag)?;
    }
    Ok(())
}

fn write_file(
    path: &Path,
    body: impl FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
) -> Result<(), FootingError> {
    let file = File::create(path).map_err(|err| FootingError::io(path, err))?;
    let mut writer = BufWriter::new(file);
    body(&mut writer)
        .and_then(|_| writer.flush())
        .map_err(|err| FootingError::io(path, err))
}

/// Writes `nodes.tcl` and `elements.tcl` into `dir`.
///
/// # Returns
/// The paths of the node and element files
pub fn write_mesh(mesh: &Mesh, dir: &Path) -> Result<(PathBuf, PathBuf), FootingError> {
    let nodes_path = dir.join(NODES_FILE);
    let elements_path = dir.join(ELEMENTS_FILE);

    write_file(&nodes_path, |w| write_nodes(w, mesh.nodes()))?;
    write_file(&elements_path, |w| write_elements(w, &mesh.elements))?;

    info!(
        "wrote {} and {}",
        nodes_path.display(),
        elements_path.display()
    );
    Ok((nodes_path, elements_path))
}

/// Writes `fixities.tcl` into `dir`.
pub fn write_boundary(
    conditions: &BoundaryConditions,
    dir: &Path,
) -> Result<PathBuf, FootingError> {
    let path = dir.join(FIXITIES_FILE);
    write_file(&path, |w| write_fixities(w, conditions))?;
    info!("wrote {}", path.display());
    Ok(path)
}

/// Reads records from any number of files into one mesh. Support records
/// are skipped.
pub fn read_mesh(paths: &[&Path]) -> Result<Mesh, FootingError> {
    let mut nodes = Vec::new();
    let mut elements = Vec::new();

    for path in paths {
        let contents =
            std::fs::read_to_string(path).map_err(|err| FootingError::io(*path, err))?;
        for record in parse(&contents, &path.display().to_string())? {
            match record {
                Record::Node(n) => nodes.push(n),
                Record::Element(e) => elements.push(e),
                Record::Fix { .. } => {}
            }
        }
    }

    Mesh::from_parts(nodes, elements)
}
