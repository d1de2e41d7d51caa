use nalgebra::Point3;

use crate::error::FootingError;

/// 1-based node identifier, shared verbatim with the solver.
pub type NodeTag = usize;
/// 1-based element identifier.
pub type ElementTag = usize;
/// Material/domain identifier carried by every element.
pub type MaterialId = u32;

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub tag: NodeTag,
    pub position: Point3<f64>,
}

/// Geometric cell types understood by the solver and the mesh formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellKind {
    Tetrahedron,
    Hexahedron,
}

impl CellKind {
    pub fn node_count(self) -> usize {
        match self {
            CellKind::Tetrahedron => 4,
            CellKind::Hexahedron => 8,
        }
    }

    /// Element type keyword used in the text interchange and Tcl decks.
    pub fn solver_name(self) -> &'static str {
        match self {
            CellKind::Tetrahedron => "FourNodeTetrahedron",
            CellKind::Hexahedron => "stdBrick",
        }
    }

    pub fn from_solver_name(name: &str) -> Option<CellKind> {
        match name {
            "FourNodeTetrahedron" => Some(CellKind::Tetrahedron),
            "stdBrick" => Some(CellKind::Hexahedron),
            _ => None,
        }
    }

    pub fn vtk_type(self) -> u8 {
        match self {
            CellKind::Tetrahedron => 10,
            CellKind::Hexahedron => 12,
        }
    }

    pub fn from_vtk_type(cell_type: u8) -> Option<CellKind> {
        match cell_type {
            10 => Some(CellKind::Tetrahedron),
            12 => Some(CellKind::Hexahedron),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: ElementTag,
    pub kind: CellKind,
    pub nodes: Vec<NodeTag>,
    pub material: MaterialId,
}

impl Element {
    /// Creates an element, checking the node count against the cell kind.
    pub fn new(
        tag: ElementTag,
        kind: CellKind,
        nodes: Vec<NodeTag>,
        material: MaterialId,
    ) -> Result<Element, FootingError> {
        if nodes.len() != kind.node_count() {
            return Err(FootingError::Mesher(format!(
                "element {tag} ({}) needs {} nodes, got {}",
                kind.solver_name(),
                kind.node_count(),
                nodes.len()
            )));
        }

        Ok(Element {
            tag,
            kind,
            nodes,
            material,
        })
    }

    /// Hexahedron in the bottom-face-then-top-face corner order.
    pub fn hexahedron(tag: ElementTag, nodes: [NodeTag; 8], material: MaterialId) -> Element {
        Element {
            tag,
            kind: CellKind::Hexahedron,
            nodes: nodes.to_vec(),
            material,
        }
    }
}

/// Per-axis translational constraint flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Fixity {
    pub x: bool,
    pub y: bool,
    pub z: bool,
}

impl Fixity {
    pub const FREE: Fixity = Fixity {
        x: false,
        y: false,
        z: false,
    };
    pub const FIXED: Fixity = Fixity {
        x: true,
        y: true,
        z: true,
    };

    pub fn new(x: bool, y: bool, z: bool) -> Fixity {
        Fixity { x, y, z }
    }

    pub fn is_free(self) -> bool {
        self == Fixity::FREE
    }

    /// Flags in solver order, 1 for fixed and 0 for free.
    pub fn flags(self) -> [u8; 3] {
        [self.x as u8, self.y as u8, self.z as u8]
    }
}

/// Attribute record handed to the solver's material API.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialParams {
    /// kPa
    pub youngs_modulus: f64,
    pub poisson_ratio: f64,
    /// kg/m3
    pub density: f64,
    /// kPa
    pub cohesion: Option<f64>,
    /// degrees
    pub friction_angle: Option<f64>,
}

/// A soil stratum. Depths are positive downward from the free surface.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub name: String,
    pub material: MaterialId,
    pub thickness: f64,
    pub depth_top: f64,
    pub depth_bottom: f64,
    pub params: MaterialParams,
}

impl Layer {
    /// Half-open `[depth_top, depth_bottom)` membership.
    pub fn contains_depth(&self, depth: f64) -> bool {
        self.depth_top <= depth && depth < self.depth_bottom
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symmetry {
    /// Whole domain, footing centred.
    Full,
    /// One quarter bounded by the x = 0 and y = 0 symmetry planes.
    Quarter,
}

impl Symmetry {
    /// Ratio between the physical load and the load carried by the model.
    pub fn load_factor(self) -> f64 {
        match self {
            Symmetry::Full => 1.0,
            Symmetry::Quarter => 4.0,
        }
    }
}

/// Axis-aligned box spanned by the modeled domain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extents {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

/// Full-domain dimensions as given in the model record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Domain {
    pub lx: f64,
    pub ly: f64,
    pub lz: f64,
    pub symmetry: Symmetry,
}

impl Domain {
    /// Extents actually meshed: the whole box, or its quarter at the origin.
    pub fn modeled_extents(&self) -> Extents {
        let (x_max, y_max) = match self.symmetry {
            Symmetry::Full => (self.lx, self.ly),
            Symmetry::Quarter => (self.lx / 2.0, self.ly / 2.0),
        };

        Extents {
            min: Point3::new(0.0, 0.0, -self.lz),
            max: Point3::new(x_max, y_max, 0.0),
        }
    }
}

/// Rectangular footing: `width` along x (B), `length` along y (L).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Footing {
    pub width: f64,
    pub length: f64,
    pub embedment: f64,
    pub thickness: f64,
}

impl Footing {
    pub fn top_z(&self) -> f64 {
        -self.embedment
    }

    pub fn bottom_z(&self) -> f64 {
        -(self.embedment + self.thickness)
    }

    pub fn area(&self) -> f64 {
        self.width * self.length
    }
}

/// Horizontal footprint of the footing inside the modeled domain.
///
/// Sides lying on a symmetry plane are closed: nodes on them belong to the
/// footing alone. The other sides are shared with the surrounding soil.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Footprint {
    pub x: (f64, f64),
    pub y: (f64, f64),
    pub closed_x_min: bool,
    pub closed_y_min: bool,
}

impl Footprint {
    pub fn new(domain: &Domain, footing: &Footing) -> Footprint {
        match domain.symmetry {
            Symmetry::Quarter => Footprint {
                x: (0.0, footing.width / 2.0),
                y: (0.0, footing.length / 2.0),
                closed_x_min: true,
                closed_y_min: true,
            },
            Symmetry::Full => {
                let cx = domain.lx / 2.0;
                let cy = domain.ly / 2.0;
                Footprint {
                    x: (cx - footing.width / 2.0, cx + footing.width / 2.0),
                    y: (cy - footing.length / 2.0, cy + footing.length / 2.0),
                    closed_x_min: false,
                    closed_y_min: false,
                }
            }
        }
    }

    /// Closed containment, used for element centroids and load nodes.
    pub fn contains(&self, x: f64, y: f64, tolerance: f64) -> bool {
        x >= self.x.0 - tolerance
            && x <= self.x.1 + tolerance
            && y >= self.y.0 - tolerance
            && y <= self.y.1 + tolerance
    }

    /// Containment that leaves the shared sides outside.
    pub fn covers(&self, x: f64, y: f64, tolerance: f64) -> bool {
        let in_x = if self.closed_x_min {
            x >= self.x.0 - tolerance
        } else {
            x > self.x.0 + tolerance
        } && x < self.x.1 - tolerance;
        let in_y = if self.closed_y_min {
            y >= self.y.0 - tolerance
        } else {
            y > self.y.0 + tolerance
        } && y < self.y.1 - tolerance;

        in_x && in_y
    }
}
