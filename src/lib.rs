//! Structured soil and footing meshes for plate load test simulations.
//!
//! The pipeline reads a model record (`config`), builds a hexahedral mesh of
//! the stratified soil with the footing embedded in it (`mesher`), checks it
//! (`verify`), assigns supports (`boundary`) and hands everything to an
//! external finite element engine through a session handle (`session`,
//! `solver`). Meshes travel as solver-syntax text (`interchange`) or VTU
//! (`vtu`).

pub mod boundary;
pub mod config;
pub mod datatypes;
pub mod error;
pub mod interchange;
pub mod logger;
pub mod materials;
pub mod mesh;
pub mod mesher;
pub mod post_processor;
pub mod session;
pub mod solver;
pub mod verify;
pub mod vtu;

pub use error::FootingError;
