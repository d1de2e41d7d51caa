use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use log::info;

use footing::{
    boundary::{self, BoundaryConditions},
    config::{self, ModelConfig, OutputFormat},
    datatypes::MaterialId,
    error::FootingError,
    interchange, logger, mesher, post_processor, solver, verify, vtu,
};

#[derive(Parser)]
#[command(
    name = "footing",
    version,
    about = "Soil-footing mesh builder and load test deck writer"
)]
struct Cli {
    /// Print debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build, verify and export the mesh described by a model record
    Mesh {
        config: PathBuf,
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
        /// Fail when verification finds problems
        #[arg(long)]
        strict: bool,
    },
    /// Build the mesh and write a complete load test deck
    Deck {
        config: PathBuf,
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
    /// Convert a VTU mesh to node and element files
    Convert {
        mesh: PathBuf,
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
    /// Check a VTU mesh for inverted cells, dangling nodes and the footing interface
    Verify {
        mesh: PathBuf,
        #[arg(long)]
        footing_material: Option<MaterialId>,
    },
}

fn create_dir(dir: &Path) -> Result<(), FootingError> {
    std::fs::create_dir_all(dir).map_err(|err| FootingError::io(dir, err))
}

fn load(path: &Path) -> Result<ModelConfig, FootingError> {
    let config = config::load_config(&path.to_string_lossy())?;
    info!("loaded model from {}", path.display());
    config.print_summary();
    Ok(config)
}

fn build_mesh(
    config: &ModelConfig,
    strict: bool,
) -> Result<(mesher::MeshBuild, BoundaryConditions), FootingError> {
    let build = mesher::run(config)?;

    let report = verify::verify(&build.mesh, Some(config.footing_material.material));
    report.log();
    if !report.is_valid() {
        if strict {
            return Err(FootingError::Mesher("mesh failed verification".to_owned()));
        }
        log::warn!(target: "mesh", "continuing with a mesh that failed verification");
    }

    let conditions = boundary::classify(&build.mesh, &config.extents(), config.domain.symmetry);
    Ok((build, conditions))
}

fn export(
    config: &ModelConfig,
    build: &mesher::MeshBuild,
    conditions: &BoundaryConditions,
    dir: &Path,
    source: &str,
) -> Result<(), FootingError> {
    for format in &config.output.formats {
        match format {
            OutputFormat::Tcl => {
                interchange::write_mesh(&build.mesh, dir)?;
                interchange::write_boundary(conditions, dir)?;
                post_processor::write_mesh_info(&build.mesh, source, dir)?;
            }
            OutputFormat::Vtu => {
                let path = dir.join(format!("{}.vtu", config.output.filename));
                vtu::write(&build.mesh, &path)?;
            }
        }
    }
    Ok(())
}

fn run(cli: Cli) -> Result<(), FootingError> {
    match cli.command {
        Command::Mesh {
            config,
            output,
            strict,
        } => {
            let model = load(&config)?;
            let (build, conditions) = build_mesh(&model, strict)?;
            create_dir(&output)?;
            export(
                &model,
                &build,
                &conditions,
                &output,
                &config.display().to_string(),
            )?;
        }
        Command::Deck { config, output } => {
            let model = load(&config)?;
            let (build, conditions) = build_mesh(&model, false)?;
            create_dir(&output)?;
            export(
                &model,
                &build,
                &conditions,
                &output,
                &config.display().to_string(),
            )?;
            solver::write_deck(&model, &build, &output)?;
        }
        Command::Convert { mesh, output } => {
            let converted = vtu::read(&mesh)?;
            create_dir(&output)?;
            interchange::write_mesh(&converted, &output)?;
            post_processor::write_mesh_info(&converted, &mesh.display().to_string(), &output)?;
        }
        Command::Verify {
            mesh,
            footing_material,
        } => {
            let loaded = vtu::read(&mesh)?;
            let report = verify::verify(&loaded, footing_material);
            report.log();
            if !report.is_valid() {
                return Err(FootingError::Mesher(format!(
                    "{} failed verification",
                    mesh.display()
                )));
            }
            info!("{} passed verification", mesh.display());
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    logger::init(cli.verbose);

    if let Err(err) = run(cli) {
        println!("error: {err}");
        std::process::exit(1)
    }
}
