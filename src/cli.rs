//! The command line interface for the program.
use crate::backpack::Backpack;
use crate::clustering::ClusteringOutputs;
use crate::log;
use crate::optimisation::run_collective_pool_milp;
use crate::output::{DataWriter, create_output_directory, get_output_dir};
use crate::settings::Settings;
use ::log::{info, warn};
use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};

pub mod example;
use example::ExampleSubcommands;
pub mod settings;
use settings::SettingsSubcommands;

/// The command line interface for the program.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// The available commands.
    #[command(subcommand)]
    command: Option<Commands>,
    /// Flag to provide the CLI docs as markdown
    #[arg(long, hide = true)]
    markdown_help: bool,
}

/// Options for the run command
#[derive(Args, Default)]
pub struct RunOpts {
    /// Directory for output files
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
    /// Whether to overwrite the output directory if it already exists
    #[arg(long)]
    pub overwrite: bool,
    /// Whether to write additional information to CSV files
    #[arg(long)]
    pub debug_model: bool,
}

/// The available commands.
#[derive(Subcommand)]
enum Commands {
    /// Optimise a community.
    Run {
        /// Path to the backpack file.
        backpack_path: PathBuf,
        /// Path to clustering outputs, to optimise over representative days only.
        #[arg(long)]
        clustering: Option<PathBuf>,
        /// Other run options
        #[command(flatten)]
        opts: RunOpts,
    },
    /// Manage example backpacks.
    Example {
        /// The available subcommands for managing example backpacks.
        #[command(subcommand)]
        subcommand: ExampleSubcommands,
    },
    /// Validate a backpack.
    Validate {
        /// Path to the backpack file.
        backpack_path: PathBuf,
    },
    /// Manage settings file.
    Settings {
        /// The subcommands for managing the settings file.
        #[command(subcommand)]
        subcommand: SettingsSubcommands,
    },
}

impl Commands {
    /// Execute the supplied CLI command
    fn execute(self) -> Result<()> {
        match self {
            Self::Run {
                backpack_path,
                clustering,
                opts,
            } => handle_run_command(&backpack_path, clustering.as_deref(), &opts, None),
            Self::Example { subcommand } => subcommand.execute(),
            Self::Validate { backpack_path } => handle_validate_command(&backpack_path, None),
            Self::Settings { subcommand } => subcommand.execute(),
        }
    }
}

/// Parse CLI arguments and start the program
pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    // Invoked as: `$ rec_sizing --markdown-help`
    if cli.markdown_help {
        clap_markdown::print_help_markdown::<Cli>();
        return Ok(());
    }

    let Some(command) = cli.command else {
        let help_str = Cli::command().render_long_help().to_string();
        println!("{help_str}");
        return Ok(());
    };

    command.execute()
}

/// Load program settings, if not provided
fn load_settings(settings: Option<Settings>) -> Result<Settings> {
    match settings {
        Some(settings) => Ok(settings),
        None => Settings::load().context("Failed to load settings."),
    }
}

/// Load a backpack, reducing it to representative days if clustering outputs are given
fn load_backpack(backpack_path: &Path, clustering_path: Option<&Path>) -> Result<Backpack> {
    let backpack = Backpack::from_path(backpack_path).context("Failed to load backpack.")?;
    let Some(clustering_path) = clustering_path else {
        return Ok(backpack);
    };

    let clustering = ClusteringOutputs::from_path(clustering_path)
        .context("Failed to load clustering outputs.")?;
    let backpack = backpack.with_representative_days(&clustering)?;
    info!(
        "Using {} representative days from {}",
        clustering.cluster_nr_days.len(),
        clustering_path.display()
    );

    Ok(backpack)
}

/// Handle the `run` command.
pub fn handle_run_command(
    backpack_path: &Path,
    clustering_path: Option<&Path>,
    opts: &RunOpts,
    settings: Option<Settings>,
) -> Result<()> {
    let mut settings = load_settings(settings)?;

    // These settings can be overridden by command-line arguments
    if opts.debug_model {
        settings.debug_model = true;
    }
    if opts.overwrite {
        settings.overwrite = true;
    }

    // Get path to output folder
    let pathbuf: PathBuf;
    let output_path = if let Some(p) = opts.output_dir.as_deref() {
        p
    } else {
        pathbuf = get_output_dir(backpack_path)?;
        &pathbuf
    };

    let overwrite =
        create_output_directory(output_path, settings.overwrite).with_context(|| {
            format!(
                "Failed to create output directory: {}",
                output_path.display()
            )
        })?;

    // The logger may already have been set up, e.g. if running more than one example in a process
    if !log::is_logger_initialised() {
        log::init(Some(settings.log_level.as_str()), Some(output_path))
            .context("Failed to initialise logging.")?;
    }

    // NB: We have to wait until the logger is initialised to display this warning
    if overwrite {
        warn!("Output folder will be overwritten");
    }

    let backpack = load_backpack(backpack_path, clustering_path)?;
    info!("Loaded backpack from {}", backpack_path.display());
    info!("Output folder: {}", output_path.display());

    let solver = settings.solver();
    let outputs = run_collective_pool_milp(&backpack, &solver)?;

    let mut writer = DataWriter::create(output_path, settings.debug_model)?;
    writer.write_outputs(&outputs)?;
    writer.flush()?;
    info!("Optimisation complete with status {}", outputs.milp_status);

    Ok(())
}

/// Handle the `validate` command.
pub fn handle_validate_command(backpack_path: &Path, settings: Option<Settings>) -> Result<()> {
    let settings = load_settings(settings)?;

    // We won't save log files when running the validate command
    if !log::is_logger_initialised() {
        log::init(Some(settings.log_level.as_str()), None)
            .context("Failed to initialise logging.")?;
    }

    let backpack = Backpack::from_path(backpack_path).context("Failed to load backpack.")?;
    let horizon = backpack.resolve().context("Failed to validate backpack.")?;
    info!(
        "Backpack validation successful: {} meters over {} steps",
        backpack.meters.len(),
        horizon.len()
    );

    Ok(())
}
