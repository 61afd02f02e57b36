//! reactorctl - Operator tool for the reactor console
//!
//! Wraps the packaging and installation procedures:
//!
//! ```bash
//! reactorctl package                      # reactorconsole-<rev>.tar.gz
//! reactorctl install --target /opt/reactorconsole
//! reactorctl clean
//! reactorctl revision
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reactor_pack::{
    clean, current_revision, install, package, InstallOptions, PackageOptions,
    DEFAULT_INSTALL_DIR,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "reactorctl")]
#[command(version, about = "Package and install the reactor console")]
struct Cli {
    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the distributable archive from the built artifact and the
    /// device description file
    Package {
        /// Built application artifact
        #[arg(long, default_value = "target/release/reactord")]
        artifact: PathBuf,

        /// Device description file, bundled verbatim
        #[arg(long, default_value = "devices.yml")]
        devices: PathBuf,

        /// Directory the archive is written to
        #[arg(long, default_value = ".")]
        output: PathBuf,

        /// Staging area for intermediate directories
        #[arg(long, default_value = "build")]
        staging: PathBuf,

        /// Revision override (defaults to the working tree revision)
        #[arg(long)]
        revision: Option<String>,
    },

    /// Install the artifact, device file and version marker
    Install {
        /// Built application artifact
        #[arg(long, default_value = "target/release/reactord")]
        artifact: PathBuf,

        /// Device description file
        #[arg(long, default_value = "devices.yml")]
        devices: PathBuf,

        /// Target directory
        #[arg(long, default_value = DEFAULT_INSTALL_DIR)]
        target: PathBuf,

        /// Revision override (defaults to the working tree revision)
        #[arg(long)]
        revision: Option<String>,
    },

    /// Remove intermediate build directories
    Clean {
        /// Staging area to remove
        #[arg(long, default_value = "build")]
        staging: PathBuf,
    },

    /// Print the working tree revision identifier
    Revision,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_target(false)
        .init();

    match cli.command {
        Commands::Package {
            artifact,
            devices,
            output,
            staging,
            revision,
        } => {
            let outcome = package(&PackageOptions {
                artifact,
                devices,
                output_dir: output,
                staging_root: staging,
                revision,
            })
            .context("packaging failed")?;
            println!("{}", outcome.archive.display());
        }

        Commands::Install {
            artifact,
            devices,
            target,
            revision,
        } => {
            let outcome = install(&InstallOptions {
                artifact,
                devices,
                target_dir: target,
                revision,
            })
            .context("installation failed")?;
            println!(
                "installed revision {} into {}",
                outcome.revision,
                outcome.target_dir.display()
            );
        }

        Commands::Clean { staging } => {
            clean(&staging).context("clean failed")?;
        }

        Commands::Revision => {
            let revision = current_revision(Path::new(".")).context("no revision available")?;
            println!("{}", revision);
        }
    }

    Ok(())
}
