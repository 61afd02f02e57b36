//! Installation procedure
//!
//! Places the artifact and the device description file into the target
//! directory and records the installed revision in a version marker.
//! After a successful run the target contains exactly one current build,
//! one device description file and one marker.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::PackError;
use crate::revision::current_revision;

/// Where the console is installed on the device
pub const DEFAULT_INSTALL_DIR: &str = "/opt/reactorconsole";

/// Version marker file name; contents are exactly the revision identifier
pub const VERSION_MARKER: &str = "VERSION";

/// Inputs for the installation procedure
#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// The built single-file application artifact
    pub artifact: PathBuf,
    /// The device description file
    pub devices: PathBuf,
    /// Target directory, created if missing
    pub target_dir: PathBuf,
    /// Revision override; defaults to the working tree's revision
    pub revision: Option<String>,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            artifact: PathBuf::from("target/release/reactord"),
            devices: PathBuf::from("devices.yml"),
            target_dir: PathBuf::from(DEFAULT_INSTALL_DIR),
            revision: None,
        }
    }
}

/// Result of a successful installation
#[derive(Debug, Clone)]
pub struct InstallOutcome {
    pub target_dir: PathBuf,
    pub revision: String,
}

/// Run the installation procedure
pub fn install(options: &InstallOptions) -> Result<InstallOutcome, PackError> {
    for input in [&options.artifact, &options.devices] {
        if !input.is_file() {
            return Err(PackError::MissingInput(input.clone()));
        }
    }

    let revision = match &options.revision {
        Some(revision) => revision.clone(),
        None => current_revision(Path::new("."))?,
    };

    fs::create_dir_all(&options.target_dir)?;

    for input in [&options.artifact, &options.devices] {
        let name = input
            .file_name()
            .ok_or_else(|| PackError::MissingInput(input.clone()))?;
        fs::copy(input, options.target_dir.join(name))?;
    }

    // overwrites any previous marker
    fs::write(options.target_dir.join(VERSION_MARKER), &revision)?;

    info!(
        target = %options.target_dir.display(),
        %revision,
        "installed"
    );
    Ok(InstallOutcome {
        target_dir: options.target_dir.clone(),
        revision,
    })
}

/// Clean procedure: remove intermediate staging/build directories.
/// Nothing to remove is a success.
pub fn clean(staging_root: &Path) -> Result<(), PackError> {
    if staging_root.exists() {
        fs::remove_dir_all(staging_root)?;
        info!(dir = %staging_root.display(), "removed");
    }
    Ok(())
}
