//! Packaging procedure
//!
//! Copies the built artifact and the device description file into a fresh
//! staging directory, archives the staged files flat into
//! `reactorconsole-<revision>.tar.gz`, removes the staging directory and
//! leaves the archive in the output directory.
//!
//! Archive determinism: entries are sorted by name, carry zeroed
//! timestamps and root ownership, and a fixed mode. Re-packaging the same
//! inputs at the same revision produces byte-identical output; an
//! existing archive of the same name is overwritten.

use std::fs;
use std::fs::File;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::PackError;
use crate::revision::current_revision;

/// Archive base name
pub const ARCHIVE_PREFIX: &str = "reactorconsole";

/// Inputs for the packaging procedure
#[derive(Debug, Clone)]
pub struct PackageOptions {
    /// The built single-file application artifact
    pub artifact: PathBuf,
    /// The device description file, copied verbatim
    pub devices: PathBuf,
    /// Where the archive is written
    pub output_dir: PathBuf,
    /// Where staging directories are created (and cleaned from)
    pub staging_root: PathBuf,
    /// Revision override; defaults to the working tree's revision
    pub revision: Option<String>,
}

impl Default for PackageOptions {
    fn default() -> Self {
        Self {
            artifact: PathBuf::from("target/release/reactord"),
            devices: PathBuf::from("devices.yml"),
            output_dir: PathBuf::from("."),
            staging_root: PathBuf::from("build"),
            revision: None,
        }
    }
}

/// Result of a successful packaging run
#[derive(Debug, Clone)]
pub struct PackageOutcome {
    pub archive: PathBuf,
    pub revision: String,
}

/// Run the packaging procedure
pub fn package(options: &PackageOptions) -> Result<PackageOutcome, PackError> {
    // validate inputs before touching the filesystem; a failed run must
    // not leave an archive behind
    for input in [&options.artifact, &options.devices] {
        if !input.is_file() {
            return Err(PackError::MissingInput(input.clone()));
        }
    }

    let revision = match &options.revision {
        Some(revision) => revision.clone(),
        None => current_revision(Path::new("."))?,
    };

    let staging = options
        .staging_root
        .join(format!("stage-{}", Uuid::new_v4()));
    fs::create_dir_all(&staging)?;
    debug!(staging = %staging.display(), "staging directory created");

    let result = stage_and_archive(options, &staging, &revision);

    // the staging directory is scratch space either way
    if let Err(e) = fs::remove_dir_all(&staging) {
        debug!(%e, "could not remove staging directory");
    }

    let archive = result?;
    info!(archive = %archive.display(), %revision, "package built");
    Ok(PackageOutcome { archive, revision })
}

fn stage_and_archive(
    options: &PackageOptions,
    staging: &Path,
    revision: &str,
) -> Result<PathBuf, PackError> {
    let mut staged = Vec::new();
    for input in [&options.artifact, &options.devices] {
        let name = input
            .file_name()
            .ok_or_else(|| PackError::MissingInput(input.clone()))?;
        let dest = staging.join(name);
        fs::copy(input, &dest)?;
        staged.push(dest);
    }
    // sorted entry order is part of the determinism contract
    staged.sort_by_key(|p| p.file_name().map(|n| n.to_os_string()));

    fs::create_dir_all(&options.output_dir)?;
    let archive_path = options
        .output_dir
        .join(format!("{}-{}.tar.gz", ARCHIVE_PREFIX, revision));

    let file = File::create(&archive_path)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for path in &staged {
        let data = fs::read(path)?;
        let name = path
            .file_name()
            .ok_or_else(|| PackError::Archive(format!("unnamed entry: {}", path.display())))?;

        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);
        builder
            .append_data(&mut header, name, data.as_slice())
            .map_err(|e| PackError::Archive(e.to_string()))?;
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| PackError::Archive(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| PackError::Archive(e.to_string()))?;

    Ok(archive_path)
}
