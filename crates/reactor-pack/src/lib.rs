//! reactor-pack - Packaging and installation for the reactor console
//!
//! Single-shot filesystem procedures, driven by `reactorctl`:
//! - [`package`]: stage the built artifact and the device description
//!   file, produce `reactorconsole-<revision>.tar.gz`
//! - [`install`]: place both into the target directory and write the
//!   version marker
//! - [`clean`]: drop intermediate staging directories
//!
//! Archives are deterministic: packaging the same revision with the same
//! inputs twice yields byte-identical output.

pub mod error;
pub mod install;
pub mod package;
pub mod revision;

pub use error::PackError;
pub use install::{clean, install, InstallOptions, InstallOutcome, DEFAULT_INSTALL_DIR, VERSION_MARKER};
pub use package::{package, PackageOptions, PackageOutcome, ARCHIVE_PREFIX};
pub use revision::current_revision;
