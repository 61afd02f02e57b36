//! Revision identifier lookup

use std::path::Path;
use std::process::Command;

use crate::error::PackError;

/// Short source-control hash of the working tree at `repo_dir`.
///
/// Build artifacts and version markers are named after this; a tree
/// without a retrievable revision cannot be packaged.
pub fn current_revision(repo_dir: &Path) -> Result<String, PackError> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .current_dir(repo_dir)
        .output()
        .map_err(|e| PackError::Revision(format!("cannot run git: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PackError::Revision(stderr.trim().to_string()));
    }

    let revision = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if revision.is_empty() {
        return Err(PackError::Revision("git returned an empty revision".to_string()));
    }
    Ok(revision)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outside_a_repository_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = current_revision(dir.path());
        assert!(matches!(result, Err(PackError::Revision(_))));
    }
}
