use anyhow::{Context, Result};
use std::path::Path;

/// Write `bytes` to `path` verbatim, creating parent directories and replacing any existing file.
pub fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory {}", parent.display()))?;
    }

    std::fs::write(path, bytes)
        .with_context(|| format!("failed to write output file {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_missing_directories_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/out.csv");

        write_output(&path, b"first, longer content\n").unwrap();
        write_output(&path, b"a,b\n").unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"a,b\n");
    }
}
