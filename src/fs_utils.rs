use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

/// Whether anything exists at `path`. Errors other than "not found"
/// (e.g. permission denied) are treated as "exists" so callers skip
/// rather than clobber.
pub async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(true)
}

/// Write `bytes` to `path`, creating missing parent directories first.
pub async fn write_creating_dirs(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("Failed to write file: {}", path.display()))?;

    debug!(path = %path.display(), bytes = bytes.len(), "Wrote file");
    Ok(())
}
