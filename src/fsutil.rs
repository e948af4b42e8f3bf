//! Small filesystem utilities.

use std::path::Path;

use crate::BootgraphResult;

pub fn write_text(path: &Path, value: &str) -> BootgraphResult<()> {
    ensure_parent(path)?;
    std::fs::write(path, value)?;
    Ok(())
}

pub(crate) fn ensure_parent(path: &Path) -> BootgraphResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
