use std::{fs, io, path::Path};

/// Atomically replace `path` with `bytes` using the temp+rename pattern.
///
/// The rename is atomic on the filesystems we care about; a crash leaves
/// either the old snapshot or the new one, never a torn file.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let temp_path = path.with_extension("tmp");

    fs::write(&temp_path, bytes)?;
    fs::rename(&temp_path, path)?;

    Ok(())
}
