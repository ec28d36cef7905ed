//! Raw tensor dumps for comparing intermediate values against a reference run.

use crate::error::{ResourceError, Result};
use std::path::{Path, PathBuf};

/// Write `data` as packed little-endian f32 to `dir/name`.
///
/// The directory is created if needed. Returns the written path.
pub fn dump_f32(dir: &Path, name: &str, data: &[f32]) -> Result<PathBuf> {
    let path = dir.join(name);

    std::fs::create_dir_all(dir).map_err(|source| ResourceError::Write {
        path: dir.to_path_buf(),
        source,
    })?;

    let bytes: Vec<u8> = data.iter().flat_map(|x| x.to_le_bytes()).collect();
    std::fs::write(&path, bytes).map_err(|source| ResourceError::Write {
        path: path.clone(),
        source,
    })?;

    tracing::debug!(path = ?path.display(), floats = data.len(), "tensor dumped");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_is_little_endian_f32() {
        let dir = std::env::temp_dir().join("axwhisper_test_dump");
        let path = dump_f32(&dir, "logits.bin", &[1.0, -2.5]).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[..4], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[4..], &(-2.5f32).to_le_bytes());

        std::fs::remove_dir_all(dir).ok();
    }
}
