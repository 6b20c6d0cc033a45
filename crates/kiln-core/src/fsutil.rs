//! Filesystem helpers shared by tasks.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use blake3::Hasher;

use crate::task::TaskError;

/// Write `contents` to `path` via a sibling temp file and rename.
///
/// Readers see either the previous file or the complete new one, never a
/// truncated write.
pub fn write_atomic(path: &Path, contents: impl AsRef<[u8]>) -> Result<(), TaskError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| TaskError::io(parent, e))?;
        }
    }

    let tmp = temp_sibling(path);
    fs::write(&tmp, contents).map_err(|e| TaskError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        TaskError::io(path, e)
    })
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.kiln-tmp"))
}

/// Hex blake3 hash of a file's contents.
pub fn hash_file(path: &Path) -> Result<String, TaskError> {
    let mut file = File::open(path).map_err(|e| TaskError::io(path, e))?;
    let mut hasher = Hasher::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf).map_err(|e| TaskError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// True when `dest` exists and was modified no earlier than `src`.
pub fn is_up_to_date(src: &Path, dest: &Path) -> bool {
    let modified = |p: &Path| fs::metadata(p).and_then(|m| m.modified()).ok();
    match (modified(src), modified(dest)) {
        (Some(src_time), Some(dest_time)) => dest_time >= src_time,
        _ => false,
    }
}

/// File stem as a `String` (`hero` for `images/src/hero.png`).
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Lowercased extension without the dot.
pub fn extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_atomically_and_creates_parents() {
        let temp = tempdir().unwrap();
        let out = temp.path().join("css/style.min.css");

        write_atomic(&out, "a{}").unwrap();

        assert_eq!(fs::read_to_string(&out).unwrap(), "a{}");
        let leftovers: Vec<_> = fs::read_dir(temp.path().join("css")).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn hashes_content_not_names() {
        let temp = tempdir().unwrap();
        let a = temp.path().join("a.bin");
        let b = temp.path().join("b.bin");
        fs::write(&a, b"same").unwrap();
        fs::write(&b, b"same").unwrap();

        assert_eq!(hash_file(&a).unwrap(), hash_file(&b).unwrap());
    }

    #[test]
    fn missing_destination_is_stale() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("a.png");
        fs::write(&src, b"x").unwrap();

        assert!(!is_up_to_date(&src, &temp.path().join("a.webp")));
    }

    #[test]
    fn splits_names() {
        let path = Path::new("images/src/Hero.PNG");
        assert_eq!(file_stem(path), "Hero");
        assert_eq!(extension(path), "png");
    }
}
