use anyhow::{Context, Result};
use fs_err::tokio as fs;
use std::path::{Path, PathBuf};

/// Writes `data` to `path` through a hidden sibling file and a rename, so an
/// interrupted write never leaves a truncated image behind.
///
/// An existing destination is resolved first: a symlink keeps pointing at
/// its target, which receives the new contents, and the target's
/// permissions carry over to the replacement.
pub async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let (target, permissions) = match fs::canonicalize(path).await {
        Ok(resolved) => {
            let permissions = fs::metadata(&resolved).await?.permissions();
            (resolved, Some(permissions))
        }
        Err(_) => (path.to_path_buf(), None),
    };

    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let temp_path = temp_sibling(&target);

    if let Err(err) = write_temp(&temp_path, data, permissions).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(err).with_context(|| format!("Failed to write {}", path.display()));
    }

    if let Err(err) = fs::rename(&temp_path, &target).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(err).with_context(|| format!("Failed to replace {}", path.display()));
    }

    Ok(())
}

async fn write_temp(
    temp_path: &Path,
    data: &[u8],
    permissions: Option<std::fs::Permissions>,
) -> std::io::Result<()> {
    fs::write(temp_path, data).await?;

    if let Some(permissions) = permissions {
        fs::set_permissions(temp_path, permissions).await?;
    }

    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    path.with_file_name(format!(".{file_name}.imgpress-tmp"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_atomic_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/out.png");

        write_atomic(&path, b"hello").await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
        assert!(!temp_sibling(&path).exists());
    }

    #[tokio::test]
    async fn test_write_atomic_replaces_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jpg");
        std::fs::write(&path, b"old contents").unwrap();

        write_atomic(&path, b"new").await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"new");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_write_atomic_writes_through_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("store");
        std::fs::create_dir(&store).unwrap();
        let real = store.join("real.jpg");
        std::fs::write(&real, b"old contents").unwrap();
        let link = dir.path().join("link.jpg");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        write_atomic(&link, b"new").await.unwrap();

        assert!(
            std::fs::symlink_metadata(&link)
                .unwrap()
                .file_type()
                .is_symlink()
        );
        assert_eq!(std::fs::read(&real).unwrap(), b"new");
        assert!(!temp_sibling(&real).exists());
        assert!(!temp_sibling(&link).exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_write_atomic_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("own.jpg");
        std::fs::write(&path, b"old contents").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).unwrap();

        write_atomic(&path, b"new").await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(std::fs::read(&path).unwrap(), b"new");
    }

    #[test]
    fn test_temp_sibling_is_hidden_next_to_target() {
        let temp = temp_sibling(Path::new("a/b/photo.jpg"));
        assert_eq!(temp, Path::new("a/b/.photo.jpg.imgpress-tmp"));
    }
}
