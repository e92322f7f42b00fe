use crate::scan::Candidate;
use std::path::{Path, PathBuf};

/// Where compressed files end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// Overwrite the source file.
    InPlace,
    /// Mirror the input's directory structure under this directory.
    Dir(PathBuf),
    /// Single-file input written to this exact path.
    File(PathBuf),
}

impl OutputTarget {
    pub fn resolve(input: &Path, output: Option<&Path>) -> Self {
        match output {
            None => OutputTarget::InPlace,
            Some(output) if input.is_file() => OutputTarget::File(output.to_path_buf()),
            Some(output) => OutputTarget::Dir(output.to_path_buf()),
        }
    }

    /// Destination for `candidate`. `extension` replaces the file extension
    /// when a format conversion was requested.
    pub fn destination(&self, candidate: &Candidate, extension: Option<&str>) -> PathBuf {
        let base = match self {
            OutputTarget::InPlace => candidate.path.clone(),
            OutputTarget::Dir(dir) => dir.join(&candidate.relative),
            OutputTarget::File(file) => file.clone(),
        };

        match extension {
            Some(ext) => base.with_extension(ext),
            None => base,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ImageKind;

    fn candidate(path: &str, relative: &str) -> Candidate {
        Candidate {
            path: PathBuf::from(path),
            relative: PathBuf::from(relative),
            kind: ImageKind::Png,
        }
    }

    #[test]
    fn test_in_place() {
        let c = candidate("/pics/a/b.png", "a/b.png");
        assert_eq!(
            OutputTarget::InPlace.destination(&c, None),
            PathBuf::from("/pics/a/b.png")
        );
        assert_eq!(
            OutputTarget::InPlace.destination(&c, Some("webp")),
            PathBuf::from("/pics/a/b.webp")
        );
    }

    #[test]
    fn test_dir_mirrors_structure() {
        let c = candidate("/pics/a/b.png", "a/b.png");
        let target = OutputTarget::Dir(PathBuf::from("/out"));
        assert_eq!(target.destination(&c, None), PathBuf::from("/out/a/b.png"));
        assert_eq!(target.destination(&c, Some("jpg")), PathBuf::from("/out/a/b.jpg"));
    }

    #[test]
    fn test_file_target() {
        let c = candidate("/pics/b.png", "b.png");
        let target = OutputTarget::File(PathBuf::from("/tmp/small.png"));
        assert_eq!(target.destination(&c, None), PathBuf::from("/tmp/small.png"));
        assert_eq!(target.destination(&c, Some("avif")), PathBuf::from("/tmp/small.avif"));
    }

    #[test]
    fn test_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("x.png");
        std::fs::write(&file, b"x").unwrap();

        assert_eq!(OutputTarget::resolve(dir.path(), None), OutputTarget::InPlace);
        assert_eq!(
            OutputTarget::resolve(dir.path(), Some(Path::new("out"))),
            OutputTarget::Dir(PathBuf::from("out"))
        );
        assert_eq!(
            OutputTarget::resolve(&file, Some(Path::new("small.png"))),
            OutputTarget::File(PathBuf::from("small.png"))
        );
    }
}
