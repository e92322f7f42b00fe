use crate::{
    cli::ScanArgs,
    config::ScanConfig,
    format::ImageKind,
    util::time::{TimeField, display_local, parse_after},
};
use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use globset::GlobSet;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A file selected for compression.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub path: PathBuf,
    /// Path relative to the scan root. For a single-file scan this is the file name.
    pub relative: PathBuf,
    pub kind: ImageKind,
}

#[derive(Debug, Clone, Copy)]
pub struct Since {
    pub at: DateTime<Utc>,
    pub field: TimeField,
}

#[derive(Debug, Default)]
pub struct ScanOptions {
    pub recursive: bool,
    pub since: Option<Since>,
    pub exclude: Option<GlobSet>,
}

impl ScanOptions {
    /// Combines command-line flags with the config file; flags win.
    pub fn from_args(args: &ScanArgs, config: &ScanConfig) -> Result<Self> {
        let since = match &args.after {
            Some(after) => {
                let at = parse_after(after).context("Failed to parse --after")?;
                let field = args.time_field.unwrap_or(config.time_field);
                info!(
                    "Only processing files whose {} is at or after {} (local time)",
                    field.as_str(),
                    display_local(at)
                );
                Some(Since { at, field })
            }
            None => None,
        };

        Ok(Self {
            recursive: config.recursive && !args.no_recursive,
            since,
            exclude: config.exclude_set()?,
        })
    }
}

#[derive(Debug, Default)]
pub struct Scan {
    pub candidates: Vec<Candidate>,
    /// Files dropped by the time filter, with unreadable timestamps, or GIFs.
    pub skipped: usize,
}

pub fn scan(root: &Path, supported: &[ImageKind], options: &ScanOptions) -> Result<Scan> {
    let metadata = fs_err::metadata(root)
        .with_context(|| format!("Input path does not exist: {}", root.display()))?;

    let mut scan = Scan::default();

    if metadata.is_file() {
        let relative = root
            .file_name()
            .map(PathBuf::from)
            .with_context(|| format!("Input path has no file name: {}", root.display()))?;
        consider(root, relative, supported, options, &mut scan);
        return Ok(scan);
    }

    if !metadata.is_dir() {
        bail!("Input path is neither a file nor a directory: {}", root.display());
    }

    let mut walker = WalkDir::new(root).follow_links(true).sort_by_file_name();
    if !options.recursive {
        walker = walker.max_depth(1);
    }

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Skipping unreadable entry: {err}");
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_path_buf();

        consider(entry.path(), relative, supported, options, &mut scan);
    }

    Ok(scan)
}

fn consider(
    path: &Path,
    relative: PathBuf,
    supported: &[ImageKind],
    options: &ScanOptions,
    scan: &mut Scan,
) {
    let Some(kind) = ImageKind::from_path(path) else {
        return;
    };

    if let Some(exclude) = &options.exclude
        && exclude.is_match(&relative)
    {
        debug!("Ignoring excluded file {}", path.display());
        return;
    }

    if kind == ImageKind::Gif {
        warn!("Skipping GIF file {}", path.display());
        scan.skipped += 1;
        return;
    }

    if !supported.contains(&kind) {
        debug!("Ignoring {kind} file {}", path.display());
        return;
    }

    if let Some(since) = options.since {
        let timestamp = fs_err::metadata(path).and_then(|meta| since.field.read(&meta));

        match timestamp {
            Ok(timestamp) => {
                if DateTime::<Utc>::from(timestamp) < since.at {
                    debug!(
                        "Skipping {} ({} is before the threshold)",
                        path.display(),
                        since.field.as_str()
                    );
                    scan.skipped += 1;
                    return;
                }
            }
            Err(err) => {
                warn!(
                    "Skipping {} (cannot read {}): {err}",
                    path.display(),
                    since.field.as_str()
                );
                scan.skipped += 1;
                return;
            }
        }
    }

    scan.candidates.push(Candidate {
        path: path.to_path_buf(),
        relative,
        kind,
    });
}
