use crate::{
    cli::TinifyArgs,
    config::Config,
    format::{ImageKind, TINIFY_FORMATS},
    output::OutputTarget,
    progress_bar::ProgressBar,
    report::Summary,
    scan::{Candidate, ScanOptions, scan},
    util::write::write_atomic,
    web_api::{Convert, RemoteCompressor, TinifyClient, Transform},
};
use anyhow::{Context, bail};
use fs_err::tokio as fs;
use indicatif::MultiProgress;
use log::{debug, info, warn};
use std::time::Duration;

pub const API_KEY_ENV: &str = "TINIFY_API_KEY";

/// A batch ready to run: where files go and what the API should do to them.
pub struct Job {
    pub target: OutputTarget,
    pub transform: Transform,
}

impl Job {
    fn extension(&self) -> Option<&'static str> {
        self.transform
            .convert
            .as_ref()
            .and_then(|convert| ImageKind::from_mime(&convert.mime))
            .map(ImageKind::extension)
    }
}

pub async fn tinify(
    multi_progress: MultiProgress,
    args: TinifyArgs,
    config: Config,
) -> anyhow::Result<Summary> {
    let api_key = resolve_api_key(args.key.clone(), &config)?;

    let scan_options = ScanOptions::from_args(&args.scan, &config.scan)?;
    let scan = scan(&args.scan.input, TINIFY_FORMATS, &scan_options)?;

    let transform = Transform {
        resize: args.resize.clone(),
        convert: args.convert.clone().map(|mime| Convert { mime }),
    };
    if let Some(convert) = &transform.convert
        && ImageKind::from_mime(&convert.mime).is_none()
    {
        warn!(
            "No known file extension for '{}', output files keep their names",
            convert.mime
        );
    }

    let job = Job {
        target: OutputTarget::resolve(&args.scan.input, args.scan.output.as_deref()),
        transform,
    };

    let mut client = TinifyClient::new(
        api_key,
        &config.tinify.endpoint,
        Duration::from_secs(config.tinify.timeout_secs),
    )?;
    client
        .validate()
        .await
        .context("Failed to validate the Tinify API key")?;

    info!(
        "Compressions used this month before starting: {}",
        format_count(client.compression_count())
    );

    let mut summary = Summary::new(scan.candidates.len(), scan.skipped);
    let pb = ProgressBar::new(multi_progress, "Compressing", scan.candidates.len());

    for candidate in &scan.candidates {
        pb.set_msg(&candidate.relative.to_string_lossy());
        process(&mut client, candidate, &job, &mut summary).await;
        pb.inc(1);
    }

    pb.finish();
    summary.log();
    info!(
        "Compressions used this month after finishing: {}",
        format_count(client.compression_count())
    );

    Ok(summary)
}

fn resolve_api_key(flag: Option<String>, config: &Config) -> anyhow::Result<String> {
    let key = [
        flag,
        std::env::var(API_KEY_ENV).ok(),
        config.tinify.key.clone(),
    ]
    .into_iter()
    .flatten()
    .find(|key| !key.trim().is_empty());

    match key {
        Some(key) => Ok(key),
        None => bail!(
            "No Tinify API key provided. Pass --key or set the {API_KEY_ENV} environment variable"
        ),
    }
}

fn format_count(count: Option<u32>) -> String {
    count.map_or_else(|| "unknown".to_string(), |count| count.to_string())
}

/// Compresses a single file, recording the outcome in `summary`.
pub async fn process<C: RemoteCompressor>(
    compressor: &mut C,
    candidate: &Candidate,
    job: &Job,
    summary: &mut Summary,
) {
    if let Err(err) = try_process(compressor, candidate, job, summary).await {
        summary.record_failure(&candidate.path, &err);
    }
}

async fn try_process<C: RemoteCompressor>(
    compressor: &mut C,
    candidate: &Candidate,
    job: &Job,
    summary: &mut Summary,
) -> anyhow::Result<()> {
    let original = fs::read(&candidate.path)
        .await
        .with_context(|| format!("Failed to read {}", candidate.path.display()))?;
    let before = original.len() as u64;

    debug!(
        "Uploading {} ({}, {} bytes)",
        candidate.path.display(),
        candidate.kind.mime(),
        before
    );
    let compressed = compressor.compress(original, &job.transform).await?;
    let after = compressed.len() as u64;

    let destination = job.target.destination(candidate, job.extension());

    if destination == candidate.path && job.transform.is_empty() && after >= before {
        debug!(
            "Compressed {} is not smaller, keeping the original",
            candidate.path.display()
        );
        summary.record_unchanged(&candidate.path, before, after);
        return Ok(());
    }

    write_atomic(&destination, &compressed).await?;
    summary.record_written(&candidate.path, &destination, before, after);
    info!(
        "    compression #{} this month",
        format_count(compressor.compression_count())
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web_api::ApiError;
    use std::path::{Path, PathBuf};

    /// Returns a fixed payload, or fails, without touching the network.
    struct FakeCompressor {
        response: Result<Vec<u8>, fn() -> ApiError>,
        calls: u32,
    }

    impl FakeCompressor {
        fn returning(bytes: &[u8]) -> Self {
            Self {
                response: Ok(bytes.to_vec()),
                calls: 0,
            }
        }

        fn failing(err: fn() -> ApiError) -> Self {
            Self {
                response: Err(err),
                calls: 0,
            }
        }
    }

    impl RemoteCompressor for FakeCompressor {
        async fn compress(
            &mut self,
            _data: Vec<u8>,
            _transform: &Transform,
        ) -> Result<Vec<u8>, ApiError> {
            self.calls += 1;
            match &self.response {
                Ok(bytes) => Ok(bytes.clone()),
                Err(make) => Err(make()),
            }
        }

        fn compression_count(&self) -> Option<u32> {
            Some(self.calls)
        }
    }

    fn candidate(dir: &Path, name: &str, contents: &[u8]) -> Candidate {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        Candidate {
            relative: PathBuf::from(name),
            kind: ImageKind::from_path(&path).unwrap(),
            path,
        }
    }

    fn job(target: OutputTarget, convert: Option<&str>) -> Job {
        Job {
            target,
            transform: Transform {
                resize: None,
                convert: convert.map(|mime| Convert {
                    mime: mime.to_string(),
                }),
            },
        }
    }

    #[tokio::test]
    async fn test_smaller_result_overwrites_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let c = candidate(dir.path(), "a.png", &[0u8; 100]);
        let mut fake = FakeCompressor::returning(&[1u8; 40]);
        let mut summary = Summary::new(1, 0);

        process(&mut fake, &c, &job(OutputTarget::InPlace, None), &mut summary).await;

        assert_eq!(std::fs::read(&c.path).unwrap(), vec![1u8; 40]);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.unchanged, 0);
    }

    #[tokio::test]
    async fn test_larger_result_never_overwrites_original() {
        let dir = tempfile::tempdir().unwrap();
        let c = candidate(dir.path(), "a.jpg", &[0u8; 100]);
        let mut fake = FakeCompressor::returning(&[1u8; 150]);
        let mut summary = Summary::new(1, 0);

        process(&mut fake, &c, &job(OutputTarget::InPlace, None), &mut summary).await;

        assert_eq!(std::fs::read(&c.path).unwrap(), vec![0u8; 100]);
        assert_eq!(summary.unchanged, 1);
        assert_eq!(summary.succeeded, 1);
    }

    #[tokio::test]
    async fn test_convert_writes_new_extension_next_to_source() {
        let dir = tempfile::tempdir().unwrap();
        let c = candidate(dir.path(), "a.png", &[0u8; 100]);
        let mut fake = FakeCompressor::returning(&[2u8; 120]);
        let mut summary = Summary::new(1, 0);

        process(
            &mut fake,
            &c,
            &job(OutputTarget::InPlace, Some("image/webp")),
            &mut summary,
        )
        .await;

        assert_eq!(std::fs::read(dir.path().join("a.webp")).unwrap(), vec![2u8; 120]);
        assert_eq!(std::fs::read(&c.path).unwrap(), vec![0u8; 100]);
    }

    #[tokio::test]
    async fn test_output_dir_always_receives_result() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let c = candidate(dir.path(), "a.avif", &[0u8; 10]);
        let mut fake = FakeCompressor::returning(&[3u8; 20]);
        let mut summary = Summary::new(1, 0);

        process(&mut fake, &c, &job(OutputTarget::Dir(out.clone()), None), &mut summary).await;

        assert_eq!(std::fs::read(out.join("a.avif")).unwrap(), vec![3u8; 20]);
        assert_eq!(summary.unchanged, 0);
    }

    #[tokio::test]
    async fn test_api_failure_leaves_original_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let c = candidate(dir.path(), "a.png", &[9u8; 50]);
        let mut fake =
            FakeCompressor::failing(|| ApiError::Server("unavailable (HTTP 503/Error)".to_string()));
        let mut summary = Summary::new(1, 0);

        process(&mut fake, &c, &job(OutputTarget::InPlace, None), &mut summary).await;

        assert_eq!(std::fs::read(&c.path).unwrap(), vec![9u8; 50]);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.succeeded, 0);
    }

    #[test]
    fn test_unknown_mime_keeps_extension() {
        let job = job(OutputTarget::InPlace, Some("*/*"));
        assert_eq!(job.extension(), None);
    }

    #[test]
    fn test_key_precedence() {
        let mut config = Config::default();
        config.tinify.key = Some("from-config".to_string());

        let key = resolve_api_key(Some("from-flag".to_string()), &config).unwrap();
        assert_eq!(key, "from-flag");

        // A blank flag falls through to the environment, then the config
        let blank = resolve_api_key(Some("  ".to_string()), &config).unwrap();
        match std::env::var(API_KEY_ENV) {
            Ok(env_key) if !env_key.trim().is_empty() => assert_eq!(blank, env_key),
            _ => assert_eq!(blank, "from-config"),
        }
    }
}
