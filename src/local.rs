use crate::{
    cli::LocalArgs,
    config::Config,
    format::LOCAL_FORMATS,
    output::OutputTarget,
    progress_bar::ProgressBar,
    report::Summary,
    scan::{Candidate, ScanOptions, scan},
    util::{
        optimize::{LocalOptions, recompress},
        write::write_atomic,
    },
};
use anyhow::Context;
use fs_err::tokio as fs;
use indicatif::MultiProgress;
use log::{debug, info};

pub async fn local(
    multi_progress: MultiProgress,
    args: LocalArgs,
    config: Config,
) -> anyhow::Result<Summary> {
    let options = LocalOptions {
        quality: args.quality.unwrap_or(config.local.quality),
        png_level: args.png_level.unwrap_or(config.local.png_level),
    };

    let scan_options = ScanOptions::from_args(&args.scan, &config.scan)?;
    let scan = scan(&args.scan.input, LOCAL_FORMATS, &scan_options)?;
    let target = OutputTarget::resolve(&args.scan.input, args.scan.output.as_deref());

    info!(
        "Recompressing {} file(s) at quality {} (PNG level {})",
        scan.candidates.len(),
        options.quality,
        options.png_level
    );

    let mut summary = Summary::new(scan.candidates.len(), scan.skipped);
    let pb = ProgressBar::new(multi_progress, "Compressing", scan.candidates.len());

    for candidate in &scan.candidates {
        pb.set_msg(&candidate.relative.to_string_lossy());

        if let Err(err) = process(candidate, &target, options, &mut summary).await {
            summary.record_failure(&candidate.path, &err);
        }

        pb.inc(1);
    }

    pb.finish();
    summary.log();

    Ok(summary)
}

async fn process(
    candidate: &Candidate,
    target: &OutputTarget,
    options: LocalOptions,
    summary: &mut Summary,
) -> anyhow::Result<()> {
    let original = fs::read(&candidate.path)
        .await
        .with_context(|| format!("Failed to read {}", candidate.path.display()))?;

    let kind = candidate.kind;
    let (original, recompressed) = tokio::task::spawn_blocking(move || {
        let recompressed = recompress(&original, kind, options);
        (original, recompressed)
    })
    .await
    .context("Compression task panicked")?;
    let recompressed = recompressed?;

    let destination = target.destination(candidate, None);
    let before = original.len() as u64;
    let after = recompressed.len() as u64;

    if after < before {
        write_atomic(&destination, &recompressed).await?;
        summary.record_written(&candidate.path, &destination, before, after);
        return Ok(());
    }

    debug!(
        "Recompressed {} is not smaller, keeping the original",
        candidate.path.display()
    );
    if destination != candidate.path {
        write_atomic(&destination, &original).await?;
    }
    summary.record_unchanged(&candidate.path, before, after);

    Ok(())
}
