use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Commands};
use config::Config;
use dotenvy::dotenv;
use indicatif::MultiProgress;
use local::local;
use log::LevelFilter;
use miette::{IntoDiagnostic, WrapErr};
use schemars::generate::SchemaSettings;
use std::path::Path;
use tinify::tinify;

mod cli;
mod config;
mod format;
mod local;
mod output;
mod progress_bar;
mod report;
mod scan;
mod tinify;
mod util;
mod web_api;

#[tokio::main]
async fn main() -> miette::Result<()> {
    let _ = dotenv();

    let args = Cli::parse();

    let mut binding = env_logger::Builder::new();
    let logger = binding
        .filter_level(LevelFilter::Info)
        .filter_module("imgpress", args.verbose.log_level_filter())
        .filter_module("reqwest", LevelFilter::Warn)
        .format_timestamp(None)
        .format_module_path(false)
        .build();

    let level = logger.filter();

    let multi_progress = MultiProgress::new();
    indicatif_log_bridge::LogWrapper::new(multi_progress.clone(), logger)
        .try_init()
        .into_diagnostic()
        .wrap_err("Failed to initialize logging")?;

    log::set_max_level(level);

    let config_path = args.config.as_deref();

    match args.command {
        Commands::Local(local_args) => {
            let config = read_config(config_path).await?;
            local(multi_progress, local_args, config)
                .await
                .map(|_| ())
                .map_err(|e| miette::miette!("{e:#}"))
        }
        Commands::Tinify(tinify_args) => {
            let config = read_config(config_path).await?;
            tinify(multi_progress, tinify_args, config)
                .await
                .map(|_| ())
                .map_err(|e| miette::miette!("{e:#}"))
        }
        Commands::Check => check_config(config_path)
            .await
            .map_err(|e| miette::miette!("{e:#}")),
        Commands::GenerateSchema(args) => {
            generate_schema(args).await.map_err(|e| miette::miette!("{e:#}"))
        }
        Commands::Completions(args) => {
            generate_completions(args);
            Ok(())
        }
    }
}

async fn read_config(path: Option<&Path>) -> miette::Result<Config> {
    Config::read(path)
        .await
        .map_err(|e| miette::miette!("{e:#}"))
        .wrap_err("Failed to read configuration file")
}

async fn generate_schema(args: cli::GenerateSchemaArgs) -> anyhow::Result<()> {
    use anyhow::Context;
    use fs_err::tokio as fs;

    // Generate the JSON schema for the Config struct using Draft-07 format
    let settings = SchemaSettings::draft07();
    let generator = settings.into_generator();
    let schema = generator.into_root_schema_for::<Config>();
    let schema_json =
        serde_json::to_string_pretty(&schema).context("Failed to serialize JSON schema")?;

    let output_path = Path::new(&args.output);
    if let Some(parent_dir) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent_dir)
            .await
            .with_context(|| format!("Failed to create directory: {}", parent_dir.display()))?;
    }

    fs::write(output_path, schema_json)
        .await
        .with_context(|| format!("Failed to write schema to: {}", output_path.display()))?;

    println!("Generated JSON schema at: {}", args.output);
    Ok(())
}

fn generate_completions(args: cli::CompletionsArgs) {
    let mut cmd = Cli::command();
    generate(args.shell, &mut cmd, "imgpress", &mut std::io::stdout());
}

async fn check_config(path: Option<&Path>) -> anyhow::Result<()> {
    use anyhow::Context;

    let config = Config::read(path)
        .await
        .context("Failed to read configuration file")?;

    println!("✓ Configuration is valid");
    println!(
        "  Scan: recursive = {}, time_field = {}",
        config.scan.recursive,
        config.scan.time_field.as_str()
    );
    for pattern in &config.scan.exclude {
        println!("    - exclude {pattern}");
    }
    println!(
        "  Local: quality = {}, png_level = {}",
        config.local.quality, config.local.png_level
    );
    println!(
        "  Tinify: endpoint = {}, key = {}",
        config.tinify.endpoint,
        if config.tinify.key.is_some() {
            "set"
        } else {
            "not set"
        }
    );

    Ok(())
}
