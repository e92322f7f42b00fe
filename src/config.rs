use crate::util::time::TimeField;
use anyhow::Context;
use fs_err::tokio as fs;
use globset::{Glob, GlobSet, GlobSetBuilder};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Deserialize, Serialize, Clone, Default, JsonSchema)]
#[serde(default)]
#[schemars(description = "imgpress configuration file")]
pub struct Config {
    #[schemars(description = "Which files are picked up from the input path")]
    pub scan: ScanConfig,

    #[schemars(description = "Settings for the local re-encoder")]
    pub local: LocalConfig,

    #[schemars(description = "Settings for the Tinify API")]
    pub tinify: TinifyConfig,
}

pub const CONFIG_FILES: &[&str] = &[
    "imgpress.json",
    "imgpress.json5",
    "imgpress.jsonc",
    "imgpress.toml",
];

impl Config {
    /// Loads `explicit` if given, otherwise the first config file found in the
    /// working directory. Without any file the defaults are used.
    pub async fn read(explicit: Option<&Path>) -> anyhow::Result<Config> {
        if let Some(path) = explicit {
            return Self::read_from(path).await;
        }

        for &file_name in CONFIG_FILES {
            if fs::metadata(file_name).await.is_ok() {
                return Self::read_from(Path::new(file_name)).await;
            }
        }

        log::debug!("No configuration file found, using defaults");
        Ok(Config::default())
    }

    pub async fn read_from(path: &Path) -> anyhow::Result<Config> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = Self::parse(path, &content)?;

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    fn parse(path: &Path, content: &str) -> anyhow::Result<Config> {
        let file_name = path.display();

        let config = match path.extension().and_then(|ext| ext.to_str()) {
            // fjson tolerates comments and trailing commas
            Some("json") | Some("jsonc") => {
                let clean_json = fjson::to_json(content)
                    .with_context(|| format!("Failed to parse JSON config file: {file_name}"))?;
                serde_json::from_str::<Config>(&clean_json)
                    .with_context(|| format!("Failed to deserialize JSON config: {file_name}"))?
            }
            Some("json5") => json5::from_str::<Config>(content)
                .with_context(|| format!("Failed to parse JSON5 config file: {file_name}"))?,
            Some("toml") => toml::from_str::<Config>(content)
                .with_context(|| format!("Failed to parse TOML config file: {file_name}"))?,
            _ => anyhow::bail!("Unsupported config file format: {file_name}"),
        };

        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !(1..=100).contains(&self.local.quality) {
            anyhow::bail!(
                "local.quality must be between 1 and 100, got {}",
                self.local.quality
            );
        }

        if self.local.png_level > 6 {
            anyhow::bail!(
                "local.png_level must be between 0 and 6, got {}",
                self.local.png_level
            );
        }

        self.scan.exclude_set()?;

        let endpoint = &self.tinify.endpoint;
        if !(endpoint.starts_with("https://") || endpoint.starts_with("http://")) {
            anyhow::bail!("tinify.endpoint must be an http(s) URL, got '{endpoint}'");
        }

        if self.tinify.timeout_secs == 0 {
            anyhow::bail!("tinify.timeout_secs must be greater than 0");
        }

        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_quality() -> u8 {
    70
}

fn default_png_level() -> u8 {
    2
}

fn default_endpoint() -> String {
    "https://api.tinify.com".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Serialize, Clone, JsonSchema)]
#[serde(default)]
#[schemars(description = "File selection settings")]
pub struct ScanConfig {
    #[serde(default = "default_true")]
    #[schemars(description = "Descend into subdirectories (default: true)")]
    pub recursive: bool,
    #[schemars(description = "Timestamp compared against --after (default: mtime)")]
    pub time_field: TimeField,
    #[schemars(
        description = "Glob patterns, relative to the input directory, of files to leave alone"
    )]
    pub exclude: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            recursive: true,
            time_field: TimeField::default(),
            exclude: Vec::new(),
        }
    }
}

impl ScanConfig {
    pub fn exclude_set(&self) -> anyhow::Result<Option<GlobSet>> {
        if self.exclude.is_empty() {
            return Ok(None);
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in &self.exclude {
            let glob = Glob::new(pattern)
                .with_context(|| format!("Invalid glob in scan.exclude: '{pattern}'"))?;
            builder.add(glob);
        }

        Ok(Some(builder.build().context("Failed to build scan.exclude globs")?))
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, JsonSchema)]
#[serde(default)]
#[schemars(description = "Local re-encoding settings")]
pub struct LocalConfig {
    #[serde(default = "default_quality")]
    #[schemars(description = "JPEG quality, 1-100 (default: 70)")]
    pub quality: u8,
    #[serde(default = "default_png_level")]
    #[schemars(description = "oxipng optimization preset for PNG files, 0-6 (default: 2)")]
    pub png_level: u8,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            quality: default_quality(),
            png_level: default_png_level(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, JsonSchema)]
#[serde(default)]
#[schemars(description = "Tinify API settings")]
pub struct TinifyConfig {
    #[schemars(description = "API key; --key and TINIFY_API_KEY take precedence")]
    pub key: Option<String>,
    #[serde(default = "default_endpoint")]
    #[schemars(description = "API base URL (default: https://api.tinify.com)")]
    pub endpoint: String,
    #[serde(default = "default_timeout_secs")]
    #[schemars(description = "Request timeout in seconds (default: 60)")]
    pub timeout_secs: u64,
}

impl Default for TinifyConfig {
    fn default() -> Self {
        Self {
            key: None,
            endpoint: default_endpoint(),
            timeout_secs: default_timeout_secs(),
        }
    }
}
