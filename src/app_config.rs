//! Config file loading for run defaults.
//!
//! The file is a flat list of `key = value` lines. Strings are double-quoted,
//! `#` starts a comment outside strings, and unknown keys are rejected.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use annex_sync_core::ArchiveFormat;
use anyhow::{Context, Result, bail};

/// File-backed defaults. Every field is optional.
#[derive(Debug, Clone, Default)]
pub struct FileConfig {
    /// Page that lists the annex links.
    pub base_url: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Delay after the page fetch and between sequential downloads, in ms.
    pub delay_ms: Option<u64>,
    /// Worker pool size.
    pub max_parallel: Option<u8>,
    /// Attempts per file.
    pub max_attempts: Option<u32>,
    /// Delay between attempts, in ms.
    pub retry_delay_ms: Option<u64>,
    /// Re-download existing files.
    pub overwrite_files: Option<bool>,
    /// Empty the files folder first.
    pub clear_downloads: Option<bool>,
    /// Parallel (true) or sequential (false) downloads.
    pub parallel: Option<bool>,
    /// Root folder for downloads and the archive.
    pub downloads_dir: Option<PathBuf>,
    /// Subfolder receiving the files.
    pub files_subdir: Option<PathBuf>,
    /// Archive format.
    pub archive_format: Option<ArchiveFormat>,
    /// Archive name without extension.
    pub archive_name: Option<String>,
    /// Replace an existing archive.
    pub overwrite_archive: Option<bool>,
}

impl FileConfig {
    /// Validates config values against the CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(max_parallel) = self.max_parallel
            && !(1..=100).contains(&max_parallel)
        {
            bail!("Invalid config value for `max_parallel`: {max_parallel}. Expected range: 1..=100");
        }
        if let Some(max_attempts) = self.max_attempts
            && !(1..=20).contains(&max_attempts)
        {
            bail!("Invalid config value for `max_attempts`: {max_attempts}. Expected range: 1..=20");
        }
        if let Some(timeout) = self.timeout_secs
            && !(1..=3600).contains(&timeout)
        {
            bail!("Invalid config value for `timeout_secs`: {timeout}. Expected range: 1..=3600");
        }
        validate_delay_ms("delay_ms", self.delay_ms)?;
        validate_delay_ms("retry_delay_ms", self.retry_delay_ms)?;
        Ok(())
    }
}

fn validate_delay_ms(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if value > 600_000 {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 0..=600000");
    }
    Ok(())
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Path that was looked at, if any.
    pub path: Option<PathBuf>,
    /// Parsed config when a file was found.
    pub config: Option<FileConfig>,
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/annex-sync/config.toml`
/// 2. `$HOME/.config/annex-sync/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("annex-sync")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("annex-sync")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the explicit config file, or the default one if it exists.
///
/// An explicit path that does not exist is an error; a missing default file
/// is not.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        let config = load_file_config(path)?;
        return Ok(LoadedConfig {
            path: Some(path.to_path_buf()),
            config: Some(config),
        });
    }

    let path = resolve_default_config_path();
    let Some(path_ref) = path.as_deref() else {
        return Ok(LoadedConfig { path, config: None });
    };
    if !path_ref.exists() {
        return Ok(LoadedConfig { path, config: None });
    }

    let config = load_file_config(path_ref)?;
    Ok(LoadedConfig {
        path,
        config: Some(config),
    })
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!(
                "Invalid config syntax on line {}: expected key = value",
                line_index + 1
            );
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let line_no = line_index + 1;
        let invalid = || format!("Invalid `{key}` value on line {line_no}");

        match key {
            "base_url" => cfg.base_url = Some(parse_string_literal(value).with_context(invalid)?),
            "timeout_secs" => cfg.timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?),
            "delay_ms" => cfg.delay_ms = Some(parse_integer_u64(value).with_context(invalid)?),
            "max_parallel" => {
                let parsed = parse_integer_u64(value).with_context(invalid)?;
                let n = u8::try_from(parsed)
                    .map_err(|_| anyhow::anyhow!("Integer value out of range for u8"))
                    .with_context(invalid)?;
                cfg.max_parallel = Some(n);
            }
            "max_attempts" => {
                let parsed = parse_integer_u64(value).with_context(invalid)?;
                let n = u32::try_from(parsed)
                    .map_err(|_| anyhow::anyhow!("Integer value out of range for u32"))
                    .with_context(invalid)?;
                cfg.max_attempts = Some(n);
            }
            "retry_delay_ms" => {
                cfg.retry_delay_ms = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "overwrite_files" => cfg.overwrite_files = Some(parse_boolean(value).with_context(invalid)?),
            "clear_downloads" => cfg.clear_downloads = Some(parse_boolean(value).with_context(invalid)?),
            "parallel" => cfg.parallel = Some(parse_boolean(value).with_context(invalid)?),
            "downloads_dir" => {
                let parsed = parse_string_literal(value).with_context(invalid)?;
                cfg.downloads_dir = Some(PathBuf::from(parsed));
            }
            "files_subdir" => {
                let parsed = parse_string_literal(value).with_context(invalid)?;
                cfg.files_subdir = Some(PathBuf::from(parsed));
            }
            "archive_format" => {
                let parsed = parse_string_literal(value).with_context(invalid)?;
                let format = parsed.parse::<ArchiveFormat>().with_context(invalid)?;
                cfg.archive_format = Some(format);
            }
            "archive_name" => {
                cfg.archive_name = Some(parse_string_literal(value).with_context(invalid)?);
            }
            "overwrite_archive" => {
                cfg.overwrite_archive = Some(parse_boolean(value).with_context(invalid)?);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_no}");
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_boolean(raw_value: &str) -> Result<bool> {
    match raw_value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("Expected 'true' or 'false'"),
    }
}
