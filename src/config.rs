use crate::fetch::FetchSettings;
use crate::model::DatasetTask;
use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_true")]
    pub verify_tls: bool,
    #[serde(default = "default_backoff_unit_ms")]
    pub backoff_unit_ms: u64,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default = "default_datasets")]
    pub datasets: Vec<DatasetConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            timeout_secs: default_timeout_secs(),
            retries: default_retries(),
            verify_tls: true,
            backoff_unit_ms: default_backoff_unit_ms(),
            user_agent: None,
            logging: LoggingConfig::default(),
            datasets: default_datasets(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatasetConfig {
    pub key: String,
    /// Prefix for `<PREFIX>_URL` and `<PREFIX>_FILENAME` overrides.
    #[serde(default)]
    pub env_prefix: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    pub filename: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_log_file_name")]
    pub file_name: String,
    #[serde(default = "default_log_max_bytes")]
    pub max_bytes: u64,
    #[serde(default = "default_log_backups")]
    pub backups: usize,
    #[serde(default = "default_true")]
    pub file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            file_name: default_log_file_name(),
            max_bytes: default_log_max_bytes(),
            backups: default_log_backups(),
            file: true,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.retries == 0 {
            bail!("retries must be at least 1");
        }
        if self.timeout_secs == 0 {
            bail!("timeout_secs must be at least 1");
        }

        let mut seen = HashSet::new();
        for dataset in &self.datasets {
            if dataset.key.trim().is_empty() {
                bail!("dataset key must not be empty");
            }
            if !seen.insert(dataset.key.as_str()) {
                bail!("duplicate dataset key {}", dataset.key);
            }
            if dataset.filename.trim().is_empty() {
                bail!("dataset {} has an empty filename", dataset.key);
            }
            if dataset.filename.contains(['/', '\\']) {
                bail!(
                    "dataset {} filename must not contain path separators: {}",
                    dataset.key,
                    dataset.filename
                );
            }
        }

        Ok(())
    }

    /// Apply environment-style overrides. `lookup` returns the value of a variable if set.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(dir) = lookup("DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(timeout) = lookup("TIMEOUT") {
            self.timeout_secs = timeout
                .trim()
                .parse()
                .with_context(|| format!("invalid TIMEOUT value {timeout}"))?;
        }
        if let Some(retries) = lookup("RETRIES") {
            self.retries = retries
                .trim()
                .parse()
                .with_context(|| format!("invalid RETRIES value {retries}"))?;
        }
        if let Some(verify) = lookup("VERIFY_SSL").or_else(|| lookup("VERIFY_TLS")) {
            self.verify_tls = parse_flag(&verify);
        }
        if let Some(dir) = lookup("LOG_DIR") {
            self.logging.dir = PathBuf::from(dir);
        }

        for dataset in &mut self.datasets {
            let Some(prefix) = dataset.env_prefix.as_deref() else {
                continue;
            };
            if let Some(url) = lookup(&format!("{prefix}_URL")) {
                dataset.url = Some(url);
            }
            if let Some(filename) = lookup(&format!("{prefix}_FILENAME")) {
                dataset.filename = filename;
            }
        }

        Ok(())
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            timeout: Duration::from_secs(self.timeout_secs),
            verify_tls: self.verify_tls,
            max_attempts: self.retries,
            backoff_unit: Duration::from_millis(self.backoff_unit_ms),
            user_agent: self.user_agent.clone(),
        }
    }

    pub fn tasks(&self) -> Vec<DatasetTask> {
        self.datasets
            .iter()
            .map(|dataset| DatasetTask {
                key: dataset.key.clone(),
                source_url: dataset
                    .url
                    .as_deref()
                    .map(str::trim)
                    .filter(|url| !url.is_empty())
                    .map(str::to_string),
                output_filename: dataset.filename.clone(),
            })
            .collect()
    }
}

/// Load settings from an optional TOML file, then apply process environment overrides.
pub fn load_settings(config_path: Option<&Path>) -> Result<Settings> {
    let mut settings = match config_path {
        Some(path) => load_settings_file(path)?,
        None => Settings::default(),
    };
    settings.apply_overrides(|key| std::env::var(key).ok())?;
    settings.validate()?;
    Ok(settings)
}

pub fn load_settings_file(config_path: &Path) -> Result<Settings> {
    let text = std::fs::read_to_string(config_path)
        .with_context(|| format!("failed to read config: {}", config_path.display()))?;
    let mut settings: Settings = toml::from_str(&text)
        .with_context(|| format!("failed to parse toml in {}", config_path.display()))?;
    settings.data_dir = resolve_path(config_path, &settings.data_dir)?;
    Ok(settings)
}

pub fn resolve_path(base_config_path: &Path, maybe_relative: &Path) -> Result<PathBuf> {
    if maybe_relative.is_absolute() {
        return Ok(maybe_relative.to_path_buf());
    }

    let parent = base_config_path
        .parent()
        .ok_or_else(|| anyhow!("config has no parent directory: {}", base_config_path.display()))?;

    Ok(parent.join(maybe_relative))
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y"
    )
}

fn default_true() -> bool {
    true
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_retries() -> u32 {
    3
}

fn default_backoff_unit_ms() -> u64 {
    1000
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_file_name() -> String {
    "downloader.log".to_string()
}

fn default_log_max_bytes() -> u64 {
    2_000_000
}

fn default_log_backups() -> usize {
    3
}

fn default_datasets() -> Vec<DatasetConfig> {
    [
        ("transaction_fraud_data", "TX", "transaction_fraud_data.csv"),
        (
            "historical_currency_exchange",
            "FX",
            "historical_currency_exchange.csv",
        ),
        ("readme", "README", "README.txt"),
    ]
    .into_iter()
    .map(|(key, prefix, filename)| DatasetConfig {
        key: key.to_string(),
        env_prefix: Some(prefix.to_string()),
        url: None,
        filename: filename.to_string(),
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_describe_the_three_datasets() {
        let settings = Settings::default();
        settings.validate().unwrap();
        let keys: Vec<_> = settings.datasets.iter().map(|d| d.key.as_str()).collect();
        assert_eq!(
            keys,
            vec!["transaction_fraud_data", "historical_currency_exchange", "readme"]
        );
        assert_eq!(settings.timeout_secs, 60);
        assert_eq!(settings.retries, 3);
        assert!(settings.tasks().iter().all(|t| t.source_url.is_none()));
    }

    #[test]
    fn overrides_fill_urls_and_globals() {
        let vars = env(&[
            ("TX_URL", "https://example.org/tx.csv"),
            ("FX_FILENAME", "fx_rates.csv"),
            ("README_URL", "   "),
            ("RETRIES", "5"),
            ("VERIFY_SSL", "No"),
            ("DATA_DIR", "/tmp/datasets"),
        ]);
        let mut settings = Settings::default();
        settings.apply_overrides(|k| vars.get(k).cloned()).unwrap();

        assert_eq!(settings.retries, 5);
        assert!(!settings.verify_tls);
        assert_eq!(settings.data_dir, PathBuf::from("/tmp/datasets"));

        let tasks = settings.tasks();
        assert_eq!(tasks[0].source_url.as_deref(), Some("https://example.org/tx.csv"));
        assert_eq!(tasks[1].output_filename, "fx_rates.csv");
        assert_eq!(tasks[2].source_url, None);
    }

    #[test]
    fn verify_flag_accepts_truthy_spellings() {
        for value in ["1", "true", "YES", "y"] {
            assert!(parse_flag(value), "{value}");
        }
        for value in ["0", "false", "off", ""] {
            assert!(!parse_flag(value), "{value}");
        }
    }

    #[test]
    fn bad_numbers_are_reported() {
        let vars = env(&[("TIMEOUT", "soon")]);
        let mut settings = Settings::default();
        let err = settings.apply_overrides(|k| vars.get(k).cloned()).unwrap_err();
        assert!(err.to_string().contains("TIMEOUT"));
    }

    #[test]
    fn validation_rejects_zero_retries_and_duplicates() {
        let mut settings = Settings {
            retries: 0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());

        settings.retries = 1;
        let dup = settings.datasets[0].clone();
        settings.datasets.push(dup);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn config_file_resolves_data_dir_next_to_itself() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("datasets.toml");
        std::fs::write(
            &path,
            r#"
data_dir = "out"
retries = 2

[[datasets]]
key = "rates"
url = "https://example.org/rates.xlsx"
filename = "rates.csv"
"#,
        )
        .unwrap();

        let settings = load_settings_file(&path).unwrap();
        assert_eq!(settings.data_dir, dir.path().join("out"));
        assert_eq!(settings.retries, 2);
        assert_eq!(settings.timeout_secs, 60);
        assert_eq!(settings.datasets.len(), 1);
        assert_eq!(settings.logging.file_name, "downloader.log");
    }
}
