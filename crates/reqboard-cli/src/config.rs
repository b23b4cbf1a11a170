// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use reqboard_app::{DEFAULT_ID_FIELD, StatusFilter};
use reqboard_relay::{DEFAULT_LISTEN, ForwardMode, MethodPolicy, RelayPolicy};
use reqboard_tui::DEFAULT_HIGHLIGHT_FIELDS;
use serde::Deserialize;
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const CONFIG_VERSION: i64 = 1;
const CONFIG_PATH_ENV: &str = "REQBOARD_CONFIG_PATH";
const DEFAULT_SOURCE_TIMEOUT: &str = "15s";
const DEFAULT_RELAY_TIMEOUT: &str = "5s";
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub source: Source,
    #[serde(default)]
    pub cache: Cache,
    #[serde(default)]
    pub ui: Ui,
    #[serde(default)]
    pub relay: Relay,
    #[serde(default)]
    pub log: Log,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            source: Source::default(),
            cache: Cache::default(),
            ui: Ui::default(),
            relay: Relay::default(),
            log: Log::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Source {
    pub url: Option<String>,
    pub timeout: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Cache {
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Ui {
    /// Empty string disables identity keys; expansion then follows position.
    pub id_field: Option<String>,
    pub default_filter: Option<String>,
    pub highlight_fields: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Relay {
    pub listen: Option<String>,
    pub downstream_url: Option<String>,
    pub mode: Option<ForwardMode>,
    pub other_methods: Option<MethodPolicy>,
    pub timeout: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Log {
    pub level: Option<String>,
    pub file: Option<String>,
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!("cannot resolve config directory; set {CONFIG_PATH_ENV} to the config file")
        })?;

        let app_dir = config_root.join(reqboard_cache::APP_NAME);
        fs::create_dir_all(&app_dir)
            .with_context(|| format!("create config directory {}", app_dir.display()))?;
        Ok(app_dir.join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let value: toml::Value = toml::from_str(&raw)
            .with_context(|| format!("parse TOML config {}", path.display()))?;

        let version = value
            .get("version")
            .and_then(toml::Value::as_integer)
            .ok_or_else(|| {
                anyhow!(
                    "config file {} has no version. Add `version = 1` at the top and keep values under [source], [cache], [ui], [relay], and [log]",
                    path.display()
                )
            })?;

        if version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} in {}; expected version = 1",
                version,
                path.display()
            );
        }

        let config: Config = value
            .try_into()
            .with_context(|| format!("decode config {}", path.display()))?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if let Some(url) = &self.source.url {
            reqboard_source::parse_endpoint(url, "source.url")
                .with_context(|| format!("invalid [source] in {}", path.display()))?;
        }
        positive_duration(self.source.timeout.as_deref(), "source.timeout", path)?;

        if let Some(cache_path) = &self.cache.path
            && cache_path.trim().is_empty()
        {
            bail!(
                "cache.path in {} is empty; remove the key to use the default location",
                path.display()
            );
        }

        if let Some(filter) = &self.ui.default_filter
            && StatusFilter::parse(filter).is_none()
        {
            bail!(
                "ui.default_filter in {} is {:?}; use one of: all, new, pending, closed, other",
                path.display(),
                filter
            );
        }

        if let Some(listen) = &self.relay.listen
            && listen.parse::<SocketAddr>().is_err()
        {
            bail!(
                "relay.listen in {} is {:?}; use host:port such as {}",
                path.display(),
                listen,
                DEFAULT_LISTEN
            );
        }
        if let Some(url) = &self.relay.downstream_url {
            reqboard_source::parse_endpoint(url, "relay.downstream_url")
                .with_context(|| format!("invalid [relay] in {}", path.display()))?;
        }
        positive_duration(self.relay.timeout.as_deref(), "relay.timeout", path)?;

        if let Some(level) = &self.log.level
            && EnvFilter::try_new(level).is_err()
        {
            bail!(
                "log.level in {} is {:?}; use a level such as info or debug, or a filter like reqboard_tui=debug",
                path.display(),
                level
            );
        }

        Ok(())
    }

    pub fn source_url(&self) -> Result<&str> {
        self.source.url.as_deref().ok_or_else(|| {
            anyhow!("source.url is not set; add it under [source] or run with --demo")
        })
    }

    pub fn source_timeout(&self) -> Result<Duration> {
        parse_duration(
            self.source
                .timeout
                .as_deref()
                .unwrap_or(DEFAULT_SOURCE_TIMEOUT),
        )
    }

    pub fn cache_path(&self) -> Result<PathBuf> {
        match &self.cache.path {
            Some(path) => Ok(PathBuf::from(path)),
            None => reqboard_cache::default_cache_path(),
        }
    }

    pub fn id_field(&self) -> Option<&str> {
        match &self.ui.id_field {
            Some(field) if field.trim().is_empty() => None,
            Some(field) => Some(field.as_str()),
            None => Some(DEFAULT_ID_FIELD),
        }
    }

    pub fn default_filter(&self) -> StatusFilter {
        self.ui
            .default_filter
            .as_deref()
            .and_then(StatusFilter::parse)
            .unwrap_or_default()
    }

    pub fn highlight_fields(&self) -> Vec<String> {
        match &self.ui.highlight_fields {
            Some(fields) => fields.clone(),
            None => DEFAULT_HIGHLIGHT_FIELDS
                .iter()
                .map(|field| (*field).to_owned())
                .collect(),
        }
    }

    pub fn relay_listen(&self) -> &str {
        self.relay.listen.as_deref().unwrap_or(DEFAULT_LISTEN)
    }

    pub fn relay_downstream_url(&self) -> Result<&str> {
        self.relay.downstream_url.as_deref().ok_or_else(|| {
            anyhow!("relay.downstream_url is not set; add it under [relay] before using --relay")
        })
    }

    pub fn relay_policy(&self) -> RelayPolicy {
        RelayPolicy {
            mode: self.relay.mode.unwrap_or_default(),
            other_methods: self.relay.other_methods.unwrap_or_default(),
        }
    }

    pub fn relay_timeout(&self) -> Result<Duration> {
        parse_duration(self.relay.timeout.as_deref().unwrap_or(DEFAULT_RELAY_TIMEOUT))
    }

    pub fn log_level(&self) -> &str {
        self.log.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    pub fn log_path(&self) -> Result<PathBuf> {
        match &self.log.file {
            Some(path) => Ok(PathBuf::from(path)),
            None => reqboard_cache::default_log_path(),
        }
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            "# reqboard config\n# Place this file at: {}\n\nversion = 1\n\n[source]\n# Endpoint that answers GET with a JSON array of request rows\nurl = \"https://script.example.com/macros/s/DEPLOYMENT/exec\"\ntimeout = \"{}\"\n\n[cache]\n# Optional. Default is the platform cache dir (for example ~/.cache/reqboard/{})\n# path = \"/absolute/path/to/{}\"\n\n[ui]\nid_field = \"{}\"\ndefault_filter = \"all\"\nhighlight_fields = [\"{}\", \"{}\"]\n\n[relay]\nlisten = \"{}\"\n# downstream_url = \"https://script.example.com/macros/s/DEPLOYMENT/exec\"\nmode = \"await\"\nother_methods = \"acknowledge\"\ntimeout = \"{}\"\n\n[log]\nlevel = \"{}\"\n# file = \"/absolute/path/to/{}\"\n",
            path.display(),
            DEFAULT_SOURCE_TIMEOUT,
            reqboard_cache::CACHE_FILE_NAME,
            reqboard_cache::CACHE_FILE_NAME,
            DEFAULT_ID_FIELD,
            DEFAULT_HIGHLIGHT_FIELDS[0],
            DEFAULT_HIGHLIGHT_FIELDS[1],
            DEFAULT_LISTEN,
            DEFAULT_RELAY_TIMEOUT,
            DEFAULT_LOG_LEVEL,
            reqboard_cache::LOG_FILE_NAME,
        )
    }
}

fn positive_duration(raw: Option<&str>, key: &str, path: &Path) -> Result<()> {
    let Some(raw) = raw else {
        return Ok(());
    };
    let parsed = parse_duration(raw).with_context(|| format!("{key} in {}", path.display()))?;
    if parsed <= Duration::ZERO {
        bail!("{key} in {} must be positive, got {raw}", path.display());
    }
    Ok(())
}

fn parse_duration(raw: &str) -> Result<Duration> {
    if let Some(value) = raw.strip_suffix("ms") {
        let millis: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_millis(millis));
    }
    if let Some(value) = raw.strip_suffix('s') {
        let secs: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_secs(secs));
    }
    if let Some(value) = raw.strip_suffix('m') {
        let mins: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_secs(mins * 60));
    }

    bail!("invalid duration {raw:?}; use one of: <N>ms, <N>s, <N>m (for example 500ms or 5s)")
}
