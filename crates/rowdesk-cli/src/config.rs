// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use rowdesk_app::{ColumnName, TableName};
use rowdesk_web::{GridStyle, MAX_SESSIONS, SESSION_IDLE_TIMEOUT};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_VERSION: i64 = 1;
const DEFAULT_BIND: &str = "127.0.0.1:8050";
const DEFAULT_TITLE: &str = "rowdesk";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub storage: Storage,
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub ui: Ui,
    #[serde(default)]
    pub tabs: Vec<TabConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            storage: Storage::default(),
            server: Server::default(),
            ui: Ui::default(),
            tabs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Storage {
    pub db_path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Server {
    pub bind: Option<String>,
    pub session_idle_minutes: Option<u64>,
    pub max_sessions: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Ui {
    pub title: Option<String>,
    pub cell_width: Option<u32>,
    pub table_height: Option<u32>,
    pub table_width: Option<u32>,
    pub page_size: Option<usize>,
    pub row_selectable: Option<bool>,
}

/// One `[[tabs]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct TabConfig {
    pub table: String,
    pub include_parts: Option<bool>,
    #[serde(default)]
    pub excluded_fields: Vec<String>,
    pub filter_fields: Option<Vec<String>>,
    pub add_rows: Option<usize>,
}

impl TabConfig {
    pub fn table_name(&self) -> Result<TableName> {
        TableName::parse(&self.table).with_context(|| format!("[[tabs]] table {:?}", self.table))
    }

    pub fn include_parts(&self) -> bool {
        self.include_parts.unwrap_or(true)
    }

    pub fn add_rows(&self) -> usize {
        self.add_rows.unwrap_or(1)
    }

    pub fn excluded_fields(&self) -> Result<Vec<ColumnName>> {
        parse_columns(&self.table, "excluded_fields", &self.excluded_fields)
    }

    pub fn filter_fields(&self) -> Result<Option<Vec<ColumnName>>> {
        self.filter_fields
            .as_ref()
            .map(|fields| parse_columns(&self.table, "filter_fields", fields))
            .transpose()
    }
}

fn parse_columns(table: &str, key: &str, names: &[String]) -> Result<Vec<ColumnName>> {
    names
        .iter()
        .map(|name| {
            ColumnName::parse(name).with_context(|| format!("tabs.{key} of {table:?}"))
        })
        .collect()
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os("ROWDESK_CONFIG_PATH") {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!("cannot resolve config directory; set ROWDESK_CONFIG_PATH to the config file")
        })?;
        Ok(config_root.join(rowdesk_db::APP_NAME).join("config.toml"))
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
                    "config file {} is not versioned. Add `version = 1` and put values under [storage], [server], [ui], and [[tabs]]",
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
        if let Some(db_path) = &self.storage.db_path {
            rowdesk_db::validate_db_path(db_path)?;
        }
        self.bind_addr()
            .with_context(|| format!("server.bind in {}", path.display()))?;

        if self.server.session_idle_minutes == Some(0) {
            bail!(
                "server.session_idle_minutes in {} must be positive, got 0",
                path.display()
            );
        }
        if self.server.max_sessions == Some(0) {
            bail!("server.max_sessions in {} must be positive, got 0", path.display());
        }

        if self.ui.page_size == Some(0) {
            bail!("ui.page_size in {} must be positive, got 0", path.display());
        }
        for (key, value) in [
            ("cell_width", self.ui.cell_width),
            ("table_height", self.ui.table_height),
            ("table_width", self.ui.table_width),
        ] {
            if value == Some(0) {
                bail!("ui.{key} in {} must be positive, got 0", path.display());
            }
        }

        let mut seen = BTreeSet::new();
        for tab in &self.tabs {
            let table = tab.table_name()?;
            if !seen.insert(table.clone()) {
                bail!(
                    "table `{table}` is listed twice under [[tabs]] in {}",
                    path.display()
                );
            }
            if tab.add_rows == Some(0) {
                bail!(
                    "tabs.add_rows for `{table}` in {} must be at least 1",
                    path.display()
                );
            }
            tab.excluded_fields()?;
            tab.filter_fields()?;
        }
        Ok(())
    }

    pub fn db_path(&self) -> Result<PathBuf> {
        match &self.storage.db_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => rowdesk_db::default_db_path(),
        }
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        let raw = self.server.bind.as_deref().unwrap_or(DEFAULT_BIND);
        raw.parse()
            .with_context(|| format!("invalid bind address {raw:?}; use host:port, for example {DEFAULT_BIND}"))
    }

    /// Idle timeout and capacity of the browser session table.
    pub fn session_limits(&self) -> (Duration, usize) {
        let idle = self
            .server
            .session_idle_minutes
            .map_or(SESSION_IDLE_TIMEOUT, |minutes| {
                Duration::from_secs(minutes.saturating_mul(60))
            });
        (idle, self.server.max_sessions.unwrap_or(MAX_SESSIONS))
    }

    pub fn title(&self) -> &str {
        self.ui.title.as_deref().unwrap_or(DEFAULT_TITLE)
    }

    /// Grid presets for every tab; per-tab exclusions are applied separately.
    pub fn grid_style(&self) -> GridStyle {
        let defaults = GridStyle::default();
        GridStyle {
            cell_width: self.ui.cell_width.unwrap_or(defaults.cell_width),
            table_height: self.ui.table_height.unwrap_or(defaults.table_height),
            table_width: self.ui.table_width.unwrap_or(defaults.table_width),
            page_size: self.ui.page_size.unwrap_or(defaults.page_size),
            row_selectable: self.ui.row_selectable.unwrap_or(defaults.row_selectable),
            excluded_fields: Vec::new(),
        }
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            "# rowdesk config\n# Place this file at: {}\n\nversion = 1\n\n[storage]\n# Optional. Default is platform data dir (for example ~/.local/share/rowdesk/rowdesk.db)\n# db_path = \"/absolute/path/to/lab.db\"\n\n[server]\nbind = \"{DEFAULT_BIND}\"\n# Browser sessions idle this long are dropped; at most max_sessions are kept.\nsession_idle_minutes = 30\nmax_sessions = 256\n\n[ui]\ntitle = \"{DEFAULT_TITLE}\"\ncell_width = 140\ntable_height = 800\ntable_width = 800\npage_size = 25\nrow_selectable = true\n\n# Without [[tabs]] every table in the database gets a tab.\n[[tabs]]\ntable = \"subject\"\ninclude_parts = true\nexcluded_fields = []\n# filter_fields = [\"lab\", \"species\"]\nadd_rows = 1\n",
            path.display(),
        )
    }
}
