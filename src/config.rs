use std::{env, fs, path::Path, path::PathBuf, str::FromStr, time::Duration};

use anyhow::{anyhow, bail, Context, Result};
use log::LevelFilter;
use serde::Deserialize;

use crate::time_entry::{default_projects, Project, ProjectCatalog};

const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;

/// アプリケーションの設定。
///
/// 設定ファイル、環境変数、コマンドライン引数の順に上書きされる。
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// 計測中のタイマーを更新する間隔(ミリ秒)
    pub tick_interval_ms: u64,
    pub log_level: String,
    pub auth: AuthConfig,
    pub projects: Vec<Project>,
}

/// 認証の設定。`url`が未設定の場合はデモ用のユーザーで認証する。
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct AuthConfig {
    pub url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            log_level: "info".to_string(),
            auth: AuthConfig::default(),
            projects: default_projects(),
        }
    }
}

impl Config {
    /// 設定ファイルと環境変数から設定を読み込む。
    pub fn load() -> Result<Self> {
        let mut config = match Self::path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;

        Ok(config)
    }

    /// 設定ファイルのパスを返す。
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("timeman").join("config.json"))
    }

    /// JSON形式の設定ファイルを読み込む。
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// 環境変数`TIMEMAN_TICK_MS`, `TIMEMAN_LOG_LEVEL`, `TIMEMAN_AUTH_URL`で上書きする。
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(tick) = env::var("TIMEMAN_TICK_MS") {
            self.tick_interval_ms = tick
                .parse()
                .with_context(|| format!("Invalid TIMEMAN_TICK_MS: {}", tick))?;
        }
        if let Ok(level) = env::var("TIMEMAN_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Ok(url) = env::var("TIMEMAN_AUTH_URL") {
            // 空の場合は未設定として扱う
            self.auth.url = Some(url.trim().to_string()).filter(|url| !url.is_empty());
        }

        Ok(())
    }

    /// 設定値を検証する。
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            bail!("tick_interval_ms must be greater than 0");
        }
        if self.projects.is_empty() {
            bail!("At least one project must be configured");
        }
        self.level_filter()?;

        Ok(())
    }

    pub fn level_filter(&self) -> Result<LevelFilter> {
        LevelFilter::from_str(&self.log_level)
            .map_err(|_| anyhow!("Invalid log level: {}", self.log_level))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn catalog(&self) -> ProjectCatalog {
        ProjectCatalog::new(self.projects.clone())
    }
}
