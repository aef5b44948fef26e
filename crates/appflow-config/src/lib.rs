//! AppFlow 設定ファイルの読み込み
//!
//! 設定ファイルを探索し、YAML から [`Settings`] を読み込む。
//! 環境変数による上書きは各プロバイダ側で行う。

pub mod error;

pub use error::*;

use serde::Deserialize;
use std::path::{Path, PathBuf};

const CONFIG_PATH_ENV: &str = "APPFLOW_CONFIG_PATH";

/// 設定ファイル全体
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Bitrise プロバイダの設定
    pub bitrise: ProviderSettings,
}

/// プロバイダごとの接続設定
///
/// すべて省略可能。環境変数が設定されていればそちらが優先される。
#[derive(Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderSettings {
    /// API トークン
    pub api_token: Option<String>,
    /// API のベース URL
    pub endpoint: Option<String>,
    /// リクエストのタイムアウト (秒)
    pub timeout_secs: Option<u64>,
    /// organization_slug のデフォルト値
    pub organization: Option<String>,
    /// レスポンスの status を厳密に検証するか
    pub strict_status: Option<bool>,
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .field("timeout_secs", &self.timeout_secs)
            .field("organization", &self.organization)
            .field("strict_status", &self.strict_status)
            .finish()
    }
}

/// AppFlow のグローバル設定ディレクトリを取得 (~/.config/appflow)
pub fn get_config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("appflow"))
}

/// 設定ファイルを探す
///
/// 以下の優先順位で検索:
/// 1. 環境変数 APPFLOW_CONFIG_PATH (直接パス指定)
/// 2. カレントディレクトリ: appflow.local.yaml, appflow.yaml
/// 3. ./.appflow/config.yaml
/// 4. ~/.config/appflow/config.yaml (グローバル設定)
pub fn find_settings_file() -> Result<PathBuf> {
    // 1. 環境変数で直接指定
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
        tracing::warn!("{} が存在しないパスを指しています: {}", CONFIG_PATH_ENV, path.display());
    }

    let current_dir = std::env::current_dir()?;

    // 2. カレントディレクトリで検索
    for filename in ["appflow.local.yaml", "appflow.yaml"] {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    // 3. ./.appflow/ ディレクトリ
    let project_config = current_dir.join(".appflow").join("config.yaml");
    if project_config.exists() {
        return Ok(project_config);
    }

    // 4. グローバル設定ファイル
    if let Ok(config_dir) = get_config_dir() {
        let global_config = config_dir.join("config.yaml");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::SettingsFileNotFound)
}

/// 指定したファイルから設定を読み込む
pub fn load_settings_from(path: impl AsRef<Path>) -> Result<Settings> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(Settings::default());
    }
    let settings = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

/// 設定ファイルを探して読み込む。見つからなければデフォルト値を返す
pub fn load_settings() -> Result<Settings> {
    match find_settings_file() {
        Ok(path) => load_settings_from(path),
        Err(ConfigError::SettingsFileNotFound) => {
            tracing::debug!("Settings file not found, using defaults");
            Ok(Settings::default())
        }
        Err(e) => Err(e),
    }
}
