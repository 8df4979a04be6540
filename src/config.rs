use secrecy::SecretBox;
use serde::Deserialize;
use time::Duration;

use crate::services::{LockoutPolicy, TotpVerifier};

/// 失敗試行ストアのバックエンド
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStoreKind {
    /// 全インスタンスで共有（Postgres）
    Postgres,
    /// プロセス内メモリ（単一インスタンス・開発用）
    Memory,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub database_url: SecretBox<String>,
    /// Bearer トークンのイントロスペクトに使う Hydra Admin API
    pub hydra_admin_url: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    /// CORS 許可オリジン（未設定なら全許可）
    #[serde(default)]
    pub cors_allow_origin: Option<String>,

    // 2FA (TOTP) 設定
    /// TOTP発行者名（認証アプリに表示される）
    pub totp_issuer: String,
    #[serde(default = "default_totp_step_secs")]
    pub totp_step_secs: u32,
    #[serde(default = "default_totp_window_steps")]
    pub totp_window_steps: i32,

    // ロックアウト設定
    #[serde(default = "default_two_factor_max_attempts")]
    pub two_factor_max_attempts: u32,
    #[serde(default = "default_two_factor_lockout_secs")]
    pub two_factor_lockout_secs: i64,
    #[serde(default = "default_attempt_store")]
    pub attempt_store: AttemptStoreKind,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("環境変数の読み込みに失敗: {0}")]
    Env(#[from] envy::Error),

    #[error("設定値が不正: {0}")]
    Invalid(&'static str),
}

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_TOTP_STEP_SECS: u32 = 30;
const DEFAULT_TOTP_WINDOW_STEPS: i32 = 1;
const DEFAULT_TWO_FACTOR_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_TWO_FACTOR_LOCKOUT_SECS: i64 = 15 * 60;

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_totp_step_secs() -> u32 {
    DEFAULT_TOTP_STEP_SECS
}

fn default_totp_window_steps() -> i32 {
    DEFAULT_TOTP_WINDOW_STEPS
}

fn default_two_factor_max_attempts() -> u32 {
    DEFAULT_TWO_FACTOR_MAX_ATTEMPTS
}

fn default_two_factor_lockout_secs() -> i64 {
    DEFAULT_TWO_FACTOR_LOCKOUT_SECS
}

fn default_attempt_store() -> AttemptStoreKind {
    AttemptStoreKind::Postgres
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let config: Self = envy::from_env()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.totp_issuer.trim().is_empty() {
            return Err(ConfigError::Invalid("TOTP_ISSUER must not be empty"));
        }
        if self.totp_step_secs == 0 {
            return Err(ConfigError::Invalid("TOTP_STEP_SECS must be positive"));
        }
        if self.totp_window_steps < 0 {
            return Err(ConfigError::Invalid("TOTP_WINDOW_STEPS must not be negative"));
        }
        if self.two_factor_max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "TWO_FACTOR_MAX_ATTEMPTS must be positive",
            ));
        }
        if self.two_factor_lockout_secs <= 0 {
            return Err(ConfigError::Invalid(
                "TWO_FACTOR_LOCKOUT_SECS must be positive",
            ));
        }
        Ok(())
    }

    pub fn lockout_policy(&self) -> LockoutPolicy {
        LockoutPolicy::new(
            self.two_factor_max_attempts,
            Duration::seconds(self.two_factor_lockout_secs),
        )
    }

    pub fn totp_verifier(&self) -> TotpVerifier {
        TotpVerifier::new(self.totp_step_secs, self.totp_window_steps)
    }
}
