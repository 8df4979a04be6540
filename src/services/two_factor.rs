use std::sync::Arc;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::SharedSecret;
use crate::repositories::SecuritySettingsStore;
use crate::services::attempt_tracker::{AttemptStatus, AttemptStore};
use crate::services::secret;
use crate::services::totp::{self, TotpVerifier};

/// 有効化時に記録する 2FA 方式
pub const METHOD_AUTHENTICATOR: &str = "authenticator";

/// 2FA 設定開始の結果
#[derive(Debug)]
pub struct SetupOutcome {
    pub secret: SharedSecret,
    pub provisioning_uri: String,
}

/// 2FA の現在状態（シークレットは含まない）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwoFactorStatus {
    pub enabled: bool,
    pub method: Option<String>,
}

/// 二要素認証サービス
///
/// 設定開始 → 初回コード確認で有効化 → ログイン時検証 → 無効化、を
/// セキュリティ設定ストアと試行回数トラッカーを介して扱う。
///
/// # Security
/// - シークレットと送信されたコードはログ出力禁止
/// - ロック中はコードの正否に関わらず拒否する
#[derive(Clone)]
pub struct TwoFactorService {
    settings: Arc<dyn SecuritySettingsStore>,
    attempts: Arc<dyn AttemptStore>,
    verifier: TotpVerifier,
    issuer: String,
}

impl TwoFactorService {
    pub fn new(
        settings: Arc<dyn SecuritySettingsStore>,
        attempts: Arc<dyn AttemptStore>,
        verifier: TotpVerifier,
        issuer: String,
    ) -> Self {
        Self {
            settings,
            attempts,
            verifier,
            issuer,
        }
    }

    /// 2FA設定を開始（シークレット生成、プロビジョニング URI 返却）
    ///
    /// 既存のシークレットは有効化済みでも即座に置き換わる
    pub async fn setup(&self, user_id: Uuid, account_label: &str) -> Result<SetupOutcome, AppError> {
        let secret = secret::generate_secret()?;
        self.settings.save_pending_secret(user_id, &secret).await?;

        let provisioning_uri = totp::provisioning_uri(&self.issuer, account_label, &secret);

        tracing::info!(user_id = %user_id, outcome = "setup", "2FA設定開始");

        Ok(SetupOutcome {
            secret,
            provisioning_uri,
        })
    }

    /// 2FA設定確認（コード一致で有効化）
    ///
    /// # Returns
    /// コードが一致すれば `true`。不一致・形式不正は `false`（試行を1回消費）。
    /// 読み込み後に再 setup でシークレットが差し替わった場合も `false`
    pub async fn verify(
        &self,
        user_id: Uuid,
        submitted_code: &str,
        now: OffsetDateTime,
    ) -> Result<bool, AppError> {
        self.ensure_not_locked(user_id, now).await?;

        let secret = self
            .settings
            .find_by_user_id(user_id)
            .await?
            .and_then(|settings| settings.two_factor_secret)
            .ok_or(AppError::TwoFactorNotSetUp)?;

        if !self.check_code(user_id, &secret, submitted_code, now).await? {
            return Ok(false);
        }

        // 照合したシークレットが保存されたままの場合だけ有効化する
        if !self
            .settings
            .enable(user_id, &secret, METHOD_AUTHENTICATOR)
            .await?
        {
            tracing::warn!(
                user_id = %user_id,
                outcome = "secret_replaced",
                "2FA有効化拒否: 検証中にシークレットが再発行された"
            );
            return Ok(false);
        }
        self.attempts.record_success(user_id).await?;

        tracing::info!(user_id = %user_id, outcome = "enabled", "2FA有効化完了");
        Ok(true)
    }

    /// 有効化済み 2FA でコードを検証（ログイン完了などのステップアップ認証用）
    ///
    /// 有効フラグは変更しない。2FA が有効でなければ試行を消費せずに `TwoFactorNotSetUp`
    pub async fn validate(
        &self,
        user_id: Uuid,
        submitted_code: &str,
        now: OffsetDateTime,
    ) -> Result<bool, AppError> {
        self.ensure_not_locked(user_id, now).await?;

        let settings = self
            .settings
            .find_by_user_id(user_id)
            .await?
            .ok_or(AppError::TwoFactorNotSetUp)?;
        let secret = settings
            .enabled_secret()
            .ok_or(AppError::TwoFactorNotSetUp)?;

        let valid = self.check_code(user_id, secret, submitted_code, now).await?;
        if valid {
            self.attempts.record_success(user_id).await?;
            tracing::info!(user_id = %user_id, outcome = "valid", "2FAコード検証成功");
        }
        Ok(valid)
    }

    /// 2FA無効化
    ///
    /// 認証済みの本人であればコード確認なしで無条件にクリアする（冪等）
    pub async fn disable(&self, user_id: Uuid) -> Result<(), AppError> {
        self.settings.clear(user_id).await?;

        tracing::info!(user_id = %user_id, outcome = "disabled", "2FA無効化完了");
        Ok(())
    }

    /// 現在の 2FA 状態
    pub async fn status(&self, user_id: Uuid) -> Result<TwoFactorStatus, AppError> {
        let settings = self.settings.find_by_user_id(user_id).await?;

        Ok(match settings {
            Some(settings) => TwoFactorStatus {
                enabled: settings.enabled_secret().is_some(),
                method: settings.two_factor_method,
            },
            None => TwoFactorStatus {
                enabled: false,
                method: None,
            },
        })
    }

    /// ロック中なら試行を消費せずに拒否（記録の読み込み前の早期判定）
    async fn ensure_not_locked(&self, user_id: Uuid, now: OffsetDateTime) -> Result<(), AppError> {
        match self.attempts.check_allowed(user_id, now).await? {
            AttemptStatus::Allowed { .. } => Ok(()),
            AttemptStatus::LockedOut => Err(self.locked(user_id)),
        }
    }

    fn locked(&self, user_id: Uuid) -> AppError {
        tracing::warn!(user_id = %user_id, outcome = "locked", "2FA検証拒否: ロック中");
        AppError::TwoFactorLocked {
            minutes: self.attempts.policy().lockout_minutes(),
        }
    }

    /// 試行枠を予約してからコードを照合する
    ///
    /// 一致時の `record_success` は呼び出し側が状態更新の後に行う
    async fn check_code(
        &self,
        user_id: Uuid,
        secret: &SharedSecret,
        submitted_code: &str,
        now: OffsetDateTime,
    ) -> Result<bool, AppError> {
        // 予約は照合より前。並行リクエストでも上限を超えて照合されない
        let remaining = match self.attempts.try_consume(user_id, now).await? {
            AttemptStatus::Allowed { remaining } => remaining,
            AttemptStatus::LockedOut => return Err(self.locked(user_id)),
        };

        // 形式不正も不一致と同じく試行を消費する
        if self.verifier.verify(secret, submitted_code, now)? {
            return Ok(true);
        }

        tracing::warn!(
            user_id = %user_id,
            outcome = "invalid",
            remaining,
            "2FAコード不一致"
        );
        Ok(false)
    }
}
