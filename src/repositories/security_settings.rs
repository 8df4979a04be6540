use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{SecuritySettings, SharedSecret};

/// 二要素認証レコードのストア
#[async_trait]
pub trait SecuritySettingsStore: Send + Sync {
    /// ユーザーIDでセキュリティ設定を検索
    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Option<SecuritySettings>, AppError>;

    /// 新しいシークレットを保存（upsert）
    ///
    /// # Note
    /// 既存のシークレットは有効化済みでも上書きされ、enabled = false に戻る
    async fn save_pending_secret(
        &self,
        user_id: Uuid,
        secret: &SharedSecret,
    ) -> Result<(), AppError>;

    /// 検証に使ったシークレットがまだ保存されている場合だけ2FAを有効化
    ///
    /// 読み込み後に別の setup でシークレットが差し替わっていれば何もせず `false`
    async fn enable(
        &self,
        user_id: Uuid,
        secret: &SharedSecret,
        method: &str,
    ) -> Result<bool, AppError>;

    /// シークレット・有効フラグ・方式をクリア（行は残す）
    async fn clear(&self, user_id: Uuid) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct SecuritySettingsRepository {
    pool: PgPool,
}

impl SecuritySettingsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SecuritySettingsStore for SecuritySettingsRepository {
    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Option<SecuritySettings>, AppError> {
        let settings = sqlx::query_as::<_, SecuritySettings>(
            r#"
            SELECT user_id, two_factor_secret, two_factor_enabled, two_factor_method
            FROM user_security_settings
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(settings)
    }

    async fn save_pending_secret(
        &self,
        user_id: Uuid,
        secret: &SharedSecret,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO user_security_settings (user_id, two_factor_secret, two_factor_enabled)
            VALUES ($1, $2, false)
            ON CONFLICT (user_id) DO UPDATE
            SET two_factor_secret = EXCLUDED.two_factor_secret,
                two_factor_enabled = false,
                updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(secret)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn enable(
        &self,
        user_id: Uuid,
        secret: &SharedSecret,
        method: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE user_security_settings
            SET two_factor_enabled = true, two_factor_method = $2, updated_at = NOW()
            WHERE user_id = $1 AND two_factor_secret = $3
            "#,
        )
        .bind(user_id)
        .bind(method)
        .bind(secret)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn clear(&self, user_id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE user_security_settings
            SET two_factor_secret = NULL,
                two_factor_enabled = false,
                two_factor_method = NULL,
                updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
