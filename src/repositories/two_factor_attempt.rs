use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::AttemptState;
use crate::models::attempt_state::AttemptRow;
use crate::services::attempt_tracker::{AttemptStatus, AttemptStore, LockoutPolicy};

/// Postgres に保存する失敗試行ストア
///
/// 全インスタンスで共有されるため、インスタンスをまたいだ総当たりも上限で止まる
#[derive(Clone)]
pub struct TwoFactorAttemptRepository {
    pool: PgPool,
    policy: LockoutPolicy,
}

impl TwoFactorAttemptRepository {
    pub fn new(pool: PgPool, policy: LockoutPolicy) -> Self {
        Self { pool, policy }
    }

    fn max_attempts(&self) -> i32 {
        i32::try_from(self.policy.max_attempts).unwrap_or(i32::MAX)
    }
}

#[async_trait]
impl AttemptStore for TwoFactorAttemptRepository {
    fn policy(&self) -> &LockoutPolicy {
        &self.policy
    }

    async fn check_allowed(
        &self,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<AttemptStatus, AppError> {
        sqlx::query(
            r#"
            DELETE FROM two_factor_attempts
            WHERE user_id = $1 AND last_attempt <= $2
            "#,
        )
        .bind(user_id)
        .bind(self.policy.expiry_cutoff(now))
        .execute(&self.pool)
        .await?;

        let row = sqlx::query_as::<_, AttemptRow>(
            r#"
            SELECT failed_count, last_attempt
            FROM two_factor_attempts
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let state = row.map(AttemptState::from);
        Ok(self.policy.evaluate(state.as_ref(), now))
    }

    async fn record_failure(
        &self,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<AttemptState, AppError> {
        // 単一文の upsert で加算する（同一ユーザーの同時リクエストでも取りこぼさない）
        let row = sqlx::query_as::<_, AttemptRow>(
            r#"
            INSERT INTO two_factor_attempts (user_id, failed_count, last_attempt)
            VALUES ($1, 1, $2)
            ON CONFLICT (user_id) DO UPDATE
            SET failed_count = CASE
                    WHEN two_factor_attempts.last_attempt <= $3 THEN 1
                    ELSE two_factor_attempts.failed_count + 1
                END,
                last_attempt = EXCLUDED.last_attempt
            RETURNING failed_count, last_attempt
            "#,
        )
        .bind(user_id)
        .bind(now)
        .bind(self.policy.expiry_cutoff(now))
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn try_consume(
        &self,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<AttemptStatus, AppError> {
        // LockoutPolicy::consume と同じ判定を1文で行う。
        // ロック中は WHERE で更新を拒否し、行が返らない
        let row = sqlx::query_as::<_, AttemptRow>(
            r#"
            INSERT INTO two_factor_attempts (user_id, failed_count, last_attempt)
            VALUES ($1, 1, $2)
            ON CONFLICT (user_id) DO UPDATE
            SET failed_count = CASE
                    WHEN two_factor_attempts.last_attempt <= $3 THEN 1
                    ELSE two_factor_attempts.failed_count + 1
                END,
                last_attempt = EXCLUDED.last_attempt
            WHERE two_factor_attempts.last_attempt <= $3
               OR two_factor_attempts.failed_count < $4
            RETURNING failed_count, last_attempt
            "#,
        )
        .bind(user_id)
        .bind(now)
        .bind(self.policy.expiry_cutoff(now))
        .bind(self.max_attempts())
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row.map(AttemptState::from) {
            Some(state) => AttemptStatus::Allowed {
                remaining: self.policy.max_attempts.saturating_sub(state.failed_count),
            },
            None => AttemptStatus::LockedOut,
        })
    }

    async fn record_success(&self, user_id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            r#"
            DELETE FROM two_factor_attempts
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
