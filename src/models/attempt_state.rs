use sqlx::FromRow;
use time::OffsetDateTime;

/// 2FA コード検証の失敗試行状態（ユーザー単位）
///
/// 初回失敗時に作成され、成功時またはロックアウト期間経過後に削除される
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptState {
    pub failed_count: u32,
    pub last_attempt: OffsetDateTime,
}

/// `two_factor_attempts` テーブルの行
#[derive(Debug, FromRow)]
pub struct AttemptRow {
    pub failed_count: i32,
    pub last_attempt: OffsetDateTime,
}

impl From<AttemptRow> for AttemptState {
    fn from(row: AttemptRow) -> Self {
        Self {
            failed_count: u32::try_from(row.failed_count).unwrap_or_default(),
            last_attempt: row.last_attempt,
        }
    }
}
