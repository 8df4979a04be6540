//! 2FA コード検証の失敗回数トラッキングとロックアウト
//!
//! 6桁コードの総当たりを防ぐため、ユーザー単位で失敗回数を数え、
//! 上限に達したらロックアウト期間中の検証をすべて拒否する。
//!
//! # 状態
//! - Clear: 記録なし（またはロックアウト期間より古い記録）
//! - Accumulating: `1 <= failed_count < max_attempts`
//! - LockedOut: `failed_count >= max_attempts` かつ最終失敗からロックアウト期間内
//!
//! バックエンドは [`AttemptStore`] トレイトで差し替え可能。
//! 複数インスタンス構成では共有ストア（Postgres）を使うこと。

use async_trait::async_trait;
use dashmap::DashMap;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::AttemptState;

/// デフォルトの最大失敗回数
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// デフォルトのロックアウト期間（15分）
pub const DEFAULT_LOCKOUT_DURATION: Duration = Duration::minutes(15);

/// ロックアウトポリシー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    pub max_attempts: u32,
    pub lockout_duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            lockout_duration: DEFAULT_LOCKOUT_DURATION,
        }
    }
}

/// 検証可否の判定結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptStatus {
    Allowed { remaining: u32 },
    LockedOut,
}

impl AttemptStatus {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

impl LockoutPolicy {
    pub fn new(max_attempts: u32, lockout_duration: Duration) -> Self {
        Self {
            max_attempts,
            lockout_duration,
        }
    }

    /// これ以前（同時刻を含む）の最終失敗は期限切れ
    ///
    /// Postgres ストアの SQL もこの境界を使う
    pub fn expiry_cutoff(&self, now: OffsetDateTime) -> OffsetDateTime {
        now - self.lockout_duration
    }

    /// 最終失敗からロックアウト期間以上経過しているか
    pub fn is_expired(&self, state: &AttemptState, now: OffsetDateTime) -> bool {
        state.last_attempt <= self.expiry_cutoff(now)
    }

    /// 記録の有無と現在時刻から状態を判定
    pub fn evaluate(&self, state: Option<&AttemptState>, now: OffsetDateTime) -> AttemptStatus {
        match state {
            Some(state) if !self.is_expired(state, now) => {
                if state.failed_count >= self.max_attempts {
                    AttemptStatus::LockedOut
                } else {
                    AttemptStatus::Allowed {
                        remaining: self.max_attempts - state.failed_count,
                    }
                }
            }
            _ => AttemptStatus::Allowed {
                remaining: self.max_attempts,
            },
        }
    }

    /// 失敗を1件加算した次の状態（期限切れの記録は 1 から数え直す）
    pub fn next_failure(&self, state: Option<&AttemptState>, now: OffsetDateTime) -> AttemptState {
        let failed_count = match state {
            Some(state) if !self.is_expired(state, now) => state.failed_count.saturating_add(1),
            _ => 1,
        };
        AttemptState {
            failed_count,
            last_attempt: now,
        }
    }

    /// 検証前に試行枠を1回分予約した次の状態
    ///
    /// ロック中は `None`（加算しない）。期限切れの記録は 1 から数え直す
    pub fn consume(
        &self,
        state: Option<&AttemptState>,
        now: OffsetDateTime,
    ) -> Option<AttemptState> {
        match self.evaluate(state, now) {
            AttemptStatus::LockedOut => None,
            AttemptStatus::Allowed { .. } => Some(self.next_failure(state, now)),
        }
    }

    /// ロックアウト期間（分、切り上げ）
    pub fn lockout_minutes(&self) -> i64 {
        (self.lockout_duration.whole_seconds() + 59) / 60
    }
}

/// 失敗試行ストア
///
/// 各操作はユーザー単位でアトミックであること
#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// 適用中のポリシー
    fn policy(&self) -> &LockoutPolicy;

    /// 期限切れの記録を削除したうえで検証可否を判定
    async fn check_allowed(
        &self,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<AttemptStatus, AppError>;

    /// 失敗を記録し、更新後の状態を返す
    async fn record_failure(
        &self,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<AttemptState, AppError>;

    /// コード照合の前に試行枠を1回分アトミックに予約する
    ///
    /// 判定と加算を分けると同一ユーザーの並行リクエストがすべて判定を通過するため、
    /// 1回の操作で行う。ロック中は加算せず `LockedOut`。
    /// 照合に成功したら `record_success` で記録を消す
    async fn try_consume(
        &self,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<AttemptStatus, AppError>;

    /// 成功時に記録を完全に削除
    async fn record_success(&self, user_id: Uuid) -> Result<(), AppError>;
}

/// プロセス内メモリのストア
///
/// # Note
/// インスタンス間で共有されないため、複数インスタンス構成ではロックアウトが緩くなる
#[derive(Debug, Default)]
pub struct InMemoryAttemptStore {
    policy: LockoutPolicy,
    entries: DashMap<Uuid, AttemptState>,
}

impl InMemoryAttemptStore {
    pub fn new(policy: LockoutPolicy) -> Self {
        Self {
            policy,
            entries: DashMap::new(),
        }
    }

    /// 現在の失敗回数（記録なしは 0）
    pub fn failed_count(&self, user_id: Uuid) -> u32 {
        self.entries
            .get(&user_id)
            .map(|entry| entry.failed_count)
            .unwrap_or(0)
    }
}

#[async_trait]
impl AttemptStore for InMemoryAttemptStore {
    fn policy(&self) -> &LockoutPolicy {
        &self.policy
    }

    async fn check_allowed(
        &self,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<AttemptStatus, AppError> {
        self.entries
            .remove_if(&user_id, |_, state| self.policy.is_expired(state, now));

        let entry = self.entries.get(&user_id);
        Ok(self.policy.evaluate(entry.as_deref(), now))
    }

    async fn record_failure(
        &self,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<AttemptState, AppError> {
        // entry はシャードの書き込みロックを保持するので読み取りと更新がアトミックになる
        let mut entry = self
            .entries
            .entry(user_id)
            .or_insert_with(|| AttemptState {
                failed_count: 0,
                last_attempt: now,
            });
        let next = self.policy.next_failure(Some(&*entry), now);
        *entry = next;
        Ok(next)
    }

    async fn try_consume(
        &self,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<AttemptStatus, AppError> {
        let mut entry = self
            .entries
            .entry(user_id)
            .or_insert_with(|| AttemptState {
                failed_count: 0,
                last_attempt: now,
            });
        Ok(match self.policy.consume(Some(&*entry), now) {
            Some(next) => {
                *entry = next;
                AttemptStatus::Allowed {
                    remaining: self.policy.max_attempts.saturating_sub(next.failed_count),
                }
            }
            None => AttemptStatus::LockedOut,
        })
    }

    async fn record_success(&self, user_id: Uuid) -> Result<(), AppError> {
        self.entries.remove(&user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(unix: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(unix).unwrap()
    }

    #[tokio::test]
    async fn test_clear_identity_is_allowed() {
        let store = InMemoryAttemptStore::default();
        let status = store.check_allowed(Uuid::new_v4(), at(1_000)).await.unwrap();
        assert_eq!(status, AttemptStatus::Allowed { remaining: 5 });
    }

    #[tokio::test]
    async fn test_locks_out_on_fifth_failure() {
        let store = InMemoryAttemptStore::default();
        let user = Uuid::new_v4();
        let now = at(1_000);

        for n in 1..5u32 {
            store.record_failure(user, now).await.unwrap();
            let status = store.check_allowed(user, now).await.unwrap();
            assert_eq!(status, AttemptStatus::Allowed { remaining: 5 - n });
        }

        let state = store.record_failure(user, now).await.unwrap();
        assert_eq!(state.failed_count, 5);
        assert_eq!(
            store.check_allowed(user, now).await.unwrap(),
            AttemptStatus::LockedOut
        );
        // ロック中も期間内はずっと拒否
        assert_eq!(
            store.check_allowed(user, at(1_000 + 899)).await.unwrap(),
            AttemptStatus::LockedOut
        );
    }

    #[tokio::test]
    async fn test_success_resets_count() {
        let store = InMemoryAttemptStore::default();
        let user = Uuid::new_v4();
        let now = at(1_000);

        for _ in 0..4 {
            store.record_failure(user, now).await.unwrap();
        }
        store.record_success(user).await.unwrap();
        assert_eq!(store.failed_count(user), 0);

        for _ in 0..4 {
            store.record_failure(user, now).await.unwrap();
        }
        assert!(store.check_allowed(user, now).await.unwrap().is_allowed());
        assert_eq!(store.failed_count(user), 4);
    }

    #[tokio::test]
    async fn test_lockout_expires_after_window() {
        let store = InMemoryAttemptStore::default();
        let user = Uuid::new_v4();

        for _ in 0..10 {
            store.record_failure(user, at(1_000)).await.unwrap();
        }
        assert_eq!(
            store.check_allowed(user, at(1_000)).await.unwrap(),
            AttemptStatus::LockedOut
        );

        // ちょうど15分後は Clear
        let status = store.check_allowed(user, at(1_000 + 900)).await.unwrap();
        assert_eq!(status, AttemptStatus::Allowed { remaining: 5 });
        // 期限切れの記録は削除されている
        assert_eq!(store.failed_count(user), 0);
    }

    #[tokio::test]
    async fn test_failure_after_expiry_restarts_count() {
        let store = InMemoryAttemptStore::default();
        let user = Uuid::new_v4();

        for _ in 0..3 {
            store.record_failure(user, at(1_000)).await.unwrap();
        }
        let state = store.record_failure(user, at(1_000 + 901)).await.unwrap();
        assert_eq!(state.failed_count, 1);
        assert_eq!(state.last_attempt, at(1_000 + 901));
    }

    #[tokio::test]
    async fn test_identities_are_independent() {
        let store = InMemoryAttemptStore::default();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let now = at(1_000);

        for _ in 0..5 {
            store.record_failure(alice, now).await.unwrap();
        }
        assert!(!store.check_allowed(alice, now).await.unwrap().is_allowed());
        assert!(store.check_allowed(bob, now).await.unwrap().is_allowed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_failures_are_not_lost() {
        let store = std::sync::Arc::new(InMemoryAttemptStore::default());
        let user = Uuid::new_v4();
        let now = at(1_000);

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.record_failure(user, now).await.unwrap() })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.failed_count(user), 50);
    }

    #[tokio::test]
    async fn test_try_consume_stops_at_max_attempts() {
        let store = InMemoryAttemptStore::default();
        let user = Uuid::new_v4();
        let now = at(1_000);

        for n in 1..=5u32 {
            let status = store.try_consume(user, now).await.unwrap();
            assert_eq!(status, AttemptStatus::Allowed { remaining: 5 - n });
        }
        assert_eq!(
            store.try_consume(user, now).await.unwrap(),
            AttemptStatus::LockedOut
        );
        // ロック中の予約は加算しない
        assert_eq!(store.failed_count(user), 5);

        store.record_success(user).await.unwrap();
        assert!(store.try_consume(user, now).await.unwrap().is_allowed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_try_consume_grants_at_most_max() {
        let store = std::sync::Arc::new(InMemoryAttemptStore::default());
        let user = Uuid::new_v4();
        let now = at(1_000);

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.try_consume(user, now).await.unwrap() })
            })
            .collect();
        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap().is_allowed() {
                granted += 1;
            }
        }

        assert_eq!(granted, 5);
        assert_eq!(store.failed_count(user), 5);
    }

    #[test]
    fn test_expiry_boundary() {
        let policy = LockoutPolicy::default();
        let now = at(10_000);
        assert_eq!(policy.expiry_cutoff(now), at(10_000 - 900));

        let at_cutoff = AttemptState {
            failed_count: 5,
            last_attempt: at(10_000 - 900),
        };
        let inside = AttemptState {
            failed_count: 5,
            last_attempt: at(10_000 - 899),
        };
        // ちょうど境界は期限切れ
        assert!(policy.is_expired(&at_cutoff, now));
        assert!(!policy.is_expired(&inside, now));
    }

    #[test]
    fn test_consume_decisions() {
        let policy = LockoutPolicy::default();
        let now = at(10_000);
        let state = |failed_count, last: i64| AttemptState {
            failed_count,
            last_attempt: at(last),
        };

        // 記録なし → 1
        assert_eq!(policy.consume(None, now).unwrap().failed_count, 1);
        // 期間内・上限未満 → 加算
        assert_eq!(
            policy.consume(Some(&state(4, 9_500)), now).unwrap().failed_count,
            5
        );
        // 期間内・上限到達 → 拒否（加算しない）
        assert_eq!(policy.consume(Some(&state(5, 9_500)), now), None);
        // 境界ちょうど・上限到達 → 期限切れとして 1 から
        let restarted = policy.consume(Some(&state(5, 9_100)), now).unwrap();
        assert_eq!(restarted.failed_count, 1);
        assert_eq!(restarted.last_attempt, now);
    }

    #[test]
    fn test_custom_policy() {
        let policy = LockoutPolicy::new(3, Duration::minutes(5));
        let state = AttemptState {
            failed_count: 3,
            last_attempt: at(0),
        };
        assert_eq!(policy.evaluate(Some(&state), at(299)), AttemptStatus::LockedOut);
        assert!(policy.evaluate(Some(&state), at(300)).is_allowed());
        assert_eq!(policy.lockout_minutes(), 5);
    }

    #[test]
    fn test_lockout_minutes_rounds_up() {
        let policy = LockoutPolicy::new(5, Duration::seconds(61));
        assert_eq!(policy.lockout_minutes(), 2);
        assert_eq!(LockoutPolicy::default().lockout_minutes(), 15);
    }
}
