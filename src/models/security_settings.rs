use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use super::SharedSecret;

/// ユーザーのセキュリティ設定（二要素認証レコード）
///
/// 行は削除されず、各フィールドのみクリアされる。
/// 不変条件: `two_factor_enabled == true` ならシークレットが存在する
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SecuritySettings {
    pub user_id: Uuid,
    #[serde(skip)]
    pub two_factor_secret: Option<SharedSecret>,
    pub two_factor_enabled: bool,
    pub two_factor_method: Option<String>,
}

/// 二要素認証の状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwoFactorState {
    /// シークレット未発行（または無効化済み）
    Unset,
    /// シークレット発行済み、初回コード確認待ち
    PendingVerification,
    /// 有効
    Enabled,
}

impl SecuritySettings {
    pub fn state(&self) -> TwoFactorState {
        match (&self.two_factor_secret, self.two_factor_enabled) {
            (Some(_), true) => TwoFactorState::Enabled,
            (Some(_), false) => TwoFactorState::PendingVerification,
            // enabled だがシークレットなしは不整合なので未設定扱い
            (None, _) => TwoFactorState::Unset,
        }
    }

    /// 有効化済みの場合のみシークレットを返す
    pub fn enabled_secret(&self) -> Option<&SharedSecret> {
        match self.state() {
            TwoFactorState::Enabled => self.two_factor_secret.as_ref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(secret: Option<&str>, enabled: bool) -> SecuritySettings {
        SecuritySettings {
            user_id: Uuid::new_v4(),
            two_factor_secret: secret.map(SharedSecret::from_base32),
            two_factor_enabled: enabled,
            two_factor_method: None,
        }
    }

    #[test]
    fn test_state_transitions() {
        assert_eq!(settings(None, false).state(), TwoFactorState::Unset);
        assert_eq!(
            settings(Some("MZXW6"), false).state(),
            TwoFactorState::PendingVerification
        );
        assert_eq!(settings(Some("MZXW6"), true).state(), TwoFactorState::Enabled);
    }

    #[test]
    fn test_enabled_without_secret_is_unset() {
        let record = settings(None, true);
        assert_eq!(record.state(), TwoFactorState::Unset);
        assert!(record.enabled_secret().is_none());
    }

    #[test]
    fn test_pending_secret_is_not_enabled_secret() {
        assert!(settings(Some("MZXW6"), false).enabled_secret().is_none());
        assert!(settings(Some("MZXW6"), true).enabled_secret().is_some());
    }
}
