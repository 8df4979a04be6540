use std::sync::Arc;

use sqlx::PgPool;

use crate::config::{AttemptStoreKind, Config};
use crate::repositories::{SecuritySettingsRepository, TwoFactorAttemptRepository, UserRepository};
use crate::services::hydra::HydraClient;
use crate::services::{AttemptStore, AuthService, InMemoryAttemptStore, TwoFactorService};

/// アプリケーション共有状態
///
/// axum の State として全ハンドラーで共有される。
/// Clone は必須（axum が内部で clone するため）。
#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL コネクションプール
    pub db_pool: PgPool,
    /// アプリケーション設定（Arc で共有）
    pub config: Arc<Config>,
    /// Bearer トークン認証
    pub auth_service: AuthService,
    /// 二要素認証サービス
    pub two_factor_service: TwoFactorService,
}

impl AppState {
    /// 新しい AppState を作成
    pub fn new(db_pool: PgPool, hydra_client: HydraClient, config: Config) -> Self {
        let config = Arc::new(config);
        let user_repo = UserRepository::new(db_pool.clone());
        let auth_service = AuthService::new(hydra_client, user_repo);

        let policy = config.lockout_policy();
        let attempts: Arc<dyn AttemptStore> = match config.attempt_store {
            AttemptStoreKind::Postgres => {
                tracing::info!("試行回数ストア: Postgres（共有）");
                Arc::new(TwoFactorAttemptRepository::new(db_pool.clone(), policy))
            }
            AttemptStoreKind::Memory => {
                tracing::warn!("試行回数ストア: プロセス内メモリ（複数インスタンスでは共有されない）");
                Arc::new(InMemoryAttemptStore::new(policy))
            }
        };

        let two_factor_service = TwoFactorService::new(
            Arc::new(SecuritySettingsRepository::new(db_pool.clone())),
            attempts,
            config.totp_verifier(),
            config.totp_issuer.clone(),
        );

        Self {
            db_pool,
            config,
            auth_service,
            two_factor_service,
        }
    }
}
