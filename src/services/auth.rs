use axum::http::{HeaderMap, header::AUTHORIZATION};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::User;
use crate::repositories::UserRepository;
use crate::services::hydra::{HydraClient, IntrospectedToken};

/// 認証サービス
///
/// Bearer トークンを Hydra でイントロスペクトし、対応するユーザーを返す
#[derive(Clone)]
pub struct AuthService {
    hydra_client: HydraClient,
    user_repo: UserRepository,
}

impl AuthService {
    /// 新しい AuthService を作成
    pub fn new(hydra_client: HydraClient, user_repo: UserRepository) -> Self {
        Self {
            hydra_client,
            user_repo,
        }
    }

    /// リクエストヘッダーから認証済みユーザーを取得
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<User, AppError> {
        let token = bearer_token(headers).ok_or_else(|| {
            tracing::warn!("認証失敗: Bearer トークンなし");
            AppError::Unauthenticated
        })?;

        let introspected = self.hydra_client.introspect_token(token).await?;
        let user_id = subject_of(&introspected).ok_or_else(|| {
            tracing::warn!("認証失敗: 無効なトークン");
            AppError::Unauthenticated
        })?;

        let user = self.user_repo.find_by_id(user_id).await?.ok_or_else(|| {
            tracing::warn!(user_id = %user_id, "認証失敗: ユーザー不在");
            AppError::Unauthenticated
        })?;

        Ok(user)
    }
}

/// `Authorization: Bearer <token>` からトークンを取り出す
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// 有効なトークンの subject をユーザーIDとして解釈
fn subject_of(token: &IntrospectedToken) -> Option<Uuid> {
    if !token.active {
        return None;
    }
    token.sub.as_deref().and_then(|sub| Uuid::parse_str(sub).ok())
}
