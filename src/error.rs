use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("認証されていません")]
    Unauthenticated,

    #[error("バリデーションエラー: {0}")]
    Validation(String),

    #[error("データベースエラー")]
    Database(#[from] sqlx::Error),

    #[error("Hydra API エラー")]
    Hydra(#[from] reqwest::Error),

    #[error("内部エラー")]
    Internal(#[from] anyhow::Error),

    #[error("乱数源が利用できません")]
    RandomSourceUnavailable,

    #[error("二要素認証が設定されていません")]
    TwoFactorNotSetUp,

    #[error("試行回数の上限に達しました（{minutes}分間ロック）")]
    TwoFactorLocked { minutes: i64 },
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    locked: Option<bool>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, locked) = match &self {
            Self::Unauthenticated => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string(), None),
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            Self::Database(e) => {
                tracing::error!(error = ?e, "データベースエラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
            Self::Internal(e) => {
                tracing::error!(error = ?e, "内部エラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
            Self::RandomSourceUnavailable => {
                tracing::error!("乱数源が利用できないためシークレットを生成できません");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
            Self::Hydra(e) => {
                tracing::error!(error = ?e, "Hydra通信エラー");
                (
                    StatusCode::BAD_GATEWAY,
                    "Authentication server unavailable".to_string(),
                    None,
                )
            }
            Self::TwoFactorNotSetUp => {
                (StatusCode::BAD_REQUEST, "2FA not set up".to_string(), None)
            }
            Self::TwoFactorLocked { minutes } => (
                StatusCode::TOO_MANY_REQUESTS,
                format!(
                    "Too many failed attempts. Please try again in {} minutes.",
                    minutes
                ),
                Some(true),
            ),
        };

        (
            status,
            Json(ErrorResponse {
                error: message,
                locked,
            }),
        )
            .into_response()
    }
}
