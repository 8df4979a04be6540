use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use crate::state::AppState;

/// ヘルスチェックレスポンス
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub database: &'static str,
}

impl HealthResponse {
    fn new(database_ok: bool) -> (StatusCode, Self) {
        let (code, status, database) = if database_ok {
            (StatusCode::OK, "ok", "ok")
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, "degraded", "unreachable")
        };
        (
            code,
            Self {
                status,
                version: env!("CARGO_PKG_VERSION"),
                database,
            },
        )
    }
}

/// ヘルスチェックハンドラー
///
/// GET /api/health
///
/// サービスとデータベースの稼働状況を返す。
/// 2FA レコードと試行回数はDBにあるため、DB不通時は 503。
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database_ok = match sqlx::query("SELECT 1").execute(&state.db_pool).await {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!(error = ?e, "ヘルスチェック: データベース不通");
            false
        }
    };

    let (code, body) = HealthResponse::new(database_ok);
    (code, Json(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_ok() {
        let (code, body) = HealthResponse::new(true);
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body.status, "ok");
        assert_eq!(body.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_health_response_degraded() {
        let (code, body) = HealthResponse::new(false);
        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.database, "unreachable");
    }
}
