use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::AppError;
use crate::state::AppState;

/// 2FA 操作リクエスト
///
/// `action` フィールドで操作を判別する
#[derive(Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum TwoFactorRequest {
    Setup,
    Verify {
        // 欠落も形式不正として扱い、試行を消費させる
        #[serde(default)]
        token: String,
    },
    Validate {
        #[serde(default)]
        token: String,
    },
    Disable,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupResponse {
    pub success: bool,
    pub secret: String,
    pub qr_code_url: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: &'static str,
}

impl MessageResponse {
    fn new(success: bool, message: &'static str) -> Self {
        Self { success, message }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub enabled: bool,
    pub method: Option<String>,
}

const MSG_ENABLED: &str = "2FA enabled successfully";
const MSG_VERIFIED: &str = "Code verified";
const MSG_DISABLED: &str = "2FA disabled successfully";
const MSG_INVALID: &str = "Invalid verification code";

/// POST /api/2fa
///
/// 2FA 操作（setup / verify / validate / disable）
///
/// # Security
/// - Bearer トークン必須（本人の操作のみ）
/// - シークレット・コードはログ出力禁止
pub async fn two_factor(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<TwoFactorRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let user = state.auth_service.authenticate(&headers).await?;
    let Json(request) = payload.map_err(|e| {
        tracing::debug!(error = %e, "不正なリクエストボディ");
        AppError::Validation("Invalid action".to_string())
    })?;
    let service = &state.two_factor_service;

    let response = match request {
        TwoFactorRequest::Setup => {
            let outcome = service.setup(user.id, &user.email).await?;
            Json(SetupResponse {
                success: true,
                secret: outcome.secret.as_str().to_string(),
                qr_code_url: outcome.provisioning_uri,
            })
            .into_response()
        }
        TwoFactorRequest::Verify { token } => {
            let enabled = service
                .verify(user.id, &token, OffsetDateTime::now_utc())
                .await?;
            code_check_response(enabled, MSG_ENABLED)
        }
        TwoFactorRequest::Validate { token } => {
            let valid = service
                .validate(user.id, &token, OffsetDateTime::now_utc())
                .await?;
            code_check_response(valid, MSG_VERIFIED)
        }
        TwoFactorRequest::Disable => {
            service.disable(user.id).await?;
            Json(MessageResponse::new(true, MSG_DISABLED)).into_response()
        }
    };

    Ok(response)
}

/// GET /api/2fa/status
///
/// 2FA の有効状態を返す（シークレットは返さない）
pub async fn two_factor_status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<StatusResponse>, AppError> {
    let user = state.auth_service.authenticate(&headers).await?;
    let status = state.two_factor_service.status(user.id).await?;

    Ok(Json(StatusResponse {
        enabled: status.enabled,
        method: status.method,
    }))
}

/// 検証結果のレスポンス（不一致か形式不正かは区別しない）
fn code_check_response(success: bool, success_message: &'static str) -> Response {
    let message = if success { success_message } else { MSG_INVALID };
    Json(MessageResponse::new(success, message)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn parse(json: &str) -> Result<TwoFactorRequest, serde_json::Error> {
        serde_json::from_str(json)
    }

    #[test]
    fn test_parse_actions() {
        assert!(matches!(parse(r#"{"action":"setup"}"#), Ok(TwoFactorRequest::Setup)));
        assert!(matches!(
            parse(r#"{"action":"disable"}"#),
            Ok(TwoFactorRequest::Disable)
        ));
        assert!(matches!(
            parse(r#"{"action":"verify","token":"123456"}"#),
            Ok(TwoFactorRequest::Verify { token }) if token == "123456"
        ));
        assert!(matches!(
            parse(r#"{"action":"validate","token":"654321"}"#),
            Ok(TwoFactorRequest::Validate { token }) if token == "654321"
        ));
    }

    #[test]
    fn test_missing_token_is_empty() {
        assert!(matches!(
            parse(r#"{"action":"verify"}"#),
            Ok(TwoFactorRequest::Verify { token }) if token.is_empty()
        ));
    }

    #[test]
    fn test_unknown_action_is_rejected() {
        assert!(parse(r#"{"action":"reset"}"#).is_err());
        assert!(parse(r#"{"token":"123456"}"#).is_err());
    }

    #[test]
    fn test_setup_response_shape() {
        let json = serde_json::to_value(SetupResponse {
            success: true,
            secret: "ABC".to_string(),
            qr_code_url: "otpauth://totp/X:y?secret=ABC&issuer=X".to_string(),
        })
        .unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["secret"], "ABC");
        assert_eq!(json["qrCodeUrl"], "otpauth://totp/X:y?secret=ABC&issuer=X");
    }

    #[test]
    fn test_code_check_response() {
        let ok = code_check_response(true, MSG_ENABLED);
        assert_eq!(ok.status(), StatusCode::OK);

        let json = serde_json::to_value(MessageResponse::new(false, MSG_INVALID)).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "Invalid verification code");
    }
}
