use serde::Deserialize;

use crate::error::AppError;

/// トークンイントロスペクション結果
///
/// `active == false` の場合、他のフィールドは返されない
#[derive(Debug, Deserialize)]
pub struct IntrospectedToken {
    pub active: bool,
    #[serde(default)]
    pub sub: Option<String>,
}

/// Hydra Admin API クライアント
#[derive(Clone)]
pub struct HydraClient {
    client: reqwest::Client,
    admin_url: String,
}

impl HydraClient {
    /// 新しい HydraClient を作成
    pub fn new(admin_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            admin_url: admin_url.trim_end_matches('/').to_string(),
        }
    }

    /// アクセストークンをイントロスペクト
    ///
    /// # Security
    /// - トークン本体はログ出力禁止
    pub async fn introspect_token(&self, token: &str) -> Result<IntrospectedToken, AppError> {
        let url = format!("{}/admin/oauth2/introspect", self.admin_url);

        let response: reqwest::Response = self
            .client
            .post(&url)
            .form(&[("token", token)])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::error!(status = %status, "Hydra introspect 失敗");
            return Err(AppError::Internal(anyhow::anyhow!(
                "Hydra introspect returned status: {}",
                status
            )));
        }

        let introspected: IntrospectedToken = response.json().await.map_err(|e| {
            tracing::error!(error = ?e, "Hydra レスポンスのパースエラー");
            AppError::Internal(anyhow::anyhow!("Failed to parse Hydra response"))
        })?;

        tracing::debug!(active = introspected.active, "Hydra introspect 成功");
        Ok(introspected)
    }
}
