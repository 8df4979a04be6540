use subtle::{Choice, ConstantTimeEq};
use time::OffsetDateTime;

use crate::error::AppError;
use crate::models::SharedSecret;
use crate::services::hotp::{self, Hotp};

/// デフォルトのステップ幅（秒）
pub const DEFAULT_STEP_SECS: u32 = 30;

/// デフォルトの許容ステップ数（前後）
pub const DEFAULT_WINDOW_STEPS: i32 = 1;

/// TOTP (Time-based One-Time Password) 検証器
///
/// # Security
/// - 候補コードとの比較は定数時間
/// - 形式不正なコードは比較せずに不一致とする
#[derive(Debug, Clone, Copy)]
pub struct TotpVerifier {
    step_secs: u32,
    window_steps: i32,
}

impl Default for TotpVerifier {
    fn default() -> Self {
        Self {
            step_secs: DEFAULT_STEP_SECS,
            window_steps: DEFAULT_WINDOW_STEPS,
        }
    }
}

impl TotpVerifier {
    /// 新しい TotpVerifier を作成
    ///
    /// `step_secs` が 0 の場合は既定値を使う
    pub fn new(step_secs: u32, window_steps: i32) -> Self {
        Self {
            step_secs: if step_secs == 0 {
                DEFAULT_STEP_SECS
            } else {
                step_secs
            },
            window_steps: window_steps.max(0),
        }
    }

    pub fn step_secs(&self) -> u32 {
        self.step_secs
    }

    /// 時刻からカウンターを導出（`floor(unix秒 / step)`）
    ///
    /// エポック以前の時刻は `None`
    pub fn counter_at(&self, now: OffsetDateTime) -> Option<u64> {
        let secs = u64::try_from(now.unix_timestamp()).ok()?;
        Some(secs / u64::from(self.step_secs))
    }

    /// 指定時刻で有効なコード（テストやクライアント側シミュレーション用）
    pub fn code_at(&self, secret: &SharedSecret, now: OffsetDateTime) -> Result<String, AppError> {
        let counter = self
            .counter_at(now)
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("timestamp before unix epoch")))?;
        hotp::compute(secret, counter)
    }

    /// TOTPコードを検証
    ///
    /// # Note
    /// 前後 `window_steps` ステップの時間ウィンドウを許容（既定 ±30秒）
    pub fn verify(
        &self,
        secret: &SharedSecret,
        submitted_code: &str,
        now: OffsetDateTime,
    ) -> Result<bool, AppError> {
        // 入力検証: コードは6桁の数字のみ
        if !is_well_formed(submitted_code) {
            return Ok(false);
        }

        let Some(base_counter) = self.counter_at(now) else {
            return Ok(false);
        };

        let hotp = Hotp::new(secret)?;
        let submitted = submitted_code.as_bytes();

        // 一致した時点で打ち切らず全候補と比較する
        let mut matched = Choice::from(0);
        for delta in -self.window_steps..=self.window_steps {
            let Some(counter) = base_counter.checked_add_signed(i64::from(delta)) else {
                continue;
            };
            matched |= hotp.compute(counter).as_bytes().ct_eq(submitted);
        }

        Ok(matched.into())
    }
}

/// 6桁の ASCII 数字かどうか
pub fn is_well_formed(code: &str) -> bool {
    code.len() == hotp::DIGITS && code.bytes().all(|b| b.is_ascii_digit())
}

/// 認証アプリ登録用の `otpauth://` URI を生成
///
/// # Arguments
/// * `issuer` - 発行者名（認証アプリに表示される）
/// * `account_label` - アカウント識別子（メールアドレス等）
/// * `secret` - Base32エンコードされたシークレット
pub fn provisioning_uri(issuer: &str, account_label: &str, secret: &SharedSecret) -> String {
    let issuer = urlencoding::encode(issuer);
    format!(
        "otpauth://totp/{}:{}?secret={}&issuer={}",
        issuer,
        urlencoding::encode(account_label),
        secret.as_str(),
        issuer
    )
}
