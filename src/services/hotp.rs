//! HOTP (RFC 4226)
//!
//! HMAC-SHA1 + 動的切り詰めによる6桁コード計算

use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::error::AppError;
use crate::models::SharedSecret;

type HmacSha1 = Hmac<Sha1>;

/// コード桁数
pub const DIGITS: usize = 6;

const MODULUS: u32 = 1_000_000;

/// シークレットから作った HMAC 鍵を保持する HOTP 計算器
///
/// 鍵の初期化は一度だけ行い、カウンターごとに複製して使う
#[derive(Clone)]
pub struct Hotp {
    mac: HmacSha1,
}

impl Hotp {
    /// Base32 シークレットから計算器を作成
    pub fn new(secret: &SharedSecret) -> Result<Self, AppError> {
        let key = secret.key_bytes().map_err(|e| {
            tracing::error!(error = %e, "シークレットのBase32デコードエラー");
            AppError::Internal(anyhow::anyhow!("invalid base32 secret"))
        })?;
        Self::from_key(&key)
    }

    /// 生の鍵バイト列から計算器を作成
    pub fn from_key(key: &[u8]) -> Result<Self, AppError> {
        let mac = HmacSha1::new_from_slice(key).map_err(|e| {
            tracing::error!(error = %e, "HMAC鍵の初期化エラー");
            AppError::Internal(anyhow::anyhow!("hmac key error"))
        })?;
        Ok(Self { mac })
    }

    /// カウンターに対するコード（ゼロ埋め6桁）
    pub fn compute(&self, counter: u64) -> String {
        let mut mac = self.mac.clone();
        mac.update(&counter.to_be_bytes());
        let digest = mac.finalize().into_bytes();

        let offset = (digest[digest.len() - 1] & 0x0f) as usize;
        let value = u32::from_be_bytes([
            digest[offset],
            digest[offset + 1],
            digest[offset + 2],
            digest[offset + 3],
        ]) & 0x7fff_ffff;

        format!("{:0width$}", value % MODULUS, width = DIGITS)
    }
}

/// `(secret, counter)` から HOTP コードを計算する
pub fn compute(secret: &SharedSecret, counter: u64) -> Result<String, AppError> {
    Ok(Hotp::new(secret)?.compute(counter))
}
