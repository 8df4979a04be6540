use std::fmt;

use data_encoding::BASE32_NOPAD;

/// Base32（パディングなし）でエンコードされた TOTP 共有シークレット
///
/// # Security
/// - `Debug` は値を伏せる（ログ出力で平文が漏れないように）
/// - 平文を扱うのはプロビジョニング URI 生成とコード計算のみ
#[derive(Clone, PartialEq, Eq, sqlx::Type)]
#[sqlx(transparent)]
pub struct SharedSecret(String);

impl SharedSecret {
    /// エンコード済み文字列からシークレットを作成
    ///
    /// 小文字や末尾の `=` は正規化する
    pub fn from_base32(encoded: &str) -> Self {
        Self(encoded.trim().trim_end_matches('=').to_ascii_uppercase())
    }

    /// 生バイト列からシークレットを作成
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(BASE32_NOPAD.encode(bytes))
    }

    /// Base32 文字列（パディングなし）
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Base32 デコードして HMAC 鍵のバイト列を得る
    pub fn key_bytes(&self) -> Result<Vec<u8>, data_encoding::DecodeError> {
        BASE32_NOPAD.decode(self.0.as_bytes())
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(***)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RFC4226_SECRET: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

    #[test]
    fn test_from_bytes_is_unpadded_base32() {
        let secret = SharedSecret::from_bytes(b"12345678901234567890");
        assert_eq!(secret.as_str(), RFC4226_SECRET);
        assert!(!secret.as_str().contains('='));
    }

    #[test]
    fn test_from_base32_normalizes_case_and_padding() {
        let secret = SharedSecret::from_base32("mzxw6===");
        assert_eq!(secret.as_str(), "MZXW6");
        assert_eq!(secret.key_bytes().unwrap(), b"foo");
    }

    #[test]
    fn test_key_bytes_roundtrip() {
        let secret = SharedSecret::from_base32(RFC4226_SECRET);
        assert_eq!(secret.key_bytes().unwrap(), b"12345678901234567890");
    }

    #[test]
    fn test_invalid_base32_is_rejected() {
        let secret = SharedSecret::from_base32("NOT-BASE32!");
        assert!(secret.key_bytes().is_err());
    }

    #[test]
    fn test_debug_redacts_value() {
        let secret = SharedSecret::from_base32(RFC4226_SECRET);
        let debug = format!("{:?}", secret);
        assert!(!debug.contains(RFC4226_SECRET));
    }
}
