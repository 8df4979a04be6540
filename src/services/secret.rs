use rand::{RngCore, rngs::OsRng};

use crate::error::AppError;
use crate::models::SharedSecret;

/// シークレット長（160ビット）
pub const SECRET_LEN: usize = 20;

/// 20バイトのランダムシークレットを OS の CSPRNG から生成し、Base32（パディングなし）でエンコード
///
/// # Errors
/// 乱数源が利用できない場合は `RandomSourceUnavailable`。弱い乱数源へのフォールバックはしない
pub fn generate_secret() -> Result<SharedSecret, AppError> {
    let mut bytes = [0u8; SECRET_LEN];
    OsRng.try_fill_bytes(&mut bytes).map_err(|e| {
        tracing::error!(error = %e, "OS 乱数源からの読み取りに失敗");
        AppError::RandomSourceUnavailable
    })?;
    Ok(SharedSecret::from_bytes(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_secret() {
        let secret = generate_secret().unwrap();
        // Base32エンコードされた20バイト = 32文字
        assert_eq!(secret.as_str().len(), 32);
        assert!(
            secret
                .as_str()
                .chars()
                .all(|c| "ABCDEFGHIJKLMNOPQRSTUVWXYZ234567".contains(c))
        );
        assert_eq!(secret.key_bytes().unwrap().len(), SECRET_LEN);
    }

    #[test]
    fn test_generate_secret_is_unique() {
        let a = generate_secret().unwrap();
        let b = generate_secret().unwrap();
        assert_ne!(a, b);
    }
}
