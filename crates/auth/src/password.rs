//! Argon2id 密码哈希
//!
//! 哈希以PHC字符串存储，算法参数与盐值都编码在其中。

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use herqles_core::{HerqlesError, HerqlesResult};

pub fn hash_password(password: &str) -> HerqlesResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| HerqlesError::internal(format!("密码哈希失败: {e}")))
}

/// 校验密码，不匹配返回 `Ok(false)`，哈希损坏返回错误
pub fn verify_password(password: &str, hash: &str) -> HerqlesResult<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| HerqlesError::internal(format!("无效的密码哈希: {e}")))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(HerqlesError::internal(format!("密码校验失败: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct-horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct-horse", &hash).unwrap());
        assert!(!verify_password("wrong-horse", &hash).unwrap());
    }

    #[test]
    fn test_hashes_are_salted() {
        let a = hash_password("same").unwrap();
        let b = hash_password("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_corrupt_hash_is_error() {
        assert!(verify_password("x", "not-a-phc-string").is_err());
    }
}
