use crate::error::{AppError, AppResult};

pub fn hash_password(password: &str, cost: u32) -> AppResult<String> {
    bcrypt::hash(password, cost).map_err(|e| AppError::Internal(format!("bcrypt: {}", e)))
}

/// Constant-time check via bcrypt; a malformed stored hash never matches.
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hash = hash_password("correct horse", 4).unwrap();
        assert_ne!(hash, "correct horse");
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
    }

    #[test]
    fn garbage_hash_never_verifies() {
        assert!(!verify_password("anything", "not-a-bcrypt-hash"));
    }
}
