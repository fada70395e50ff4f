use crate::error::{AppError, AppResult};

/// Hash a password off the async runtime; bcrypt is deliberately slow.
pub async fn hash(password: String, cost: u32) -> AppResult<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AppError::Internal(format!("hash task failed: {}", e)))?
        .map_err(AppError::from)
}

pub async fn verify(password: String, hash: String) -> AppResult<bool> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AppError::Internal(format!("verify task failed: {}", e)))?
        .map_err(AppError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_then_verify() {
        let hashed = hash("secret1".into(), 4).await.unwrap();
        assert_ne!(hashed, "secret1");
        assert!(verify("secret1".into(), hashed.clone()).await.unwrap());
        assert!(!verify("secret2".into(), hashed).await.unwrap());
    }

    #[tokio::test]
    async fn malformed_hash_is_an_error() {
        assert!(verify("secret1".into(), "not-a-hash".into()).await.is_err());
    }
}
