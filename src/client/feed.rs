use std::sync::Arc;

use serde::Deserialize;

use crate::client::api::ApiClient;
use crate::client::error::ClientError;
use crate::db::models::Post;

#[derive(Deserialize)]
struct PostsResponse {
    posts: Vec<Post>,
}

/// Outcome of a like or save toggle.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ToggleResult {
    pub success: bool,
    #[serde(default)]
    pub liked: Option<bool>,
    #[serde(default)]
    pub saved: Option<bool>,
    pub like_count: i64,
}

pub struct FeedService {
    api: Arc<ApiClient>,
}

impl FeedService {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    async fn require_token(&self) -> Result<(), ClientError> {
        match self.api.token().await {
            Some(_) => Ok(()),
            None => Err(ClientError::NotAuthenticated),
        }
    }

    /// The signed-in user's feed, newest first.
    pub async fn fetch_posts(&self, limit: Option<usize>) -> Result<Vec<Post>, ClientError> {
        self.require_token().await?;
        let path = match limit {
            Some(limit) => format!("/api/posts/feed?limit={}", limit),
            None => "/api/posts/feed".to_string(),
        };
        let response: PostsResponse = self.api.get(&path).await?;
        Ok(response.posts)
    }

    async fn toggle(&self, post_id: &str, action: &str) -> Result<ToggleResult, ClientError> {
        self.require_token().await?;
        self.api
            .post_empty(&format!("/api/posts/{}/{}", post_id, action))
            .await
    }

    pub async fn like(&self, post_id: &str) -> Result<ToggleResult, ClientError> {
        self.toggle(post_id, "like").await
    }

    pub async fn unlike(&self, post_id: &str) -> Result<ToggleResult, ClientError> {
        self.toggle(post_id, "unlike").await
    }

    pub async fn save(&self, post_id: &str) -> Result<ToggleResult, ClientError> {
        self.toggle(post_id, "save").await
    }

    pub async fn unsave(&self, post_id: &str) -> Result<ToggleResult, ClientError> {
        self.toggle(post_id, "unsave").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn signed_out_calls_fail_fast() {
        let feed = FeedService::new(Arc::new(ApiClient::new("http://127.0.0.1:9")));
        assert!(matches!(
            feed.fetch_posts(None).await,
            Err(ClientError::NotAuthenticated)
        ));
        assert!(matches!(
            feed.like("p1").await,
            Err(ClientError::NotAuthenticated)
        ));
    }
}
