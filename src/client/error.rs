use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: StatusCode, message: String },

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Credential storage error: {0}")]
    Storage(String),
}

impl ClientError {
    /// Transport failures, throttling and server-side errors may succeed on
    /// a later attempt; everything else will fail the same way again.
    pub fn is_retriable(&self) -> bool {
        match self {
            ClientError::Transport(e) => !e.is_decode() && !e.is_builder(),
            ClientError::Api { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            ClientError::NotAuthenticated | ClientError::Storage(_) => false,
        }
    }

    /// Single message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Transport(_) => {
                "Unable to reach the server. Check your connection and try again.".to_string()
            }
            ClientError::Api { status, .. } if status.is_server_error() => {
                "Something went wrong on our end. Please try again.".to_string()
            }
            ClientError::Api { message, .. } if !message.trim().is_empty() => message.clone(),
            ClientError::Api { status, .. } => status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string(),
            ClientError::NotAuthenticated => "Please log in to continue.".to_string(),
            ClientError::Storage(_) => "Could not access saved credentials.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: StatusCode, message: &str) -> ClientError {
        ClientError::Api {
            status,
            message: message.to_string(),
        }
    }

    #[test]
    fn only_server_side_failures_are_retriable() {
        assert!(api(StatusCode::INTERNAL_SERVER_ERROR, "boom").is_retriable());
        assert!(api(StatusCode::TOO_MANY_REQUESTS, "").is_retriable());
        assert!(!api(StatusCode::UNAUTHORIZED, "Invalid credentials").is_retriable());
        assert!(!api(StatusCode::BAD_REQUEST, "Username too short").is_retriable());
        assert!(!ClientError::NotAuthenticated.is_retriable());
    }

    #[test]
    fn user_messages_are_never_empty() {
        assert_eq!(
            api(StatusCode::UNAUTHORIZED, "Invalid credentials").user_message(),
            "Invalid credentials"
        );
        assert_eq!(api(StatusCode::NOT_FOUND, "").user_message(), "Not Found");
        assert!(api(StatusCode::BAD_GATEWAY, "upstream detail")
            .user_message()
            .contains("try again"));
        assert!(!ClientError::Storage("disk".into()).user_message().is_empty());
    }
}
