use crate::errors::{ProxyError, ProxyResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
}

/// Source of the user a tool call acts for.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn current_user(&self) -> Option<SessionUser>;
}

pub async fn require_user(provider: &dyn SessionProvider) -> ProxyResult<SessionUser> {
    provider
        .current_user()
        .await
        .ok_or(ProxyError::Unauthenticated)
}

/// Fixed identity taken from configuration. A blank id means "signed out".
#[derive(Debug, Clone, Default)]
pub struct StaticSession {
    user: Option<SessionUser>,
}

impl StaticSession {
    pub fn new(user_id: Option<String>) -> Self {
        let user = user_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .map(|id| SessionUser { id });
        Self { user }
    }

    pub fn anonymous() -> Self {
        Self { user: None }
    }
}

#[async_trait]
impl SessionProvider for StaticSession {
    async fn current_user(&self) -> Option<SessionUser> {
        self.user.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blank_user_id_is_signed_out() {
        assert!(StaticSession::new(Some("  ".to_string()))
            .current_user()
            .await
            .is_none());
        assert!(StaticSession::anonymous().current_user().await.is_none());
        let user = StaticSession::new(Some(" u1 ".to_string()))
            .current_user()
            .await
            .expect("user");
        assert_eq!(user.id, "u1");
    }

    #[tokio::test]
    async fn require_user_rejects_anonymous() {
        let err = require_user(&StaticSession::anonymous()).await.unwrap_err();
        assert_eq!(err.to_string(), "User not authenticated");
    }
}
