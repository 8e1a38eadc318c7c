use crate::errors::{ProxyError, ProxyResult};
use crate::models::Instance;
use base64::Engine;

/// Authentication material for one upstream call.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    ApiToken(String),
    Basic { username: String, password: String },
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::ApiToken(_) => f.write_str("ApiToken(..)"),
            Credential::Basic { username, .. } => {
                f.debug_struct("Basic").field("username", username).finish()
            }
        }
    }
}

impl Credential {
    pub fn header_value(&self) -> String {
        match self {
            Credential::ApiToken(token) => format!("ApiToken {}", token),
            Credential::Basic { username, password } => {
                let raw = format!("{}:{}", username, password);
                format!(
                    "Basic {}",
                    base64::engine::general_purpose::STANDARD.encode(raw.as_bytes())
                )
            }
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            Credential::ApiToken(_) => "api_token",
            Credential::Basic { .. } => "basic",
        }
    }
}

/// Token first, then username/password. Empty strings count as absent.
pub fn resolve_credential(instance: &Instance) -> ProxyResult<Credential> {
    if let Some(token) = instance.api_token() {
        return Ok(Credential::ApiToken(token.to_string()));
    }
    if let Some((username, password)) = instance.basic_credentials() {
        return Ok(Credential::Basic {
            username: username.to_string(),
            password: password.to_string(),
        });
    }
    Err(ProxyError::MissingCredentials {
        instance: instance.name.clone(),
    })
}

pub fn build_auth_header(instance: &Instance) -> ProxyResult<String> {
    resolve_credential(instance).map(|credential| credential.header_value())
}
