use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One DHIS2 deployment registered by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub owner_user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Instance {
    pub fn api_token(&self) -> Option<&str> {
        non_empty(self.api_token.as_deref())
    }

    /// Username and password, only when both are set.
    pub fn basic_credentials(&self) -> Option<(&str, &str)> {
        match (
            non_empty(self.username.as_deref()),
            non_empty(self.password.as_deref()),
        ) {
            (Some(user), Some(pass)) => Some((user, pass)),
            _ => None,
        }
    }

    pub fn has_usable_credentials(&self) -> bool {
        self.api_token().is_some() || self.basic_credentials().is_some()
    }

    pub fn view(&self) -> InstanceView {
        InstanceView {
            id: self.id.clone(),
            name: self.name.clone(),
            url: self.url.clone(),
            description: self.description.clone(),
            verified: self.verified,
            has_api_token: self.api_token().is_some(),
            has_credentials: self.basic_credentials().is_some(),
            details: self.details.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Fields accepted when registering an instance; the store assigns id and timestamps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewInstance {
    pub name: String,
    pub url: String,
    #[serde(default, alias = "api_token")]
    pub api_token: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub details: Option<Value>,
    #[serde(default, alias = "owner_user_id")]
    pub owner_user_id: String,
}

impl NewInstance {
    pub fn into_instance(self, id: String, now: DateTime<Utc>) -> Instance {
        Instance {
            id,
            name: self.name,
            url: self.url,
            api_token: self.api_token,
            username: self.username,
            password: self.password,
            description: self.description,
            verified: self.verified,
            details: self.details,
            owner_user_id: self.owner_user_id,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update. `None` keeps the stored value; an empty string clears an
/// optional text field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstancePatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, alias = "api_token")]
    pub api_token: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub verified: Option<bool>,
    #[serde(default)]
    pub details: Option<Value>,
}

impl InstancePatch {
    /// True when the change can invalidate a previous verification.
    pub fn touches_connection(&self) -> bool {
        self.url.is_some()
            || self.api_token.is_some()
            || self.username.is_some()
            || self.password.is_some()
    }

    pub fn apply(self, instance: &mut Instance, now: DateTime<Utc>) {
        if let Some(name) = self.name {
            instance.name = name;
        }
        if let Some(url) = self.url {
            instance.url = url;
        }
        apply_optional(&mut instance.api_token, self.api_token);
        apply_optional(&mut instance.username, self.username);
        apply_optional(&mut instance.password, self.password);
        apply_optional(&mut instance.description, self.description);
        if let Some(verified) = self.verified {
            instance.verified = verified;
        }
        if let Some(details) = self.details {
            instance.details = if details.is_null() {
                None
            } else {
                Some(details)
            };
        }
        instance.updated_at = now;
    }
}

/// Secret-free projection handed to agents and management callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceView {
    pub id: String,
    pub name: String,
    pub url: String,
    pub description: Option<String>,
    pub verified: bool,
    pub has_api_token: bool,
    pub has_credentials: bool,
    pub details: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn apply_optional(target: &mut Option<String>, incoming: Option<String>) {
    match incoming {
        None => {}
        Some(value) if value.is_empty() => *target = None,
        Some(value) => *target = Some(value),
    }
}
