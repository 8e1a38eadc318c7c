use crate::constants::dhis2::{API_PREFIX, API_SEGMENT};
use crate::constants::protocols::ALLOWED_HTTP;
use crate::errors::{ProxyError, ProxyResult};
use serde_json::{Map, Value};
use url::Url;

/// `organisationUnits`, `/organisationUnits` and `api/organisationUnits` all
/// become `api/organisationUnits`. Applying it twice changes nothing.
pub fn normalize_api_path(path: &str) -> String {
    let stripped = path.strip_prefix('/').unwrap_or(path);
    if stripped.starts_with(API_PREFIX) || stripped.contains(API_SEGMENT) {
        stripped.to_string()
    } else {
        format!("{}{}", API_PREFIX, stripped)
    }
}

pub fn normalize_base_url(base: &str) -> &str {
    base.strip_suffix('/').unwrap_or(base)
}

/// Flattens a JSON query object into ordered pairs. Arrays repeat the key,
/// which is how DHIS2 takes multiple `filter` parameters; nulls are skipped.
pub fn query_pairs(query: &Map<String, Value>) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (key, value) in query {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                for item in items.iter().filter(|item| !item.is_null()) {
                    pairs.push((key.clone(), scalar_to_string(item)));
                }
            }
            other => pairs.push((key.clone(), scalar_to_string(other))),
        }
    }
    pairs
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

pub fn build_url(base: &str, path: &str, query: &[(String, String)]) -> ProxyResult<Url> {
    let joined = format!("{}/{}", normalize_base_url(base), normalize_api_path(path));
    let mut url = Url::parse(&joined)
        .map_err(|err| ProxyError::InvalidUrl(format!("{} ({})", joined, err)))?;
    if !ALLOWED_HTTP.contains(&url.scheme()) {
        return Err(ProxyError::InvalidUrl(format!(
            "{} (only http and https are supported)",
            base
        )));
    }
    if !query.is_empty() {
        url.query_pairs_mut()
            .extend_pairs(query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }
    Ok(url)
}
