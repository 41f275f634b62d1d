//! Header and body customization
//!
//! Precedence, lowest first: computed defaults, provider rules from config,
//! caller-supplied extras.

use converse_config::{BodyRuleConfig, HeaderRuleConfig, ProviderConfig};
use indexmap::IndexMap;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};

use crate::error::LlmError;

/// Headers every vendor request carries
pub fn default_headers(api_key: Option<&SecretString>) -> Result<HeaderMap, LlmError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));

    if let Some(key) = api_key {
        headers.insert(AUTHORIZATION, secret_header(&format!("Bearer {}", key.expose_secret()))?);
    }

    Ok(headers)
}

/// Header value from secret material, marked sensitive
pub fn secret_header(value: &str) -> Result<HeaderValue, LlmError> {
    let mut value =
        HeaderValue::from_str(value).map_err(|_| LlmError::InvalidRequest("API key is not a valid header value".to_owned()))?;
    value.set_sensitive(true);
    Ok(value)
}

/// Apply provider header rules, then caller headers
pub fn apply_header_overrides(headers: &mut HeaderMap, provider: &ProviderConfig, extra: &IndexMap<String, String>) {
    for rule in &provider.headers {
        match rule {
            HeaderRuleConfig::Insert(insert) => insert_header(headers, &provider.id, &insert.name, &insert.value),
            HeaderRuleConfig::Remove(remove) => match HeaderName::try_from(remove.name.as_str()) {
                Ok(name) => {
                    headers.remove(name);
                }
                Err(_) => tracing::warn!(provider = %provider.id, header = %remove.name, "skipping invalid header rule"),
            },
        }
    }

    for (name, value) in extra {
        insert_header(headers, &provider.id, name, value);
    }
}

fn insert_header(headers: &mut HeaderMap, provider: &str, name: &str, value: &str) {
    match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
        (Ok(name), Ok(value)) => {
            headers.insert(name, value);
        }
        _ => tracing::warn!(provider = %provider, header = %name, "skipping invalid header"),
    }
}

/// Apply provider body rules, then caller body fields
pub fn apply_body_overrides(body: &mut Value, provider: &ProviderConfig, extra: &IndexMap<String, String>) {
    for rule in &provider.body {
        match rule {
            BodyRuleConfig::Set(set) => set_path(body, &set.key, set.value.clone()),
            BodyRuleConfig::Remove(remove) => remove_path(body, &remove.key),
        }
    }

    for (key, raw) in extra {
        set_path(body, key, coerce_body_value(raw));
    }
}

/// Interpret a raw string as the JSON value it most likely denotes
///
/// Booleans, `null`, numbers, objects and arrays are recognized; anything
/// else stays a string.
pub fn coerce_body_value(raw: &str) -> Value {
    let trimmed = raw.trim();

    match trimmed {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" => return Value::Null,
        _ => {}
    }

    if let Ok(int) = trimmed.parse::<i64>() {
        return Value::from(int);
    }

    if let Ok(float) = trimmed.parse::<f64>()
        && float.is_finite()
    {
        return Value::from(float);
    }

    if (trimmed.starts_with('{') || trimmed.starts_with('['))
        && let Ok(value) = serde_json::from_str::<Value>(trimmed)
    {
        return value;
    }

    Value::String(raw.to_owned())
}

/// Set a dotted path, replacing non-object intermediates
fn set_path(body: &mut Value, path: &str, value: Value) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let Some(last) = segments.pop() else { return };

    let mut current = body;
    for segment in segments {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else { return };
        current = map.entry(segment).or_insert_with(|| Value::Object(Map::new()));
    }

    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    if let Value::Object(map) = current {
        map.insert(last.to_owned(), value);
    }
}

fn remove_path(body: &mut Value, path: &str) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let Some(last) = segments.pop() else { return };

    let mut current = body;
    for segment in segments {
        match current.get_mut(segment) {
            Some(next) => current = next,
            None => return,
        }
    }

    if let Value::Object(map) = current {
        map.remove(last);
    }
}
