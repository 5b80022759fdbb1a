//! Masks secrets before request/response details reach log output. The Gemini
//! API key travels as a query parameter, so URLs need the same treatment as
//! bodies and headers.

use reqwest::Url;
use serde_json::Value;

const REDACTION: &str = "***REDACTED***";
const SENSITIVE_KEYS: [&str; 10] = [
    "key",
    "api_key",
    "apikey",
    "token",
    "access_token",
    "authorization",
    "secret",
    "password",
    "x-api-key",
    "x-goog-api-key",
];

pub fn redact_url(url: &Url) -> String {
    let mut redacted = url.clone();
    let pairs: Vec<(String, String)> = redacted
        .query_pairs()
        .map(|(k, v)| {
            if is_sensitive_key(k.as_ref()) {
                (k.into_owned(), REDACTION.to_string())
            } else {
                (k.into_owned(), v.into_owned())
            }
        })
        .collect();

    redacted.set_query(None);
    if !pairs.is_empty() {
        let mut qp = redacted.query_pairs_mut();
        for (k, v) in pairs {
            qp.append_pair(&k, &v);
        }
    }

    redacted.as_str().to_string()
}

pub fn redact_text_body(raw: &str) -> String {
    match serde_json::from_str::<Value>(raw) {
        Ok(mut json) => {
            redact_json_value(&mut json);
            serde_json::to_string(&json).unwrap_or_else(|_| raw.to_string())
        }
        Err(_) => raw.to_string(),
    }
}

pub fn truncate_for_log(input: &str, max_chars: usize) -> String {
    let count = input.chars().count();
    if count <= max_chars {
        return input.to_string();
    }

    let truncated = input.chars().take(max_chars).collect::<String>();
    format!("{truncated}... <truncated {} chars>", count - max_chars)
}

fn redact_json_value(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, item) in map {
                if is_sensitive_key(key) {
                    *item = Value::String(REDACTION.to_string());
                } else {
                    redact_json_value(item);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                redact_json_value(item);
            }
        }
        _ => {}
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    SENSITIVE_KEYS.iter().any(|s| *s == key)
}
