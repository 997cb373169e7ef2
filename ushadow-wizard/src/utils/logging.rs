// Logging utilities
// Structured logging with JSON and human-readable formats, plus secret masking for
// tokens and provider API keys.

use log::Level;
use serde_json::{json, Value};

/// Mask a secret, keeping the first and last four characters of long values.
pub fn mask_sensitive(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    if chars.len() <= 8 {
        return "***".to_string();
    }
    let start: String = chars[..4].iter().collect();
    let end: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", start, end)
}

/// Mask a provider API key the way the dashboard shows it: `***` plus the last four.
pub fn mask_api_key(key: &str) -> String {
    let key = key.trim();
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 4 {
        return "***".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("***{}", tail)
}

/// Mask an `Authorization` header value. The scheme stays visible.
pub fn mask_bearer(header: &str) -> String {
    match header.split_once(' ') {
        Some((scheme, token)) => format!("{} {}", scheme, mask_sensitive(token.trim())),
        None => mask_sensitive(header),
    }
}

/// Hide the password part of a URL's userinfo. Unparsable input is returned unchanged.
pub fn mask_url_credentials(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) if parsed.password().is_some() => {
            if parsed.set_password(Some("***")).is_err() {
                return "***".to_string();
            }
            parsed.to_string()
        }
        _ => raw.to_string(),
    }
}

fn is_secret_key(key: &str) -> bool {
    let k = key.to_ascii_lowercase();
    k.contains("api_key")
        || k.contains("apikey")
        || k.contains("token")
        || k.contains("secret")
        || k.contains("password")
}

/// Recursively mask string values whose key looks like a credential
/// (`openai_api_key`, `hf_token`, `auth.secret_key`, ...). Used before printing config.
pub fn mask_secrets_in_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let masked = match v {
                        Value::String(s) if is_secret_key(k) && !s.is_empty() => {
                            Value::String(mask_api_key(s))
                        }
                        other => mask_secrets_in_json(other),
                    };
                    (k.clone(), masked)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(mask_secrets_in_json).collect()),
        other => other.clone(),
    }
}

/// Parse phase and step from log message
/// Extracts [PHASE: ...] and [STEP: ...] patterns
pub fn parse_log_metadata(message: &str) -> (Option<String>, Option<String>, String) {
    let (phase, rest) = extract_tag(message, "[PHASE:");
    let (step, rest) = extract_tag(&rest, "[STEP:");
    (phase, step, rest)
}

fn extract_tag(message: &str, tag: &str) -> (Option<String>, String) {
    let Some(start) = message.find(tag) else {
        return (None, message.to_string());
    };
    let Some(len) = message[start..].find(']') else {
        return (None, message.to_string());
    };
    let value = message[start + tag.len()..start + len].trim().to_string();
    let cleaned = format!("{} {}", &message[..start], &message[start + len + 1..])
        .trim()
        .to_string();
    (Some(value), cleaned)
}

/// Format log entry as JSON for structured logging
pub fn format_json_log(
    timestamp: &str,
    level: Level,
    target: &str,
    message: &str,
    phase: Option<&str>,
    step: Option<&str>,
) -> String {
    let mut log_entry = json!({
        "timestamp": timestamp,
        "level": level.as_str(),
        "target": target,
        "message": message,
    });
    if let Some(phase) = phase {
        log_entry["phase"] = json!(phase);
    }
    if let Some(step) = step {
        log_entry["step"] = json!(step);
    }
    serde_json::to_string(&log_entry).unwrap_or_else(|_| "{}".to_string())
}

/// Format log entry as human-readable text
pub fn format_human_readable_log(
    timestamp: &str,
    level: Level,
    target: &str,
    message: &str,
    phase: Option<&str>,
    step: Option<&str>,
) -> String {
    let mut log_line = format!("[{}] [{}]", timestamp, level.as_str());
    if let Some(phase) = phase {
        log_line.push_str(&format!(" [PHASE: {}]", phase));
    }
    if let Some(step) = step {
        log_line.push_str(&format!(" [STEP: {}]", step));
    }
    log_line.push_str(&format!(" [{}] {}", target, message));
    log_line
}
