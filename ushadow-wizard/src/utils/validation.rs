// Input validation utilities
//
// Wizard-step validators return `Err(String)` with the inline message to show; the flow
// keeps the user on the step until it passes.

use anyhow::Result;
use regex::Regex;

/// Validate a service/container name before it is interpolated into a request path.
pub fn validate_service_name(name: &str) -> Result<()> {
    let s = name.trim();
    if s.is_empty() {
        return Err(anyhow::anyhow!("Service name is required"));
    }
    if s.len() > 128 {
        return Err(anyhow::anyhow!("Service name cannot exceed 128 characters"));
    }
    let name_re = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*$").map_err(|e| {
        anyhow::anyhow!("Internal error: failed to compile service name regex: {}", e)
    })?;
    if !name_re.is_match(s) || s.contains("..") {
        return Err(anyhow::anyhow!(
            "Service name contains invalid characters: '{}'",
            s
        ));
    }
    Ok(())
}

pub fn validate_required(label: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{} is required", label))
    } else {
        Ok(())
    }
}

/// At least one of the candidate fields must be filled in.
pub fn validate_any_required(label: &str, values: &[&str]) -> Result<(), String> {
    if values.iter().any(|v| !v.trim().is_empty()) {
        Ok(())
    } else {
        Err(format!("{} is required", label))
    }
}

/// A key the backend returned masked (`***1234`) must not be sent back as a new value.
pub fn is_masked_value(value: &str) -> bool {
    value.trim_start().starts_with("***")
}

/// Quickstart API keys step: one LLM provider and one transcription provider.
pub fn validate_provider_keys(llm: &[&str], transcription: &[&str]) -> Result<(), String> {
    validate_any_required("An LLM API key (OpenAI or Anthropic)", llm)?;
    validate_any_required(
        "A transcription API key (Deepgram or Mistral)",
        transcription,
    )
}

/// HuggingFace access token for speaker recognition models.
pub fn validate_hf_token(token: &str) -> Result<(), String> {
    validate_required("HuggingFace token", token)?;
    if !token.trim().starts_with("hf_") && !is_masked_value(token) {
        return Err("HuggingFace tokens start with 'hf_'".to_string());
    }
    Ok(())
}
