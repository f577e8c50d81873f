//! crates/studio_core/src/validation.rs
//!
//! Local, pre-network input rules. A request that fails here is never sent.

use std::ops::RangeInclusive;
use std::sync::OnceLock;

use regex::Regex;
use uuid::Uuid;

use crate::domain::{
    ContentType, EditRequest, EditType, FileUpload, GenerationParams, GenerationRequest,
};

pub const MIN_BRIEF_CHARS: usize = 20;
pub const MAX_BRIEF_CHARS: usize = 5000;
pub const MAX_TITLE_CHARS: usize = 500;
pub const MAX_INSTRUCTIONS_CHARS: usize = 2000;
pub const MAX_EDIT_PROMPT_CHARS: usize = 2000;
pub const MAX_STYLE_NAME_CHARS: usize = 255;
pub const MAX_STYLE_TAGS: usize = 20;

pub const MAX_TOKENS_RANGE: RangeInclusive<u32> = 100..=8000;
pub const DEFAULT_MAX_TOKENS: u32 = 2000;
pub const TEMPERATURE_RANGE: RangeInclusive<f32> = 0.0..=2.0;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const TARGET_LENGTH_RANGE: RangeInclusive<u32> = 100..=5000;

/// 50 MiB.
pub const MAX_UPLOAD_BYTES: u64 = 52_428_800;
pub const ALLOWED_UPLOAD_TYPES: &[&str] = &[
    "text/plain",
    "text/markdown",
    "application/pdf",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

/// Titles derived from a brief are cut to this many characters.
const DERIVED_TITLE_CHARS: usize = 60;

/// A field-scoped input error, shown next to the offending input.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

pub type ValidationResult<T> = Result<T, ValidationError>;

fn email_pattern() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern compiles")
    })
}

pub fn validate_credentials(email: &str, password: &str) -> ValidationResult<()> {
    if !email_pattern().is_match(email.trim()) {
        return Err(ValidationError::new("email", "Enter a valid email address"));
    }
    if password.is_empty() {
        return Err(ValidationError::new("password", "Password is required"));
    }
    Ok(())
}

/// Returns the trimmed brief.
pub fn validate_brief(brief: &str) -> ValidationResult<String> {
    let brief = brief.trim();
    let len = brief.chars().count();
    if len == 0 {
        return Err(ValidationError::new("brief", "Brief cannot be empty"));
    }
    if len < MIN_BRIEF_CHARS {
        return Err(ValidationError::new(
            "brief",
            format!("Brief must be at least {MIN_BRIEF_CHARS} characters"),
        ));
    }
    if len > MAX_BRIEF_CHARS {
        return Err(ValidationError::new(
            "brief",
            format!("Brief must be at most {MAX_BRIEF_CHARS} characters"),
        ));
    }
    Ok(brief.to_string())
}

/// Uses the explicit title when given, otherwise derives one from the brief.
pub fn resolve_title(title: Option<&str>, brief: &str) -> ValidationResult<String> {
    match title.map(str::trim).filter(|t| !t.is_empty()) {
        Some(title) if title.chars().count() > MAX_TITLE_CHARS => Err(ValidationError::new(
            "title",
            format!("Title must be at most {MAX_TITLE_CHARS} characters"),
        )),
        Some(title) => Ok(title.to_string()),
        None => Ok(derive_title(brief)),
    }
}

fn derive_title(brief: &str) -> String {
    let first_line = brief.lines().next().unwrap_or_default().trim();
    if first_line.chars().count() <= DERIVED_TITLE_CHARS {
        return first_line.to_string();
    }
    let cut: String = first_line.chars().take(DERIVED_TITLE_CHARS).collect();
    match cut.rfind(' ') {
        Some(idx) if idx > 0 => cut[..idx].to_string(),
        _ => cut,
    }
}

/// Numeric parameters after defaults have been applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub target_length: Option<u32>,
}

pub fn resolve_params(params: &GenerationParams) -> ValidationResult<ResolvedParams> {
    let max_tokens = params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
    if !MAX_TOKENS_RANGE.contains(&max_tokens) {
        return Err(ValidationError::new(
            "max_tokens",
            format!(
                "Maximum length must be between {} and {}",
                MAX_TOKENS_RANGE.start(),
                MAX_TOKENS_RANGE.end()
            ),
        ));
    }
    let temperature = params.temperature.unwrap_or(DEFAULT_TEMPERATURE);
    if !TEMPERATURE_RANGE.contains(&temperature) {
        return Err(ValidationError::new(
            "temperature",
            format!(
                "Creativity must be between {} and {}",
                TEMPERATURE_RANGE.start(),
                TEMPERATURE_RANGE.end()
            ),
        ));
    }
    if let Some(target) = params.target_length {
        if !TARGET_LENGTH_RANGE.contains(&target) {
            return Err(ValidationError::new(
                "target_length",
                format!(
                    "Target length must be between {} and {} words",
                    TARGET_LENGTH_RANGE.start(),
                    TARGET_LENGTH_RANGE.end()
                ),
            ));
        }
    }
    Ok(ResolvedParams {
        max_tokens,
        temperature,
        target_length: params.target_length,
    })
}

/// Everything a generation submission consists of, before validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationInput<'a> {
    pub title: Option<&'a str>,
    pub brief: &'a str,
    pub style_id: Option<Uuid>,
    pub content_type: ContentType,
    pub params: GenerationParams,
    pub additional_instructions: Option<&'a str>,
}

/// Validates a generation submission. Checks run brief first, then style,
/// so the most visible problem is reported.
pub fn build_generation_request(input: &GenerationInput<'_>) -> ValidationResult<GenerationRequest> {
    let brief = validate_brief(input.brief)?;
    let style_id = input
        .style_id
        .ok_or_else(|| ValidationError::new("style", "Select a style profile"))?;
    let params = resolve_params(&input.params)?;
    let title = resolve_title(input.title, &brief)?;
    let additional_instructions = match input.additional_instructions.map(str::trim) {
        Some(text) if text.chars().count() > MAX_INSTRUCTIONS_CHARS => {
            return Err(ValidationError::new(
                "additional_instructions",
                format!("Instructions must be at most {MAX_INSTRUCTIONS_CHARS} characters"),
            ))
        }
        Some(text) if !text.is_empty() => Some(text.to_string()),
        _ => None,
    };

    Ok(GenerationRequest {
        title,
        brief,
        style_id,
        content_type: input.content_type,
        max_tokens: params.max_tokens,
        temperature: params.temperature,
        target_length: params.target_length,
        additional_instructions,
        idempotency_key: None,
    })
}

pub fn build_edit_request(prompt: &str, edit_type: EditType) -> ValidationResult<EditRequest> {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return Err(ValidationError::new("edit_prompt", "Edit prompt cannot be empty"));
    }
    if prompt.chars().count() > MAX_EDIT_PROMPT_CHARS {
        return Err(ValidationError::new(
            "edit_prompt",
            format!("Edit prompt must be at most {MAX_EDIT_PROMPT_CHARS} characters"),
        ));
    }
    Ok(EditRequest {
        prompt: prompt.to_string(),
        edit_type,
        idempotency_key: None,
    })
}

/// Returns the trimmed style name.
pub fn validate_style_name(name: &str) -> ValidationResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::new("name", "Style name cannot be empty"));
    }
    if name.chars().count() > MAX_STYLE_NAME_CHARS {
        return Err(ValidationError::new(
            "name",
            format!("Style name must be at most {MAX_STYLE_NAME_CHARS} characters"),
        ));
    }
    Ok(name.to_string())
}

pub fn validate_tags(tags: &[String]) -> ValidationResult<()> {
    if tags.len() > MAX_STYLE_TAGS {
        return Err(ValidationError::new(
            "tags",
            format!("Maximum {MAX_STYLE_TAGS} tags allowed"),
        ));
    }
    Ok(())
}

pub fn validate_upload(file: &FileUpload) -> ValidationResult<()> {
    if file.bytes.is_empty() {
        return Err(ValidationError::new(
            "file",
            format!("{} is empty", file.filename),
        ));
    }
    if file.size() > MAX_UPLOAD_BYTES {
        return Err(ValidationError::new(
            "file",
            format!("{} exceeds the 50 MB upload limit", file.filename),
        ));
    }
    if !ALLOWED_UPLOAD_TYPES.contains(&file.mime_type.as_str()) {
        return Err(ValidationError::new(
            "file",
            format!("{} has unsupported type {}", file.filename, file.mime_type),
        ));
    }
    Ok(())
}
