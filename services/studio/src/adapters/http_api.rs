//! services/studio/src/adapters/http_api.rs
//!
//! This module contains the HTTP adapter, the concrete implementation of the
//! `StudioApi` port from the `core` crate. It talks JSON to the backend's
//! `/api/v1` REST surface using `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use studio_core::domain::{
    AuthTokens, ContentIteration, ContentSearchParams, ContentStatus, ContentType, ContentUpdate,
    DailyUsage, EditRequest, EditType, FileUpload, GeneratedContent, GenerationRequest,
    NewStyleProfile, Organization, OrganizationSettings, Page, ReferenceArticle, StyleAnalysis,
    StyleProfile, StyleProfileUpdate, StyleSearchParams, UploadedFile, UsageLimits, UsageQuery,
    UsageStats, User, UserProfile, UserUpdate,
};
use studio_core::ports::{PortError, PortResult, StudioApi};
use tracing::{debug, warn};
use uuid::Uuid;

const API_PREFIX: &str = "/api/v1";
const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// Per-call-class request bounds.
#[derive(Debug, Clone, Copy)]
pub struct HttpTimeouts {
    /// Metadata reads and cheap mutations.
    pub request: Duration,
    /// Generation, edit and analysis calls.
    pub generation: Duration,
    pub upload: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(10),
            generation: Duration::from_secs(30),
            upload: Duration::from_secs(60),
        }
    }
}

/// An adapter that implements the `StudioApi` port over HTTP.
#[derive(Clone)]
pub struct HttpApiAdapter {
    client: Client,
    base_url: String,
    timeouts: HttpTimeouts,
}

impl HttpApiAdapter {
    /// Creates a new `HttpApiAdapter` for the backend at `base_url`.
    pub fn new(base_url: &str, timeouts: HttpTimeouts) -> PortResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("studio/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PortError::Unexpected(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeouts,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, API_PREFIX, path)
    }

    fn org_url(&self, org: Uuid, path: &str) -> String {
        self.url(&format!("/organizations/{}{}", org, path))
    }

    fn get(&self, token: &str, url: String) -> RequestBuilder {
        self.client
            .get(url)
            .bearer_auth(token)
            .timeout(self.timeouts.request)
    }

    fn post(&self, token: &str, url: String) -> RequestBuilder {
        self.client
            .post(url)
            .bearer_auth(token)
            .timeout(self.timeouts.request)
    }

    fn put(&self, token: &str, url: String) -> RequestBuilder {
        self.client
            .put(url)
            .bearer_auth(token)
            .timeout(self.timeouts.request)
    }

    fn delete(&self, token: &str, url: String) -> RequestBuilder {
        self.client
            .delete(url)
            .bearer_auth(token)
            .timeout(self.timeouts.request)
    }

    /// Sends the request and decodes a JSON body.
    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> PortResult<T> {
        let response = send(request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| PortError::Unexpected(format!("malformed response body: {}", e)))
    }

    /// Sends the request and discards the body.
    async fn send_empty(&self, request: RequestBuilder) -> PortResult<()> {
        send(request).await.map(|_| ())
    }
}

async fn send(request: RequestBuilder) -> PortResult<Response> {
    let response = request.send().await.map_err(transport_error)?;
    let status = response.status();
    debug!(%status, url = %response.url(), "API response");
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, &body))
}

fn transport_error(e: reqwest::Error) -> PortError {
    if e.is_timeout() {
        PortError::Network("request timed out".to_string())
    } else {
        PortError::Network(e.to_string())
    }
}

/// Extracts a human-readable message from an error body. The backend
/// answers `{"detail": "..."}` (or a list of validation problems).
fn error_detail(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(map)) => match map.get("detail") {
            Some(serde_json::Value::String(detail)) => detail.clone(),
            Some(other) => other.to_string(),
            None => body.to_string(),
        },
        _ => body.trim().to_string(),
    }
}

fn status_error(status: StatusCode, body: &str) -> PortError {
    let message = error_detail(body);
    let code = status.as_u16();
    match code {
        401 => PortError::Unauthorized,
        403 => PortError::Forbidden(message),
        404 => PortError::NotFound(message),
        402 | 429 => PortError::QuotaExceeded(message),
        400 if mentions_quota(&message) => PortError::QuotaExceeded(message),
        400..=499 => PortError::Rejected { status: code, message },
        500..=599 => PortError::Server { status: code, message },
        _ => PortError::Unexpected(format!("unexpected status {}: {}", code, message)),
    }
}

fn mentions_quota(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("limit exceeded") || lower.contains("quota")
}

//=========================================================================================
// Request Bodies
//=========================================================================================

#[derive(Serialize)]
struct LoginBody<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshBody<'a> {
    refresh_token: &'a str,
}

#[derive(Serialize)]
struct UserUpdateBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    first_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    avatar_url: Option<&'a str>,
}

#[derive(Serialize)]
struct StyleCreateBody<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    tags: &'a [String],
}

#[derive(Serialize)]
struct StyleUpdateBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tags: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_active: Option<bool>,
}

#[derive(Serialize)]
struct AnalyzeBody {
    style_profile_id: Uuid,
    force_reanalysis: bool,
    include_metadata: bool,
}

#[derive(Serialize)]
struct GenerateBody<'a> {
    title: &'a str,
    brief: &'a str,
    content_type: &'static str,
    style_profile_id: Uuid,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_length: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    additional_instructions: Option<&'a str>,
}

#[derive(Serialize)]
struct EditBody<'a> {
    edit_prompt: &'a str,
    edit_type: &'static str,
}

#[derive(Serialize)]
struct ContentUpdateBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    brief: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_archived: Option<bool>,
}

//=========================================================================================
// "Impure" Wire Record Structs
//=========================================================================================

#[derive(Deserialize)]
struct TokenRecord {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
}
impl TokenRecord {
    fn to_domain(self) -> PortResult<AuthTokens> {
        let expires_at = chrono::Duration::try_seconds(self.expires_in)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .ok_or_else(|| {
                PortError::Unexpected(format!("token lifetime out of range: {}s", self.expires_in))
            })?;
        Ok(AuthTokens {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
        })
    }
}

#[derive(Deserialize)]
struct UserRecord {
    id: Uuid,
    email: String,
    username: String,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    is_verified: bool,
    #[serde(default, alias = "language")]
    locale: Option<String>,
    #[serde(default)]
    timezone: Option<String>,
    #[serde(default)]
    organizations: Vec<OrganizationRecord>,
}
impl UserRecord {
    fn into_profile(self) -> UserProfile {
        let organizations = self
            .organizations
            .into_iter()
            .map(OrganizationRecord::to_domain)
            .collect();
        let display_name = match (self.first_name, self.last_name) {
            (Some(first), Some(last)) => Some(format!("{} {}", first, last)),
            (Some(name), None) | (None, Some(name)) => Some(name),
            (None, None) => None,
        };
        UserProfile {
            user: User {
                id: self.id,
                email: self.email,
                username: self.username,
                display_name,
                is_verified: self.is_verified,
                locale: self.locale,
                timezone: self.timezone,
            },
            organizations,
        }
    }
}

#[derive(Deserialize, Default)]
struct OrganizationSettingsRecord {
    #[serde(default)]
    default_style_id: Option<Uuid>,
    #[serde(default)]
    monthly_token_quota: Option<u64>,
}

#[derive(Deserialize)]
struct OrganizationRecord {
    id: Uuid,
    name: String,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default)]
    settings: Option<OrganizationSettingsRecord>,
}
impl OrganizationRecord {
    fn to_domain(self) -> Organization {
        let settings = self.settings.unwrap_or_default();
        let slug = self
            .slug
            .unwrap_or_else(|| self.name.to_lowercase().replace(' ', "-"));
        Organization {
            id: self.id,
            name: self.name,
            slug,
            settings: OrganizationSettings {
                default_style_id: settings.default_style_id,
                monthly_token_quota: settings.monthly_token_quota,
            },
        }
    }
}

#[derive(Deserialize, Default)]
struct AnalysisRecord {
    #[serde(default)]
    tone: Option<String>,
    #[serde(default)]
    voice: Option<String>,
    #[serde(default)]
    structure: Vec<String>,
    #[serde(default)]
    vocabulary: Vec<String>,
    #[serde(default)]
    key_phrases: Vec<String>,
    #[serde(default)]
    confidence_score: Option<f64>,
    #[serde(default)]
    analysis_timestamp: Option<DateTime<Utc>>,
}
impl AnalysisRecord {
    /// The backend reports "not analyzed" as an empty object, so an
    /// analysis only exists once it carries a confidence score.
    fn to_domain(self) -> Option<StyleAnalysis> {
        let confidence = self.confidence_score?;
        Some(StyleAnalysis {
            tone: self.tone,
            voice: self.voice,
            structure: self.structure,
            vocabulary: self.vocabulary,
            key_phrases: self.key_phrases,
            confidence: confidence.clamp(0.0, 1.0),
            analyzed_at: self.analysis_timestamp,
        })
    }
}

#[derive(Deserialize)]
struct ReferenceRecord {
    id: Uuid,
    style_profile_id: Uuid,
    title: String,
    #[serde(default)]
    s3_key: Option<String>,
    #[serde(default)]
    file_size: Option<serde_json::Value>,
    #[serde(default)]
    mime_type: Option<String>,
    created_at: DateTime<Utc>,
}
impl ReferenceRecord {
    fn to_domain(self) -> ReferenceArticle {
        ReferenceArticle {
            id: self.id,
            style_id: self.style_profile_id,
            title: self.title,
            file_key: self.s3_key,
            size_bytes: self.file_size.as_ref().and_then(size_value).unwrap_or(0),
            mime_type: self.mime_type,
            created_at: self.created_at,
        }
    }
}

/// Sizes arrive either as numbers or as numeric strings.
fn size_value(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[derive(Deserialize)]
struct StyleRecord {
    id: Uuid,
    organization_id: Uuid,
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default = "default_true")]
    is_active: bool,
    #[serde(default)]
    reference_count: u32,
    #[serde(default)]
    reference_articles: Vec<ReferenceRecord>,
    #[serde(default)]
    analysis: Option<AnalysisRecord>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl StyleRecord {
    fn to_domain(self) -> StyleProfile {
        StyleProfile {
            id: self.id,
            organization_id: self.organization_id,
            name: self.name,
            description: self.description,
            tags: self.tags,
            is_active: self.is_active,
            reference_count: self.reference_count,
            references: self
                .reference_articles
                .into_iter()
                .map(ReferenceRecord::to_domain)
                .collect(),
            analysis: self.analysis.and_then(AnalysisRecord::to_domain),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
struct StyleListRecord {
    style_profiles: Vec<StyleRecord>,
    total: u64,
    page: u32,
    per_page: u32,
    has_next: bool,
    has_prev: bool,
}

#[derive(Deserialize)]
struct AnalysisResultRecord {
    analysis_data: AnalysisRecord,
    #[serde(default)]
    confidence_score: Option<f64>,
    #[serde(default)]
    analysis_timestamp: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct AnalysisResponseRecord {
    success: bool,
    #[serde(default)]
    analysis_result: Option<AnalysisResultRecord>,
    #[serde(default)]
    message: String,
}
impl AnalysisResponseRecord {
    fn to_domain(self) -> Option<StyleAnalysis> {
        if !self.success {
            debug!(message = %self.message, "style analysis not available");
            return None;
        }
        let result = self.analysis_result?;
        let mut data = result.analysis_data;
        // The outer score wins: it is what the backend computed for this run.
        data.confidence_score = result.confidence_score.or(data.confidence_score);
        data.analysis_timestamp = result.analysis_timestamp.or(data.analysis_timestamp);
        data.to_domain()
    }
}

#[derive(Deserialize)]
struct ReferenceListRecord {
    reference_articles: Vec<ReferenceRecord>,
}

#[derive(Deserialize)]
struct UploadRecord {
    success: bool,
    #[serde(default)]
    file_id: Option<Uuid>,
    filename: String,
    file_size: u64,
    mime_type: String,
    #[serde(default)]
    s3_key: Option<String>,
    #[serde(default)]
    message: String,
}
impl UploadRecord {
    fn to_domain(self) -> PortResult<UploadedFile> {
        if !self.success {
            return Err(PortError::Rejected {
                status: 400,
                message: self.message,
            });
        }
        Ok(UploadedFile {
            file_id: self.file_id,
            filename: self.filename,
            file_key: self.s3_key,
            size_bytes: self.file_size,
            mime_type: self.mime_type,
        })
    }
}

#[derive(Deserialize)]
struct ContentRecord {
    id: Uuid,
    organization_id: Uuid,
    title: String,
    #[serde(default)]
    generated_text: String,
    #[serde(default)]
    brief: Option<String>,
    #[serde(default)]
    style_profile_id: Option<Uuid>,
    #[serde(default)]
    content_type: Option<String>,
    status: String,
    #[serde(default = "first_version")]
    version: u32,
    #[serde(default)]
    total_tokens: u64,
    #[serde(default)]
    estimated_cost: f64,
    #[serde(default)]
    is_archived: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl ContentRecord {
    fn to_domain(self) -> GeneratedContent {
        GeneratedContent {
            id: self.id,
            organization_id: self.organization_id,
            title: self.title,
            body: self.generated_text,
            brief: self.brief,
            style_id: self.style_profile_id,
            content_type: self
                .content_type
                .as_deref()
                .and_then(ContentType::parse)
                .unwrap_or_default(),
            status: parse_status(&self.status, self.version),
            token_count: self.total_tokens,
            cost: self.estimated_cost,
            is_archived: self.is_archived,
            iterations: Vec::new(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

fn first_version() -> u32 {
    1
}

/// The backend tracks processing state (`pending`/`completed`/...) plus a
/// version counter; both map onto the client's lifecycle.
fn parse_status(status: &str, version: u32) -> ContentStatus {
    match status {
        "published" => ContentStatus::Published,
        "edited" => ContentStatus::Edited,
        "draft" | "pending" | "failed" | "cancelled" => ContentStatus::Draft,
        _ if version > 1 => ContentStatus::Edited,
        _ => ContentStatus::Generated,
    }
}

#[derive(Deserialize)]
struct ContentListRecord {
    content: Vec<ContentRecord>,
    total: u64,
    page: u32,
    per_page: u32,
    has_next: bool,
    has_prev: bool,
}

#[derive(Deserialize)]
struct IterationRecord {
    id: Uuid,
    #[serde(default)]
    generated_content_id: Option<Uuid>,
    iteration_number: u32,
    #[serde(default)]
    edit_prompt: Option<String>,
    #[serde(default)]
    edit_type: Option<String>,
    #[serde(default)]
    new_text: Option<String>,
    #[serde(default)]
    total_tokens: u64,
    #[serde(default)]
    estimated_cost: f64,
    created_at: DateTime<Utc>,
}
impl IterationRecord {
    fn to_domain(self, content_id: Uuid) -> ContentIteration {
        ContentIteration {
            id: self.id,
            content_id: self.generated_content_id.unwrap_or(content_id),
            iteration_number: self.iteration_number,
            snapshot: self.new_text,
            edit_prompt: self.edit_prompt,
            edit_type: self
                .edit_type
                .as_deref()
                .map(EditType::parse)
                .unwrap_or_default(),
            token_count: self.total_tokens,
            cost: self.estimated_cost,
            created_at: self.created_at,
        }
    }
}

#[derive(Deserialize, Default)]
struct PeriodRecord {
    #[serde(default)]
    start_date: Option<NaiveDate>,
    #[serde(default)]
    end_date: Option<NaiveDate>,
}

#[derive(Deserialize, Default)]
struct TotalUsageRecord {
    #[serde(default)]
    requests: u64,
    #[serde(default)]
    total_tokens: u64,
    #[serde(default)]
    total_cost: f64,
}

#[derive(Deserialize)]
struct DailyUsageRecord {
    date: NaiveDate,
    #[serde(default)]
    tokens: u64,
    #[serde(default)]
    cost: f64,
    #[serde(default)]
    requests: u64,
}

#[derive(Deserialize)]
struct UsageAnalyticsRecord {
    #[serde(default)]
    period: PeriodRecord,
    #[serde(default)]
    total_usage: TotalUsageRecord,
    #[serde(default)]
    daily_usage: Vec<DailyUsageRecord>,
}
impl UsageAnalyticsRecord {
    fn to_domain(self, organization_id: Uuid) -> UsageStats {
        UsageStats {
            organization_id,
            period_start: self.period.start_date,
            period_end: self.period.end_date,
            total_tokens: self.total_usage.total_tokens,
            total_cost: self.total_usage.total_cost,
            total_requests: self.total_usage.requests,
            daily: self
                .daily_usage
                .into_iter()
                .map(|d| DailyUsage {
                    date: d.date,
                    tokens: d.tokens,
                    cost: d.cost,
                    requests: d.requests,
                })
                .collect(),
        }
    }
}

#[derive(Deserialize, Default)]
struct TokenAmountRecord {
    #[serde(default)]
    tokens: u64,
}

#[derive(Deserialize, Default)]
struct CurrentUsageRecord {
    #[serde(default)]
    daily: TokenAmountRecord,
    #[serde(default)]
    monthly: TokenAmountRecord,
}

#[derive(Deserialize, Default)]
struct LimitStatusRecord {
    #[serde(default)]
    daily_limit_exceeded: bool,
    #[serde(default)]
    monthly_limit_exceeded: bool,
}

#[derive(Deserialize)]
struct UsageLimitsRecord {
    daily_limits: TokenAmountRecord,
    #[serde(default)]
    current_usage: CurrentUsageRecord,
    #[serde(default)]
    status: LimitStatusRecord,
}
impl UsageLimitsRecord {
    fn to_domain(self) -> UsageLimits {
        UsageLimits {
            daily_token_limit: self.daily_limits.tokens,
            tokens_used_today: self.current_usage.daily.tokens,
            // Plans are sized per day; a month is taken as 30 of them.
            monthly_token_limit: self.daily_limits.tokens.saturating_mul(30),
            tokens_used_this_month: self.current_usage.monthly.tokens,
            daily_limit_exceeded: self.status.daily_limit_exceeded,
            monthly_limit_exceeded: self.status.monthly_limit_exceeded,
        }
    }
}

//=========================================================================================
// `StudioApi` Trait Implementation
//=========================================================================================

#[async_trait]
impl StudioApi for HttpApiAdapter {
    async fn login(&self, email: &str, password: &str) -> PortResult<AuthTokens> {
        let request = self
            .client
            .post(self.url("/auth/login"))
            .timeout(self.timeouts.request)
            .json(&LoginBody { email, password });
        let record: TokenRecord = self.send_json(request).await?;
        record.to_domain()
    }

    async fn refresh(&self, refresh_token: &str) -> PortResult<AuthTokens> {
        let request = self
            .client
            .post(self.url("/auth/refresh"))
            .timeout(self.timeouts.request)
            .json(&RefreshBody { refresh_token });
        let record: TokenRecord = self.send_json(request).await?;
        record.to_domain()
    }

    async fn logout(&self, token: &str) -> PortResult<()> {
        self.send_empty(self.post(token, self.url("/auth/logout"))).await
    }

    async fn current_user(&self, token: &str) -> PortResult<UserProfile> {
        let record: UserRecord = self.send_json(self.get(token, self.url("/users/me"))).await?;
        Ok(record.into_profile())
    }

    async fn update_user(&self, token: &str, update: &UserUpdate) -> PortResult<User> {
        let body = UserUpdateBody {
            username: update.username.as_deref(),
            first_name: update.first_name.as_deref(),
            last_name: update.last_name.as_deref(),
            avatar_url: update.avatar_url.as_deref(),
        };
        let request = self.put(token, self.url("/users/me")).json(&body);
        let record: UserRecord = self.send_json(request).await?;
        Ok(record.into_profile().user)
    }

    async fn list_organizations(&self, token: &str) -> PortResult<Vec<Organization>> {
        let records: Vec<OrganizationRecord> =
            self.send_json(self.get(token, self.url("/organizations/"))).await?;
        Ok(records.into_iter().map(OrganizationRecord::to_domain).collect())
    }

    async fn list_styles(
        &self,
        token: &str,
        org: Uuid,
        params: &StyleSearchParams,
    ) -> PortResult<Page<StyleProfile>> {
        let request = self
            .get(token, self.org_url(org, "/styles/"))
            .query(&params.to_query_pairs());
        let record: StyleListRecord = self.send_json(request).await?;
        Ok(Page {
            items: record.style_profiles.into_iter().map(StyleRecord::to_domain).collect(),
            total: record.total,
            page: record.page,
            per_page: record.per_page,
            has_next: record.has_next,
            has_prev: record.has_prev,
        })
    }

    async fn get_style(&self, token: &str, org: Uuid, style_id: Uuid) -> PortResult<StyleProfile> {
        let url = self.org_url(org, &format!("/styles/{}", style_id));
        let record: StyleRecord = self.send_json(self.get(token, url)).await?;
        Ok(record.to_domain())
    }

    async fn create_style(
        &self,
        token: &str,
        org: Uuid,
        style: &NewStyleProfile,
    ) -> PortResult<StyleProfile> {
        let body = StyleCreateBody {
            name: &style.name,
            description: style.description.as_deref(),
            tags: &style.tags,
        };
        let request = self.post(token, self.org_url(org, "/styles/")).json(&body);
        let record: StyleRecord = self.send_json(request).await?;
        Ok(record.to_domain())
    }

    async fn update_style(
        &self,
        token: &str,
        org: Uuid,
        style_id: Uuid,
        update: &StyleProfileUpdate,
    ) -> PortResult<StyleProfile> {
        let body = StyleUpdateBody {
            name: update.name.as_deref(),
            description: update.description.as_deref(),
            tags: update.tags.as_deref(),
            is_active: update.is_active,
        };
        let url = self.org_url(org, &format!("/styles/{}", style_id));
        let record: StyleRecord = self.send_json(self.put(token, url).json(&body)).await?;
        Ok(record.to_domain())
    }

    async fn delete_style(&self, token: &str, org: Uuid, style_id: Uuid) -> PortResult<()> {
        let url = self.org_url(org, &format!("/styles/{}", style_id));
        self.send_empty(self.delete(token, url)).await
    }

    async fn analyze_style(
        &self,
        token: &str,
        org: Uuid,
        style_id: Uuid,
        force: bool,
    ) -> PortResult<Option<StyleAnalysis>> {
        let body = AnalyzeBody {
            style_profile_id: style_id,
            force_reanalysis: force,
            include_metadata: true,
        };
        let url = self.org_url(org, &format!("/styles/{}/analyze", style_id));
        let request = self
            .post(token, url)
            .timeout(self.timeouts.generation)
            .json(&body);
        let record: AnalysisResponseRecord = self.send_json(request).await?;
        Ok(record.to_domain())
    }

    async fn upload_reference(
        &self,
        token: &str,
        org: Uuid,
        style_id: Uuid,
        file: &FileUpload,
    ) -> PortResult<UploadedFile> {
        let part = reqwest::multipart::Part::bytes(file.bytes.to_vec())
            .file_name(file.filename.clone())
            .mime_str(&file.mime_type)
            .map_err(|e| PortError::Unexpected(format!("invalid MIME type: {}", e)))?;
        let form = reqwest::multipart::Form::new().part("file", part);
        let request = self
            .post(token, self.org_url(org, "/files/upload"))
            .timeout(self.timeouts.upload)
            .query(&[("style_profile_id", style_id.to_string())])
            .multipart(form);
        let record: UploadRecord = self.send_json(request).await?;
        record.to_domain()
    }

    async fn list_references(
        &self,
        token: &str,
        org: Uuid,
        style_id: Uuid,
    ) -> PortResult<Vec<ReferenceArticle>> {
        let request = self
            .get(token, self.org_url(org, "/files/"))
            .query(&[("style_profile_id", style_id.to_string())]);
        let record: ReferenceListRecord = self.send_json(request).await?;
        Ok(record
            .reference_articles
            .into_iter()
            .map(ReferenceRecord::to_domain)
            .collect())
    }

    async fn delete_reference(&self, token: &str, org: Uuid, article_id: Uuid) -> PortResult<()> {
        let url = self.org_url(org, &format!("/files/{}", article_id));
        self.send_empty(self.delete(token, url)).await
    }

    async fn generate_content(
        &self,
        token: &str,
        org: Uuid,
        request: &GenerationRequest,
    ) -> PortResult<GeneratedContent> {
        let body = GenerateBody {
            title: &request.title,
            brief: &request.brief,
            content_type: request.content_type.as_str(),
            style_profile_id: request.style_id,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            target_length: request.target_length,
            additional_instructions: request.additional_instructions.as_deref(),
        };
        let mut builder = self
            .post(token, self.org_url(org, "/content/generate"))
            .timeout(self.timeouts.generation)
            .json(&body);
        if let Some(key) = request.idempotency_key {
            builder = builder.header(IDEMPOTENCY_HEADER, key.to_string());
        }
        let record: ContentRecord = self.send_json(builder).await?;
        Ok(record.to_domain())
    }

    async fn list_content(
        &self,
        token: &str,
        org: Uuid,
        params: &ContentSearchParams,
    ) -> PortResult<Page<GeneratedContent>> {
        let request = self
            .get(token, self.org_url(org, "/content/"))
            .query(&params.to_query_pairs());
        let record: ContentListRecord = self.send_json(request).await?;
        Ok(Page {
            items: record.content.into_iter().map(ContentRecord::to_domain).collect(),
            total: record.total,
            page: record.page,
            per_page: record.per_page,
            has_next: record.has_next,
            has_prev: record.has_prev,
        })
    }

    async fn get_content(&self, token: &str, org: Uuid, content_id: Uuid) -> PortResult<GeneratedContent> {
        let url = self.org_url(org, &format!("/content/{}", content_id));
        let record: ContentRecord = self.send_json(self.get(token, url)).await?;
        Ok(record.to_domain())
    }

    async fn update_content(
        &self,
        token: &str,
        org: Uuid,
        content_id: Uuid,
        update: &ContentUpdate,
    ) -> PortResult<GeneratedContent> {
        let body = ContentUpdateBody {
            title: update.title.as_deref(),
            brief: update.brief.as_deref(),
            status: update.status.map(ContentStatus::as_str),
            is_archived: update.is_archived,
        };
        let url = self.org_url(org, &format!("/content/{}", content_id));
        let record: ContentRecord = self.send_json(self.put(token, url).json(&body)).await?;
        Ok(record.to_domain())
    }

    async fn delete_content(&self, token: &str, org: Uuid, content_id: Uuid) -> PortResult<()> {
        let url = self.org_url(org, &format!("/content/{}", content_id));
        self.send_empty(self.delete(token, url)).await
    }

    async fn edit_content(
        &self,
        token: &str,
        org: Uuid,
        content_id: Uuid,
        request: &EditRequest,
    ) -> PortResult<ContentIteration> {
        let body = EditBody {
            edit_prompt: &request.prompt,
            edit_type: request.edit_type.as_str(),
        };
        let url = self.org_url(org, &format!("/content/{}/edit", content_id));
        let mut builder = self
            .post(token, url)
            .timeout(self.timeouts.generation)
            .json(&body);
        if let Some(key) = request.idempotency_key {
            builder = builder.header(IDEMPOTENCY_HEADER, key.to_string());
        }
        let record: IterationRecord = self.send_json(builder).await?;
        Ok(record.to_domain(content_id))
    }

    async fn list_iterations(
        &self,
        token: &str,
        org: Uuid,
        content_id: Uuid,
    ) -> PortResult<Vec<ContentIteration>> {
        let url = self.org_url(org, &format!("/content/{}/iterations", content_id));
        let records: Vec<IterationRecord> = self.send_json(self.get(token, url)).await?;
        let mut iterations: Vec<ContentIteration> = records
            .into_iter()
            .map(|r| r.to_domain(content_id))
            .collect();
        iterations.sort_by_key(|it| (it.created_at, it.iteration_number));
        Ok(iterations)
    }

    async fn usage_stats(&self, token: &str, org: Uuid, query: &UsageQuery) -> PortResult<UsageStats> {
        let request = self
            .get(token, self.org_url(org, "/usage/analytics"))
            .query(&query.to_query_pairs());
        let record: UsageAnalyticsRecord = self.send_json(request).await?;
        Ok(record.to_domain(org))
    }

    async fn usage_limits(&self, token: &str, org: Uuid) -> PortResult<UsageLimits> {
        let record: UsageLimitsRecord = self
            .send_json(self.get(token, self.org_url(org, "/usage/limits")))
            .await
            .map_err(|e| {
                if !matches!(e, PortError::Unauthorized) {
                    warn!(error = %e, "failed to load usage limits");
                }
                e
            })?;
        Ok(record.to_domain())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn adapter(server: &MockServer) -> HttpApiAdapter {
        HttpApiAdapter::new(&server.base_url(), HttpTimeouts::default()).unwrap()
    }

    fn content_json(id: Uuid, org: Uuid, status: &str, version: u32) -> serde_json::Value {
        json!({
            "id": id,
            "organization_id": org,
            "title": "Renewable energy",
            "generated_text": "Solar and wind are now the cheapest sources of new power.",
            "brief": "Write about renewable energy",
            "style_profile_id": Uuid::new_v4(),
            "content_type": "article",
            "status": status,
            "version": version,
            "total_tokens": 812,
            "estimated_cost": 0.024,
            "created_at": "2026-10-01T09:00:00Z",
            "updated_at": "2026-10-01T09:00:00Z"
        })
    }

    #[test]
    fn status_mapping_covers_backend_states() {
        assert_eq!(parse_status("completed", 1), ContentStatus::Generated);
        assert_eq!(parse_status("completed", 3), ContentStatus::Edited);
        assert_eq!(parse_status("pending", 1), ContentStatus::Draft);
        assert_eq!(parse_status("published", 2), ContentStatus::Published);
    }

    #[test]
    fn absurd_server_numbers_are_errors_not_panics() {
        let tokens = TokenRecord {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            expires_in: i64::MAX,
        };
        assert!(matches!(tokens.to_domain(), Err(PortError::Unexpected(_))));

        let limits: UsageLimitsRecord =
            serde_json::from_value(json!({"daily_limits": {"tokens": u64::MAX}})).unwrap();
        assert_eq!(limits.to_domain().monthly_token_limit, u64::MAX);
    }

    #[test]
    fn quota_rejections_are_recognised_in_400_bodies() {
        let body = r#"{"detail":"Daily usage limit exceeded. Please upgrade your plan or try again tomorrow."}"#;
        assert!(matches!(status_error(StatusCode::BAD_REQUEST, body), PortError::QuotaExceeded(_)));
        let body = r#"{"detail":"Title cannot be empty"}"#;
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, body),
            PortError::Rejected { status: 400, .. }
        ));
        assert!(matches!(status_error(StatusCode::TOO_MANY_REQUESTS, ""), PortError::QuotaExceeded(_)));
        assert!(matches!(status_error(StatusCode::BAD_GATEWAY, "oops"), PortError::Server { status: 502, .. }));
    }

    #[tokio::test]
    async fn generate_sends_bearer_and_idempotency_key() {
        let server = MockServer::start_async().await;
        let org = Uuid::new_v4();
        let content_id = Uuid::new_v4();
        let key = Uuid::new_v4();

        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path(format!("/api/v1/organizations/{}/content/generate", org))
                    .header("authorization", "Bearer access-1")
                    .header("idempotency-key", key.to_string())
                    .json_body_includes(r#"{"brief":"Write about renewable energy","max_tokens":2000}"#);
                then.status(201).json_body(content_json(content_id, org, "completed", 1));
            })
            .await;

        let request = GenerationRequest {
            title: "Renewable energy".to_string(),
            brief: "Write about renewable energy".to_string(),
            style_id: Uuid::new_v4(),
            content_type: ContentType::Article,
            max_tokens: 2000,
            temperature: 0.7,
            target_length: None,
            additional_instructions: None,
            idempotency_key: Some(key),
        };
        let content = adapter(&server)
            .generate_content("access-1", org, &request)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(content.id, content_id);
        assert_eq!(content.status, ContentStatus::Generated);
        assert_eq!(content.token_count, 812);
    }

    #[tokio::test]
    async fn list_content_omits_unset_filters() {
        let server = MockServer::start_async().await;
        let org = Uuid::new_v4();

        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path(format!("/api/v1/organizations/{}/content/", org))
                    .query_param("status", "edited")
                    .query_param_missing("query")
                    .query_param_missing("page");
                then.status(200).json_body(json!({
                    "content": [],
                    "total": 0,
                    "page": 1,
                    "per_page": 10,
                    "has_next": false,
                    "has_prev": false
                }));
            })
            .await;

        let params = ContentSearchParams {
            status: Some(ContentStatus::Edited),
            ..Default::default()
        };
        let page = adapter(&server).list_content("t", org, &params).await.unwrap();
        mock.assert_async().await;
        assert!(page.items.is_empty());
    }

    #[tokio::test]
    async fn http_statuses_map_to_port_errors() {
        let server = MockServer::start_async().await;
        let org = Uuid::new_v4();
        let missing = Uuid::new_v4();

        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/users/me");
                then.status(401).json_body(json!({"detail": "Could not validate credentials"}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path(format!("/api/v1/organizations/{}/content/{}", org, missing));
                then.status(404).json_body(json!({"detail": "Content not found"}));
            })
            .await;

        let api = adapter(&server);
        assert_eq!(api.current_user("expired").await.unwrap_err(), PortError::Unauthorized);
        assert_eq!(
            api.get_content("t", org, missing).await.unwrap_err(),
            PortError::NotFound("Content not found".to_string())
        );
    }

    #[tokio::test]
    async fn empty_analysis_object_means_unanalyzed() {
        let server = MockServer::start_async().await;
        let org = Uuid::new_v4();
        let style_id = Uuid::new_v4();

        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path(format!("/api/v1/organizations/{}/styles/{}", org, style_id));
                then.status(200).json_body(json!({
                    "id": style_id,
                    "organization_id": org,
                    "name": "Formal",
                    "tags": [],
                    "analysis": {},
                    "is_active": true,
                    "reference_count": 1,
                    "created_at": "2026-10-01T09:00:00Z",
                    "updated_at": "2026-10-01T09:00:00Z"
                }));
            })
            .await;

        let style = adapter(&server).get_style("t", org, style_id).await.unwrap();
        assert_eq!(style.reference_total(), 1);
        assert!(style.analysis.is_none());
    }

    #[tokio::test]
    async fn upload_posts_multipart_with_style_query() {
        let server = MockServer::start_async().await;
        let org = Uuid::new_v4();
        let style_id = Uuid::new_v4();

        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path(format!("/api/v1/organizations/{}/files/upload", org))
                    .query_param("style_profile_id", style_id.to_string())
                    .header_exists("content-type")
                    .body_includes("quarterly-letter.txt");
                then.status(200).json_body(json!({
                    "success": true,
                    "file_id": Uuid::new_v4(),
                    "filename": "quarterly-letter.txt",
                    "file_size": 11,
                    "mime_type": "text/plain",
                    "s3_key": "org/refs/quarterly-letter.txt",
                    "message": "uploaded"
                }));
            })
            .await;

        let file = FileUpload::new("quarterly-letter.txt", "text/plain", b"Dear reader".to_vec());
        let uploaded = adapter(&server)
            .upload_reference("t", org, style_id, &file)
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(uploaded.size_bytes, 11);
        assert_eq!(uploaded.file_key.as_deref(), Some("org/refs/quarterly-letter.txt"));
    }
}
