//! crates/studio_core/src/domain.rs
//!
//! Defines the pure, core data structures for the content studio.
//! These structs are independent of the wire format and of any storage backend;
//! adapters convert their own records into these types.

use bytes::Bytes;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use uuid::Uuid;

//=========================================================================================
// Identity & Tenancy
//=========================================================================================

/// The authenticated person. The only entity whose cache key is not
/// namespaced by organization.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub display_name: Option<String>,
    pub is_verified: bool,
    pub locale: Option<String>,
    pub timezone: Option<String>,
}

/// Fields a user may change on their own profile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrganizationSettings {
    pub default_style_id: Option<Uuid>,
    pub monthly_token_quota: Option<u64>,
}

/// The tenant boundary for all style, content and usage data.
#[derive(Debug, Clone, PartialEq)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub settings: OrganizationSettings,
}

/// A user together with every organization it is a member of.
#[derive(Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub user: User,
    pub organizations: Vec<Organization>,
}

/// Bearer credentials issued by the backend.
///
/// `expires_at` is absolute; it is computed from the relative `expires_in`
/// the backend returns at the moment the tokens are received.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl AuthTokens {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// True when the access token expires within `leeway` of `now` (or already has).
    pub fn expires_within(&self, now: DateTime<Utc>, leeway: Duration) -> bool {
        now + leeway >= self.expires_at
    }
}

//=========================================================================================
// Styles
//=========================================================================================

/// A named writing-style definition derived from reference documents.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleProfile {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub is_active: bool,
    pub reference_count: u32,
    /// Loaded reference articles. Empty when the backend only reported a count.
    pub references: Vec<ReferenceArticle>,
    pub analysis: Option<StyleAnalysis>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StyleProfile {
    /// Number of reference articles backing this style, whichever way the
    /// backend reported it.
    pub fn reference_total(&self) -> usize {
        self.references.len().max(self.reference_count as usize)
    }

    pub fn confidence_band(&self) -> ConfidenceBand {
        ConfidenceBand::for_analysis(self.analysis.as_ref())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewStyleProfile {
    pub name: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleProfileUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

/// An uploaded source document. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceArticle {
    pub id: Uuid,
    pub style_id: Uuid,
    pub title: String,
    pub file_key: Option<String>,
    pub size_bytes: u64,
    pub mime_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A file the user picked for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct FileUpload {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Bytes,
}

impl FileUpload {
    pub fn new(filename: impl Into<String>, mime_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// What the backend reports after storing an upload. Carries no file content.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    pub file_id: Option<Uuid>,
    pub filename: String,
    pub file_key: Option<String>,
    pub size_bytes: u64,
    pub mime_type: String,
}

/// Derived, read-only analysis of a style's reference articles.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleAnalysis {
    pub tone: Option<String>,
    pub voice: Option<String>,
    pub structure: Vec<String>,
    pub vocabulary: Vec<String>,
    pub key_phrases: Vec<String>,
    /// Always within `[0, 1]`.
    pub confidence: f64,
    pub analyzed_at: Option<DateTime<Utc>>,
}

impl StyleAnalysis {
    pub fn confidence_percent(&self) -> u8 {
        (self.confidence.clamp(0.0, 1.0) * 100.0).round() as u8
    }
}

/// Below this score an analysis is shown as low confidence.
pub const LOW_CONFIDENCE_THRESHOLD: f64 = 0.6;
/// At or above this score an analysis is shown as high confidence.
pub const HIGH_CONFIDENCE_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceBand {
    Unanalyzed,
    Low,
    Medium,
    High,
}

impl ConfidenceBand {
    pub fn for_score(score: f64) -> Self {
        if score >= HIGH_CONFIDENCE_THRESHOLD {
            ConfidenceBand::High
        } else if score >= LOW_CONFIDENCE_THRESHOLD {
            ConfidenceBand::Medium
        } else {
            ConfidenceBand::Low
        }
    }

    pub fn for_analysis(analysis: Option<&StyleAnalysis>) -> Self {
        analysis
            .map(|a| Self::for_score(a.confidence))
            .unwrap_or(ConfidenceBand::Unanalyzed)
    }

    /// Generation quality is not guaranteed for these bands.
    pub fn needs_warning(self) -> bool {
        matches!(self, ConfidenceBand::Unanalyzed | ConfidenceBand::Low)
    }

    pub fn label(self) -> &'static str {
        match self {
            ConfidenceBand::Unanalyzed => "unanalyzed",
            ConfidenceBand::Low => "low",
            ConfidenceBand::Medium => "medium",
            ConfidenceBand::High => "high",
        }
    }
}

//=========================================================================================
// Generated Content
//=========================================================================================

/// Lifecycle of a generated article. The declaration order is the only
/// direction the status may move in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ContentStatus {
    Draft,
    Generated,
    Edited,
    Published,
}

impl ContentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentStatus::Draft => "draft",
            ContentStatus::Generated => "generated",
            ContentStatus::Edited => "edited",
            ContentStatus::Published => "published",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentType {
    #[default]
    Article,
    BlogPost,
    MarketingCopy,
    ProductDescription,
    Email,
    SocialMedia,
    PressRelease,
    WhitePaper,
    CaseStudy,
    Newsletter,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Article => "article",
            ContentType::BlogPost => "blog_post",
            ContentType::MarketingCopy => "marketing_copy",
            ContentType::ProductDescription => "product_description",
            ContentType::Email => "email",
            ContentType::SocialMedia => "social_media",
            ContentType::PressRelease => "press_release",
            ContentType::WhitePaper => "white_paper",
            ContentType::CaseStudy => "case_study",
            ContentType::Newsletter => "news_letter",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let parsed = match value {
            "article" => ContentType::Article,
            "blog_post" => ContentType::BlogPost,
            "marketing_copy" => ContentType::MarketingCopy,
            "product_description" => ContentType::ProductDescription,
            "email" => ContentType::Email,
            "social_media" => ContentType::SocialMedia,
            "press_release" => ContentType::PressRelease,
            "white_paper" => ContentType::WhitePaper,
            "case_study" => ContentType::CaseStudy,
            "news_letter" => ContentType::Newsletter,
            _ => return None,
        };
        Some(parsed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditType {
    #[default]
    General,
    Style,
    Tone,
    Length,
    Structure,
    Grammar,
    Clarity,
}

impl EditType {
    pub fn as_str(self) -> &'static str {
        match self {
            EditType::General => "general",
            EditType::Style => "style",
            EditType::Tone => "tone",
            EditType::Length => "length",
            EditType::Structure => "structure",
            EditType::Grammar => "grammar",
            EditType::Clarity => "clarity",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "style" => EditType::Style,
            "tone" => EditType::Tone,
            "length" => EditType::Length,
            "structure" => EditType::Structure,
            "grammar" => EditType::Grammar,
            "clarity" => EditType::Clarity,
            _ => EditType::General,
        }
    }
}

/// An AI-generated article and its edit history.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedContent {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub title: String,
    pub body: String,
    pub brief: Option<String>,
    pub style_id: Option<Uuid>,
    pub content_type: ContentType,
    pub status: ContentStatus,
    pub token_count: u64,
    pub cost: f64,
    pub is_archived: bool,
    /// Ordered by creation; append-only.
    pub iterations: Vec<ContentIteration>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GeneratedContent {
    /// Moves the status forward to `next`. Returns `false` (and leaves the
    /// status alone) when `next` would be a regression.
    pub fn advance_status(&mut self, next: ContentStatus) -> bool {
        if next < self.status {
            return false;
        }
        self.status = next;
        true
    }

    /// Appends an iteration unless one with the same id is already recorded.
    pub fn append_iteration(&mut self, iteration: ContentIteration) -> bool {
        if self.iterations.iter().any(|it| it.id == iteration.id) {
            return false;
        }
        self.iterations.push(iteration);
        true
    }

    /// Folds a freshly created edit iteration into the article: new body,
    /// accumulated usage, `edited` status.
    pub fn apply_iteration(&mut self, iteration: ContentIteration) -> bool {
        let snapshot = iteration.snapshot.clone();
        let tokens = iteration.token_count;
        let cost = iteration.cost;
        let created_at = iteration.created_at;
        if !self.append_iteration(iteration) {
            return false;
        }
        if let Some(text) = snapshot {
            self.body = text;
        }
        self.token_count += tokens;
        self.cost += cost;
        self.updated_at = self.updated_at.max(created_at);
        self.advance_status(ContentStatus::Edited);
        true
    }
}

/// One edit pass over generated content.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentIteration {
    pub id: Uuid,
    pub content_id: Uuid,
    pub iteration_number: u32,
    /// The article text this pass produced, when the backend returned it.
    pub snapshot: Option<String>,
    pub edit_prompt: Option<String>,
    pub edit_type: EditType,
    pub token_count: u64,
    pub cost: f64,
    pub created_at: DateTime<Utc>,
}

/// Numeric generation knobs as the user entered them; `None` means "use the default".
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GenerationParams {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub target_length: Option<u32>,
}

/// A validated generation request, ready to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub title: String,
    pub brief: String,
    pub style_id: Uuid,
    pub content_type: ContentType,
    pub max_tokens: u32,
    pub temperature: f32,
    pub target_length: Option<u32>,
    pub additional_instructions: Option<String>,
    pub idempotency_key: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EditRequest {
    pub prompt: String,
    pub edit_type: EditType,
    pub idempotency_key: Option<Uuid>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentUpdate {
    pub title: Option<String>,
    pub brief: Option<String>,
    pub status: Option<ContentStatus>,
    pub is_archived: Option<bool>,
}

//=========================================================================================
// Usage
//=========================================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct DailyUsage {
    pub date: NaiveDate,
    pub tokens: u64,
    pub cost: f64,
    pub requests: u64,
}

/// Aggregate token/cost counters for an organization over a period.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageStats {
    pub organization_id: Uuid,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub total_requests: u64,
    pub daily: Vec<DailyUsage>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UsageLimits {
    pub daily_token_limit: u64,
    pub tokens_used_today: u64,
    pub monthly_token_limit: u64,
    pub tokens_used_this_month: u64,
    pub daily_limit_exceeded: bool,
    pub monthly_limit_exceeded: bool,
}

impl UsageLimits {
    pub fn daily_percentage(&self) -> f64 {
        if self.daily_token_limit == 0 {
            return 0.0;
        }
        (self.tokens_used_today as f64 / self.daily_token_limit as f64 * 100.0).clamp(0.0, 100.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct UsageQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl UsageQuery {
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(start) = self.start_date {
            pairs.push(("start_date", start.format("%Y-%m-%d").to_string()));
        }
        if let Some(end) = self.end_date {
            pairs.push(("end_date", end.format("%Y-%m-%d").to_string()));
        }
        pairs
    }
}

//=========================================================================================
// Listing
//=========================================================================================

/// One page of a list endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub has_next: bool,
    pub has_prev: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// Filters for the style list. Unset fields are left out of the query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleSearchParams {
    pub query: Option<String>,
    pub tags: Vec<String>,
    pub is_analyzed: Option<bool>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub sort_by: Option<String>,
    pub sort_order: Option<SortOrder>,
}

impl StyleSearchParams {
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        push_text(&mut pairs, "query", self.query.as_deref());
        if !self.tags.is_empty() {
            pairs.push(("tags", self.tags.join(",")));
        }
        if let Some(analyzed) = self.is_analyzed {
            pairs.push(("is_analyzed", analyzed.to_string()));
        }
        push_paging(&mut pairs, self.page, self.per_page);
        push_text(&mut pairs, "sort_by", self.sort_by.as_deref());
        if let Some(order) = self.sort_order {
            pairs.push(("sort_order", order.as_str().to_string()));
        }
        pairs
    }
}

/// Filters for the content list. Unset fields are left out of the query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentSearchParams {
    pub query: Option<String>,
    pub content_type: Option<ContentType>,
    pub status: Option<ContentStatus>,
    pub style_id: Option<Uuid>,
    pub is_archived: Option<bool>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub sort_by: Option<String>,
    pub sort_order: Option<SortOrder>,
}

impl ContentSearchParams {
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        push_text(&mut pairs, "query", self.query.as_deref());
        if let Some(kind) = self.content_type {
            pairs.push(("content_type", kind.as_str().to_string()));
        }
        if let Some(status) = self.status {
            pairs.push(("status", status.as_str().to_string()));
        }
        if let Some(style_id) = self.style_id {
            pairs.push(("style_profile_id", style_id.to_string()));
        }
        if let Some(archived) = self.is_archived {
            pairs.push(("is_archived", archived.to_string()));
        }
        push_paging(&mut pairs, self.page, self.per_page);
        push_text(&mut pairs, "sort_by", self.sort_by.as_deref());
        if let Some(order) = self.sort_order {
            pairs.push(("sort_order", order.as_str().to_string()));
        }
        pairs
    }
}

fn push_text(pairs: &mut Vec<(&'static str, String)>, name: &'static str, value: Option<&str>) {
    if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
        pairs.push((name, value.to_string()));
    }
}

fn push_paging(pairs: &mut Vec<(&'static str, String)>, page: Option<u32>, per_page: Option<u32>) {
    if let Some(page) = page {
        pairs.push(("page", page.to_string()));
    }
    if let Some(per_page) = per_page {
        pairs.push(("per_page", per_page.to_string()));
    }
}
