//! crates/studio_core/src/ports.rs
//!
//! Defines the service contracts (traits) the content studio core depends on.
//! These traits form the boundary of the hexagonal architecture, keeping the
//! session, cache and workflow logic independent of the HTTP client and of the
//! storage used to persist the session.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    AuthTokens, ContentIteration, ContentSearchParams, ContentUpdate, EditRequest, FileUpload,
    GeneratedContent, GenerationRequest, NewStyleProfile, Organization, Page, ReferenceArticle,
    StyleAnalysis, StyleProfile, StyleProfileUpdate, StyleSearchParams, UploadedFile, UsageLimits,
    UsageQuery, UsageStats, User, UserProfile, UserUpdate,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors of the transport and storage layers.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Usage quota exceeded: {0}")]
    QuotaExceeded(String),
    /// Any other 4xx answer.
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },
    /// Connection failures and timeouts.
    #[error("Network error: {0}")]
    Network(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl PortError {
    /// Errors worth another attempt. 4xx-class answers never are.
    pub fn is_transient(&self) -> bool {
        matches!(self, PortError::Server { .. } | PortError::Network(_))
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// The remote content studio API.
///
/// Every authenticated call takes the bearer token explicitly; the adapter
/// holds no session state. All organization-scoped calls take the
/// organization id that forms their path prefix.
#[async_trait]
pub trait StudioApi: Send + Sync {
    // --- Auth ---
    async fn login(&self, email: &str, password: &str) -> PortResult<AuthTokens>;

    async fn refresh(&self, refresh_token: &str) -> PortResult<AuthTokens>;

    async fn logout(&self, token: &str) -> PortResult<()>;

    // --- User & Organizations ---
    async fn current_user(&self, token: &str) -> PortResult<UserProfile>;

    async fn update_user(&self, token: &str, update: &UserUpdate) -> PortResult<User>;

    async fn list_organizations(&self, token: &str) -> PortResult<Vec<Organization>>;

    // --- Styles ---
    async fn list_styles(
        &self,
        token: &str,
        org: Uuid,
        params: &StyleSearchParams,
    ) -> PortResult<Page<StyleProfile>>;

    async fn get_style(&self, token: &str, org: Uuid, style_id: Uuid) -> PortResult<StyleProfile>;

    async fn create_style(
        &self,
        token: &str,
        org: Uuid,
        style: &NewStyleProfile,
    ) -> PortResult<StyleProfile>;

    async fn update_style(
        &self,
        token: &str,
        org: Uuid,
        style_id: Uuid,
        update: &StyleProfileUpdate,
    ) -> PortResult<StyleProfile>;

    async fn delete_style(&self, token: &str, org: Uuid, style_id: Uuid) -> PortResult<()>;

    /// Asks the backend to analyze the style's references. `None` means the
    /// analysis is not available (yet).
    async fn analyze_style(
        &self,
        token: &str,
        org: Uuid,
        style_id: Uuid,
        force: bool,
    ) -> PortResult<Option<StyleAnalysis>>;

    // --- Reference Files ---
    async fn upload_reference(
        &self,
        token: &str,
        org: Uuid,
        style_id: Uuid,
        file: &FileUpload,
    ) -> PortResult<UploadedFile>;

    async fn list_references(
        &self,
        token: &str,
        org: Uuid,
        style_id: Uuid,
    ) -> PortResult<Vec<ReferenceArticle>>;

    async fn delete_reference(&self, token: &str, org: Uuid, article_id: Uuid) -> PortResult<()>;

    // --- Content ---
    async fn generate_content(
        &self,
        token: &str,
        org: Uuid,
        request: &GenerationRequest,
    ) -> PortResult<GeneratedContent>;

    async fn list_content(
        &self,
        token: &str,
        org: Uuid,
        params: &ContentSearchParams,
    ) -> PortResult<Page<GeneratedContent>>;

    async fn get_content(&self, token: &str, org: Uuid, content_id: Uuid) -> PortResult<GeneratedContent>;

    async fn update_content(
        &self,
        token: &str,
        org: Uuid,
        content_id: Uuid,
        update: &ContentUpdate,
    ) -> PortResult<GeneratedContent>;

    async fn delete_content(&self, token: &str, org: Uuid, content_id: Uuid) -> PortResult<()>;

    async fn edit_content(
        &self,
        token: &str,
        org: Uuid,
        content_id: Uuid,
        request: &EditRequest,
    ) -> PortResult<ContentIteration>;

    async fn list_iterations(
        &self,
        token: &str,
        org: Uuid,
        content_id: Uuid,
    ) -> PortResult<Vec<ContentIteration>>;

    // --- Usage ---
    async fn usage_stats(&self, token: &str, org: Uuid, query: &UsageQuery) -> PortResult<UsageStats>;

    async fn usage_limits(&self, token: &str, org: Uuid) -> PortResult<UsageLimits>;
}

/// A small string key-value store used to persist client state between runs.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> PortResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> PortResult<()>;

    fn remove(&self, key: &str) -> PortResult<()>;

    /// Removes every key this store holds.
    fn clear(&self) -> PortResult<()>;
}
