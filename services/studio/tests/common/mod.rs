//! In-memory stand-in for the studio backend, shared by the integration tests.
#![allow(dead_code, clippy::unwrap_used)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use studio_core::domain::{
    AuthTokens, ContentIteration, ContentSearchParams, ContentStatus, ContentUpdate, DailyUsage,
    EditRequest, FileUpload, GeneratedContent, GenerationRequest, NewStyleProfile, Organization,
    OrganizationSettings, Page, ReferenceArticle, StyleAnalysis, StyleProfile, StyleProfileUpdate,
    StyleSearchParams, UploadedFile, UsageLimits, UsageQuery, UsageStats, User, UserProfile,
    UserUpdate,
};
use studio_core::ports::{PortError, PortResult, StudioApi};
use studio_lib::adapters::MemoryStore;
use studio_lib::cache::EntityCache;
use studio_lib::session::SessionSettings;
use studio_lib::Studio;
use tokio::sync::Notify;
use uuid::Uuid;

pub const EMAIL: &str = "writer@example.com";
pub const PASSWORD: &str = "correct horse battery";

struct FakeState {
    valid_tokens: HashSet<String>,
    issued: u32,
    token_lifetime: chrono::Duration,
    refresh_issues_invalid: bool,
    styles: HashMap<Uuid, StyleProfile>,
    references: HashMap<Uuid, Vec<ReferenceArticle>>,
    analysis_results: HashMap<Uuid, f64>,
    default_confidence: Option<f64>,
    contents: HashMap<Uuid, GeneratedContent>,
    iterations: HashMap<Uuid, Vec<ContentIteration>>,
    idempotency_keys: Vec<Option<Uuid>>,
}

pub struct FakeApi {
    pub user: User,
    pub orgs: Vec<Organization>,
    state: Mutex<FakeState>,
    calls: Mutex<HashMap<&'static str, usize>>,
    /// Scripted outcomes per operation; `None` lets that call through.
    failures: Mutex<HashMap<&'static str, VecDeque<Option<PortError>>>>,
    list_gate: Mutex<Option<Arc<Notify>>>,
    pub list_entered: Notify,
}

fn organization(name: &str) -> Organization {
    Organization {
        id: Uuid::new_v4(),
        name: name.to_string(),
        slug: name.to_lowercase(),
        settings: OrganizationSettings::default(),
    }
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            user: User {
                id: Uuid::new_v4(),
                email: EMAIL.to_string(),
                username: "writer".to_string(),
                display_name: Some("Wren Writer".to_string()),
                is_verified: true,
                locale: Some("en".to_string()),
                timezone: None,
            },
            orgs: vec![organization("Acme"), organization("Globex")],
            state: Mutex::new(FakeState {
                valid_tokens: HashSet::new(),
                issued: 0,
                token_lifetime: chrono::Duration::hours(1),
                refresh_issues_invalid: false,
                styles: HashMap::new(),
                references: HashMap::new(),
                analysis_results: HashMap::new(),
                default_confidence: None,
                contents: HashMap::new(),
                iterations: HashMap::new(),
                idempotency_keys: Vec::new(),
            }),
            calls: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            list_gate: Mutex::new(None),
            list_entered: Notify::new(),
        })
    }

    pub fn org_a(&self) -> Uuid {
        self.orgs[0].id
    }

    pub fn org_b(&self) -> Uuid {
        self.orgs[1].id
    }

    // --- Instrumentation ---

    pub fn calls(&self, op: &str) -> usize {
        self.calls.lock().unwrap().get(op).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    /// Makes the next call of `op` fail with `err`.
    pub fn fail_next(&self, op: &'static str, err: PortError) {
        self.failures
            .lock()
            .unwrap()
            .entry(op)
            .or_default()
            .push_back(Some(err));
    }

    /// Lets the next call of `op` through; queue before `fail_next` to fail a later call.
    pub fn succeed_next(&self, op: &'static str) {
        self.failures
            .lock()
            .unwrap()
            .entry(op)
            .or_default()
            .push_back(None);
    }

    /// Rejects every access token issued so far.
    pub fn revoke_tokens(&self) {
        self.state.lock().unwrap().valid_tokens.clear();
    }

    pub fn set_refresh_issues_invalid(&self, invalid: bool) {
        self.state.lock().unwrap().refresh_issues_invalid = invalid;
    }

    pub fn set_token_lifetime(&self, lifetime: chrono::Duration) {
        self.state.lock().unwrap().token_lifetime = lifetime;
    }

    pub fn idempotency_keys(&self) -> Vec<Option<Uuid>> {
        self.state.lock().unwrap().idempotency_keys.clone()
    }

    /// Parks `list_content` calls until the returned gate is notified.
    /// Parks the next `list_content` call until the returned gate is notified.
    pub fn hold_list_content(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.list_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    // --- Seeding ---

    pub fn seed_style(&self, org: Uuid, name: &str, references: usize, confidence: Option<f64>) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let articles: Vec<ReferenceArticle> = (0..references)
            .map(|i| ReferenceArticle {
                id: Uuid::new_v4(),
                style_id: id,
                title: format!("reference-{}.txt", i + 1),
                file_key: Some(format!("{}/refs/{}", org, i + 1)),
                size_bytes: 1024,
                mime_type: Some("text/plain".to_string()),
                created_at: now,
            })
            .collect();
        let style = StyleProfile {
            id,
            organization_id: org,
            name: name.to_string(),
            description: None,
            tags: Vec::new(),
            is_active: true,
            reference_count: references as u32,
            references: Vec::new(),
            analysis: confidence.map(analysis),
            created_at: now,
            updated_at: now,
        };
        let mut state = self.state.lock().unwrap();
        state.styles.insert(id, style);
        state.references.insert(id, articles);
        id
    }

    /// The confidence the next analysis of `style_id` will report.
    pub fn set_analysis_result(&self, style_id: Uuid, confidence: f64) {
        self.state
            .lock()
            .unwrap()
            .analysis_results
            .insert(style_id, confidence);
    }

    /// The confidence any analysis without a queued result reports, for
    /// styles that have references.
    pub fn set_default_analysis(&self, confidence: f64) {
        self.state.lock().unwrap().default_confidence = Some(confidence);
    }

    pub fn reference_count(&self, style_id: Uuid) -> usize {
        self.state
            .lock()
            .unwrap()
            .references
            .get(&style_id)
            .map_or(0, Vec::len)
    }

    pub fn seed_content(&self, org: Uuid, title: &str) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let content = GeneratedContent {
            id,
            organization_id: org,
            title: title.to_string(),
            body: format!("Body of {}", title),
            brief: None,
            style_id: None,
            content_type: Default::default(),
            status: ContentStatus::Generated,
            token_count: 500,
            cost: 0.015,
            is_archived: false,
            iterations: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.state.lock().unwrap().contents.insert(id, content);
        id
    }

    pub fn content_status(&self, id: Uuid) -> Option<ContentStatus> {
        self.state.lock().unwrap().contents.get(&id).map(|c| c.status)
    }

    // --- Internals ---

    async fn enter(&self, op: &'static str, token: Option<&str>) -> PortResult<()> {
        *self.calls.lock().unwrap().entry(op).or_default() += 1;
        tokio::task::yield_now().await;
        let failure = self
            .failures
            .lock()
            .unwrap()
            .get_mut(op)
            .and_then(VecDeque::pop_front)
            .flatten();
        if let Some(err) = failure {
            return Err(err);
        }
        if let Some(token) = token {
            let valid = self.state.lock().unwrap().valid_tokens.contains(token);
            if !valid {
                return Err(PortError::Unauthorized);
            }
        }
        Ok(())
    }

    fn issue(&self, valid: bool) -> AuthTokens {
        let mut state = self.state.lock().unwrap();
        state.issued += 1;
        let access = format!("access-{}", state.issued);
        if valid {
            state.valid_tokens.insert(access.clone());
        }
        AuthTokens {
            access_token: access,
            refresh_token: format!("refresh-{}", state.issued),
            expires_at: Utc::now() + state.token_lifetime,
        }
    }

    fn style_in(&self, org: Uuid, style_id: Uuid) -> PortResult<StyleProfile> {
        self.state
            .lock()
            .unwrap()
            .styles
            .get(&style_id)
            .filter(|s| s.organization_id == org)
            .cloned()
            .ok_or_else(|| PortError::NotFound("Style profile not found".to_string()))
    }

    fn content_in(&self, org: Uuid, content_id: Uuid) -> PortResult<GeneratedContent> {
        self.state
            .lock()
            .unwrap()
            .contents
            .get(&content_id)
            .filter(|c| c.organization_id == org)
            .cloned()
            .ok_or_else(|| PortError::NotFound("Content not found".to_string()))
    }
}

fn analysis(confidence: f64) -> StyleAnalysis {
    StyleAnalysis {
        tone: Some("formal".to_string()),
        voice: Some("third person".to_string()),
        structure: vec!["short paragraphs".to_string()],
        vocabulary: vec!["precise".to_string()],
        key_phrases: vec!["in summary".to_string()],
        confidence,
        analyzed_at: Some(Utc::now()),
    }
}

fn page<T>(items: Vec<T>) -> Page<T> {
    Page {
        total: items.len() as u64,
        items,
        page: 1,
        per_page: 10,
        has_next: false,
        has_prev: false,
    }
}

#[async_trait]
impl StudioApi for FakeApi {
    async fn login(&self, email: &str, password: &str) -> PortResult<AuthTokens> {
        self.enter("login", None).await?;
        if email != EMAIL || password != PASSWORD {
            return Err(PortError::Unauthorized);
        }
        Ok(self.issue(true))
    }

    async fn refresh(&self, refresh_token: &str) -> PortResult<AuthTokens> {
        self.enter("refresh", None).await?;
        if !refresh_token.starts_with("refresh-") {
            return Err(PortError::Unauthorized);
        }
        let invalid = self.state.lock().unwrap().refresh_issues_invalid;
        Ok(self.issue(!invalid))
    }

    async fn logout(&self, token: &str) -> PortResult<()> {
        self.enter("logout", Some(token)).await?;
        self.state.lock().unwrap().valid_tokens.remove(token);
        Ok(())
    }

    async fn current_user(&self, token: &str) -> PortResult<UserProfile> {
        self.enter("current_user", Some(token)).await?;
        Ok(UserProfile {
            user: self.user.clone(),
            organizations: self.orgs.clone(),
        })
    }

    async fn update_user(&self, token: &str, update: &UserUpdate) -> PortResult<User> {
        self.enter("update_user", Some(token)).await?;
        let mut user = self.user.clone();
        if let Some(username) = &update.username {
            user.username = username.clone();
        }
        Ok(user)
    }

    async fn list_organizations(&self, token: &str) -> PortResult<Vec<Organization>> {
        self.enter("list_organizations", Some(token)).await?;
        Ok(self.orgs.clone())
    }

    async fn list_styles(&self, token: &str, org: Uuid, params: &StyleSearchParams) -> PortResult<Page<StyleProfile>> {
        self.enter("list_styles", Some(token)).await?;
        let query = params.query.clone().unwrap_or_default().to_lowercase();
        let mut styles: Vec<StyleProfile> = self
            .state
            .lock()
            .unwrap()
            .styles
            .values()
            .filter(|s| s.organization_id == org && s.name.to_lowercase().contains(&query))
            .cloned()
            .collect();
        styles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(page(styles))
    }

    async fn get_style(&self, token: &str, org: Uuid, style_id: Uuid) -> PortResult<StyleProfile> {
        self.enter("get_style", Some(token)).await?;
        self.style_in(org, style_id)
    }

    async fn create_style(&self, token: &str, org: Uuid, style: &NewStyleProfile) -> PortResult<StyleProfile> {
        self.enter("create_style", Some(token)).await?;
        let now = Utc::now();
        let created = StyleProfile {
            id: Uuid::new_v4(),
            organization_id: org,
            name: style.name.clone(),
            description: style.description.clone(),
            tags: style.tags.clone(),
            is_active: true,
            reference_count: 0,
            references: Vec::new(),
            analysis: None,
            created_at: now,
            updated_at: now,
        };
        let mut state = self.state.lock().unwrap();
        state.styles.insert(created.id, created.clone());
        state.references.insert(created.id, Vec::new());
        Ok(created)
    }

    async fn update_style(
        &self,
        token: &str,
        org: Uuid,
        style_id: Uuid,
        update: &StyleProfileUpdate,
    ) -> PortResult<StyleProfile> {
        self.enter("update_style", Some(token)).await?;
        self.style_in(org, style_id)?;
        let mut state = self.state.lock().unwrap();
        let style = state.styles.get_mut(&style_id).unwrap();
        if let Some(name) = &update.name {
            style.name = name.clone();
        }
        if let Some(active) = update.is_active {
            style.is_active = active;
        }
        style.updated_at = Utc::now();
        Ok(style.clone())
    }

    async fn delete_style(&self, token: &str, org: Uuid, style_id: Uuid) -> PortResult<()> {
        self.enter("delete_style", Some(token)).await?;
        self.style_in(org, style_id)?;
        self.state.lock().unwrap().styles.remove(&style_id);
        Ok(())
    }

    async fn analyze_style(&self, token: &str, org: Uuid, style_id: Uuid, force: bool) -> PortResult<Option<StyleAnalysis>> {
        self.enter("analyze_style", Some(token)).await?;
        let style = self.style_in(org, style_id)?;
        let mut state = self.state.lock().unwrap();
        let has_references = state
            .references
            .get(&style_id)
            .is_some_and(|list| !list.is_empty());
        let confidence = match (state.analysis_results.remove(&style_id), &style.analysis) {
            (Some(queued), _) => queued,
            (None, Some(existing)) if !force => return Ok(Some(existing.clone())),
            (None, _) => match state.default_confidence.filter(|_| has_references) {
                Some(default) => default,
                None => return Ok(style.analysis),
            },
        };
        let result = analysis(confidence);
        if let Some(stored) = state.styles.get_mut(&style_id) {
            stored.analysis = Some(result.clone());
        }
        Ok(Some(result))
    }

    async fn upload_reference(&self, token: &str, org: Uuid, style_id: Uuid, file: &FileUpload) -> PortResult<UploadedFile> {
        self.enter("upload_reference", Some(token)).await?;
        self.style_in(org, style_id)?;
        let article = ReferenceArticle {
            id: Uuid::new_v4(),
            style_id,
            title: file.filename.clone(),
            file_key: Some(format!("{}/refs/{}", org, file.filename)),
            size_bytes: file.size(),
            mime_type: Some(file.mime_type.clone()),
            created_at: Utc::now(),
        };
        let mut state = self.state.lock().unwrap();
        state.references.entry(style_id).or_default().push(article.clone());
        if let Some(style) = state.styles.get_mut(&style_id) {
            style.reference_count += 1;
        }
        Ok(UploadedFile {
            file_id: Some(article.id),
            filename: article.title,
            file_key: article.file_key,
            size_bytes: article.size_bytes,
            mime_type: file.mime_type.clone(),
        })
    }

    async fn list_references(&self, token: &str, org: Uuid, style_id: Uuid) -> PortResult<Vec<ReferenceArticle>> {
        self.enter("list_references", Some(token)).await?;
        self.style_in(org, style_id)?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .references
            .get(&style_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_reference(&self, token: &str, _org: Uuid, article_id: Uuid) -> PortResult<()> {
        self.enter("delete_reference", Some(token)).await?;
        let mut state = self.state.lock().unwrap();
        let owner = state
            .references
            .iter()
            .find(|(_, list)| list.iter().any(|a| a.id == article_id))
            .map(|(style_id, _)| *style_id)
            .ok_or_else(|| PortError::NotFound("Reference article not found".to_string()))?;
        if let Some(list) = state.references.get_mut(&owner) {
            list.retain(|a| a.id != article_id);
        }
        if let Some(style) = state.styles.get_mut(&owner) {
            style.reference_count = style.reference_count.saturating_sub(1);
        }
        Ok(())
    }

    async fn generate_content(&self, token: &str, org: Uuid, request: &GenerationRequest) -> PortResult<GeneratedContent> {
        self.state
            .lock()
            .unwrap()
            .idempotency_keys
            .push(request.idempotency_key);
        self.enter("generate_content", Some(token)).await?;
        self.style_in(org, request.style_id)?;
        let now = Utc::now();
        let content = GeneratedContent {
            id: Uuid::new_v4(),
            organization_id: org,
            title: request.title.clone(),
            body: format!("An article about: {}", request.brief),
            brief: Some(request.brief.clone()),
            style_id: Some(request.style_id),
            content_type: request.content_type,
            status: ContentStatus::Generated,
            token_count: 812,
            cost: 0.0244,
            is_archived: false,
            iterations: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.state
            .lock()
            .unwrap()
            .contents
            .insert(content.id, content.clone());
        Ok(content)
    }

    async fn list_content(&self, token: &str, org: Uuid, params: &ContentSearchParams) -> PortResult<Page<GeneratedContent>> {
        self.enter("list_content", Some(token)).await?;
        let mut items: Vec<GeneratedContent> = self
            .state
            .lock()
            .unwrap()
            .contents
            .values()
            .filter(|c| c.organization_id == org)
            .filter(|c| params.status.map_or(true, |s| c.status == s))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.title.cmp(&b.title));
        // A held call answers with what the backend held when it arrived.
        let gate = self.list_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            self.list_entered.notify_one();
            gate.notified().await;
        }
        Ok(page(items))
    }

    async fn get_content(&self, token: &str, org: Uuid, content_id: Uuid) -> PortResult<GeneratedContent> {
        self.enter("get_content", Some(token)).await?;
        self.content_in(org, content_id)
    }

    async fn update_content(
        &self,
        token: &str,
        org: Uuid,
        content_id: Uuid,
        update: &ContentUpdate,
    ) -> PortResult<GeneratedContent> {
        self.enter("update_content", Some(token)).await?;
        self.content_in(org, content_id)?;
        let mut state = self.state.lock().unwrap();
        let content = state.contents.get_mut(&content_id).unwrap();
        if let Some(title) = &update.title {
            content.title = title.clone();
        }
        if let Some(status) = update.status {
            content.status = status;
        }
        if let Some(archived) = update.is_archived {
            content.is_archived = archived;
        }
        content.updated_at = Utc::now();
        Ok(content.clone())
    }

    async fn delete_content(&self, token: &str, org: Uuid, content_id: Uuid) -> PortResult<()> {
        self.enter("delete_content", Some(token)).await?;
        self.content_in(org, content_id)?;
        let mut state = self.state.lock().unwrap();
        state.contents.remove(&content_id);
        state.iterations.remove(&content_id);
        Ok(())
    }

    async fn edit_content(
        &self,
        token: &str,
        org: Uuid,
        content_id: Uuid,
        request: &EditRequest,
    ) -> PortResult<ContentIteration> {
        self.enter("edit_content", Some(token)).await?;
        self.content_in(org, content_id)?;
        let mut state = self.state.lock().unwrap();
        let number = state.iterations.get(&content_id).map_or(0, Vec::len) as u32 + 1;
        let iteration = ContentIteration {
            id: Uuid::new_v4(),
            content_id,
            iteration_number: number,
            snapshot: None,
            edit_prompt: Some(request.prompt.clone()),
            edit_type: request.edit_type,
            token_count: 40,
            cost: 0.0012,
            created_at: Utc::now(),
        };
        let content = state.contents.get_mut(&content_id).unwrap();
        content.body = format!("{} (revised: {})", content.body, request.prompt);
        content.token_count += iteration.token_count;
        if content.status < ContentStatus::Edited {
            content.status = ContentStatus::Edited;
        }
        state
            .iterations
            .entry(content_id)
            .or_default()
            .push(iteration.clone());
        Ok(iteration)
    }

    async fn list_iterations(&self, token: &str, org: Uuid, content_id: Uuid) -> PortResult<Vec<ContentIteration>> {
        self.enter("list_iterations", Some(token)).await?;
        self.content_in(org, content_id)?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .iterations
            .get(&content_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn usage_stats(&self, token: &str, org: Uuid, query: &UsageQuery) -> PortResult<UsageStats> {
        self.enter("usage_stats", Some(token)).await?;
        let state = self.state.lock().unwrap();
        let owned: Vec<&GeneratedContent> = state
            .contents
            .values()
            .filter(|c| c.organization_id == org)
            .collect();
        let total_tokens = owned.iter().map(|c| c.token_count).sum();
        let total_cost = owned.iter().map(|c| c.cost).sum();
        Ok(UsageStats {
            organization_id: org,
            period_start: query.start_date,
            period_end: query.end_date,
            total_tokens,
            total_cost,
            total_requests: owned.len() as u64,
            daily: vec![DailyUsage {
                date: Utc::now().date_naive(),
                tokens: total_tokens,
                cost: total_cost,
                requests: owned.len() as u64,
            }],
        })
    }

    async fn usage_limits(&self, token: &str, org: Uuid) -> PortResult<UsageLimits> {
        self.enter("usage_limits", Some(token)).await?;
        let used: u64 = self
            .state
            .lock()
            .unwrap()
            .contents
            .values()
            .filter(|c| c.organization_id == org)
            .map(|c| c.token_count)
            .sum();
        Ok(UsageLimits {
            daily_token_limit: 10_000,
            tokens_used_today: used,
            monthly_token_limit: 300_000,
            tokens_used_this_month: used,
            daily_limit_exceeded: used >= 10_000,
            monthly_limit_exceeded: false,
        })
    }
}

//=========================================================================================
// Wiring
//=========================================================================================

pub fn settings() -> SessionSettings {
    SessionSettings {
        refresh_check_interval: Duration::from_secs(300),
        refresh_leeway: Duration::from_secs(300),
    }
}

pub fn studio_with(api: &Arc<FakeApi>, store: &Arc<MemoryStore>) -> Studio {
    let api: Arc<dyn StudioApi> = api.clone();
    Studio::new(
        api,
        store.clone(),
        Arc::new(EntityCache::new(Duration::from_secs(300))),
        settings(),
    )
}

/// A studio signed in as the fake user, acting in the first organization.
pub async fn signed_in() -> (Arc<FakeApi>, Studio) {
    let api = FakeApi::new();
    let studio = studio_with(&api, &Arc::new(MemoryStore::new()));
    studio.session.initialize().await;
    studio.session.login(EMAIL, PASSWORD).await.unwrap();
    (api, studio)
}
