//! services/studio/src/session.rs
//!
//! The session and organization context: who is signed in, with which
//! credentials, and which organization every scoped request belongs to.
//!
//! A `SessionContext` is constructed once and shared behind an `Arc`. Its
//! observable state is published on a `watch` channel; the access token lives
//! in its own cell so that a refresh replaces it atomically.

use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use studio_core::domain::{AuthTokens, Organization, OrganizationSettings, User, UserProfile, UserUpdate};
use studio_core::ports::{KeyValueStore, PortError, PortResult, StudioApi};
use studio_core::validation;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::{CacheKey, EntityCache, Mutation};
use crate::config::Config;
use crate::error::{StudioError, StudioResult};

/// Store key of the persisted session record.
pub const SESSION_KEY: &str = "studio.session";
/// Store key of the last chosen organization. Survives logout.
pub const PREFERRED_ORGANIZATION_KEY: &str = "studio.organization";

//=========================================================================================
// Observable State
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    /// Before `initialize` has looked at the persisted session.
    Unknown,
    Authenticated,
    Anonymous,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub status: AuthStatus,
    pub user: Option<User>,
    pub organization: Option<Organization>,
    pub organizations: Vec<Organization>,
}

impl SessionSnapshot {
    fn with_status(status: AuthStatus) -> Self {
        Self {
            status,
            user: None,
            organization: None,
            organizations: Vec::new(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.status == AuthStatus::Authenticated
    }
}

/// The lifetime of one active organization. Cancelled when the user switches
/// away from it or signs out.
#[derive(Debug, Clone)]
pub struct OrgScope {
    organization_id: Uuid,
    token: CancellationToken,
}

impl OrgScope {
    fn new(organization_id: Uuid) -> Self {
        Self {
            organization_id,
            token: CancellationToken::new(),
        }
    }

    pub fn organization_id(&self) -> Uuid {
        self.organization_id
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Runs `fut` unless the scope ends first. A result that completes after
    /// the scope ended is discarded as well.
    pub async fn guard<T, Fut>(&self, fut: Fut) -> StudioResult<T>
    where
        Fut: Future<Output = StudioResult<T>>,
    {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(StudioError::OrganizationChanged),
            result = fut => {
                if self.token.is_cancelled() {
                    Err(StudioError::OrganizationChanged)
                } else {
                    result
                }
            }
        }
    }

    fn cancel(&self) {
        self.token.cancel();
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub refresh_check_interval: Duration,
    /// Refresh proactively once the access token expires within this window.
    pub refresh_leeway: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            refresh_check_interval: Duration::from_secs(300),
            refresh_leeway: Duration::from_secs(300),
        }
    }
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            refresh_check_interval: config.refresh_check_interval,
            ..Self::default()
        }
    }
}

//=========================================================================================
// Persisted Records
//=========================================================================================

#[derive(Serialize, Deserialize)]
struct PersistedUser {
    id: Uuid,
    email: String,
    username: String,
    display_name: Option<String>,
    is_verified: bool,
    locale: Option<String>,
    timezone: Option<String>,
}

impl PersistedUser {
    fn from_domain(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
            display_name: user.display_name.clone(),
            is_verified: user.is_verified,
            locale: user.locale.clone(),
            timezone: user.timezone.clone(),
        }
    }

    fn to_domain(self) -> User {
        User {
            id: self.id,
            email: self.email,
            username: self.username,
            display_name: self.display_name,
            is_verified: self.is_verified,
            locale: self.locale,
            timezone: self.timezone,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct PersistedOrganization {
    id: Uuid,
    name: String,
    slug: String,
    default_style_id: Option<Uuid>,
    monthly_token_quota: Option<u64>,
}

impl PersistedOrganization {
    fn from_domain(org: &Organization) -> Self {
        Self {
            id: org.id,
            name: org.name.clone(),
            slug: org.slug.clone(),
            default_style_id: org.settings.default_style_id,
            monthly_token_quota: org.settings.monthly_token_quota,
        }
    }

    fn to_domain(self) -> Organization {
        Organization {
            id: self.id,
            name: self.name,
            slug: self.slug,
            settings: OrganizationSettings {
                default_style_id: self.default_style_id,
                monthly_token_quota: self.monthly_token_quota,
            },
        }
    }
}

#[derive(Serialize, Deserialize)]
struct PersistedSession {
    access_token: String,
    refresh_token: String,
    expires_at: DateTime<Utc>,
    user: Option<PersistedUser>,
    #[serde(default)]
    organizations: Vec<PersistedOrganization>,
    organization_id: Option<Uuid>,
}

fn choose_organization(organizations: &[Organization], preferred: Option<Uuid>) -> Option<Organization> {
    preferred
        .and_then(|id| organizations.iter().find(|o| o.id == id))
        .or_else(|| organizations.first())
        .cloned()
}

//=========================================================================================
// The Session Context
//=========================================================================================

pub struct SessionContext {
    api: Arc<dyn StudioApi>,
    store: Arc<dyn KeyValueStore>,
    cache: Arc<EntityCache>,
    settings: SessionSettings,
    tokens: RwLock<Option<Arc<AuthTokens>>>,
    /// Serializes refresh exchanges so concurrent 401s share one refresh.
    refresh_gate: Mutex<()>,
    scope: RwLock<Option<OrgScope>>,
    state: watch::Sender<SessionSnapshot>,
    revalidation: Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl SessionContext {
    pub fn new(
        api: Arc<dyn StudioApi>,
        store: Arc<dyn KeyValueStore>,
        cache: Arc<EntityCache>,
        settings: SessionSettings,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(SessionSnapshot::with_status(AuthStatus::Unknown));
        Arc::new(Self {
            api,
            store,
            cache,
            settings,
            tokens: RwLock::new(None),
            refresh_gate: Mutex::new(()),
            scope: RwLock::new(None),
            state,
            revalidation: Mutex::new(None),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn cache(&self) -> &Arc<EntityCache> {
        &self.cache
    }

    pub async fn tokens(&self) -> Option<Arc<AuthTokens>> {
        self.tokens.read().await.clone()
    }

    pub async fn access_token(&self) -> StudioResult<String> {
        self.tokens
            .read()
            .await
            .as_ref()
            .map(|t| t.access_token.clone())
            .ok_or(StudioError::NoSession)
    }

    /// The scope every organization-bound request must run in.
    pub async fn scope(&self) -> StudioResult<OrgScope> {
        if self.tokens.read().await.is_none() {
            return Err(StudioError::NoSession);
        }
        self.scope
            .read()
            .await
            .clone()
            .ok_or(StudioError::NoOrganization)
    }

    // --- Startup ---

    /// Restores the persisted session without waiting for the network.
    ///
    /// Valid tokens mark the session authenticated at once and start a
    /// background refetch of the user; anything else leaves it anonymous.
    pub async fn initialize(self: &Arc<Self>) -> SessionSnapshot {
        let record = match self.store.get(SESSION_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<PersistedSession>(&raw) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(error = %e, "Discarding unreadable persisted session.");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Failed to read persisted session.");
                None
            }
        };

        let record = match record {
            Some(record) if record.expires_at > Utc::now() => record,
            Some(_) => {
                info!("Persisted session has expired.");
                self.clear_local().await;
                return self.snapshot();
            }
            None => {
                self.clear_local().await;
                return self.snapshot();
            }
        };

        let organizations: Vec<Organization> = record
            .organizations
            .into_iter()
            .map(PersistedOrganization::to_domain)
            .collect();
        let organization = choose_organization(&organizations, record.organization_id);
        let user = record.user.map(PersistedUser::to_domain);

        *self.tokens.write().await = Some(Arc::new(AuthTokens {
            access_token: record.access_token,
            refresh_token: record.refresh_token,
            expires_at: record.expires_at,
        }));
        self.switch_scope(organization.as_ref()).await;
        self.state.send_replace(SessionSnapshot {
            status: AuthStatus::Authenticated,
            user,
            organization,
            organizations,
        });
        info!("Restored persisted session.");

        let session = Arc::clone(self);
        let handle = tokio::spawn(async move {
            if let Err(e) = session.revalidate_user().await {
                warn!(error = %e, "Background user revalidation failed.");
            }
        });
        *self.revalidation.lock().await = Some(handle);

        self.snapshot()
    }

    /// Refetches the current user and replaces the cached profile.
    pub async fn revalidate_user(&self) -> StudioResult<UserProfile> {
        let api = &self.api;
        let profile = self
            .authorized(move |token| async move { api.current_user(&token).await })
            .await?;
        if self.tokens.read().await.is_none() {
            // Signed out while the request was in flight.
            return Err(StudioError::NoSession);
        }
        let preferred = self.snapshot().organization.map(|o| o.id);
        self.install_profile(&profile, preferred).await;
        debug!(user_id = %profile.user.id, "User revalidated.");
        Ok(profile)
    }

    /// Waits for the background revalidation started by `initialize`, if any.
    pub async fn wait_for_revalidation(&self) {
        let handle = self.revalidation.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Revalidation task ended abnormally.");
            }
        }
    }

    // --- Sign in / out ---

    pub async fn login(&self, email: &str, password: &str) -> StudioResult<UserProfile> {
        validation::validate_credentials(email, password)?;

        let tokens = self.api.login(email.trim(), password).await.map_err(|e| match e {
            PortError::Unauthorized => StudioError::Rejected("Invalid email or password".to_string()),
            other => other.into(),
        })?;
        let profile = self.api.current_user(&tokens.access_token).await?;

        let preferred = self.preferred_organization();
        // Requests of the previous session end here, even when the new one
        // lands in the same organization.
        self.end_scope().await;
        self.cache.clear().await;
        *self.tokens.write().await = Some(Arc::new(tokens));
        self.install_profile(&profile, preferred).await;
        info!(user_id = %profile.user.id, "Signed in.");
        Ok(profile)
    }

    /// Signs out. The server call is best effort; local state is always cleared.
    pub async fn logout(&self) {
        let tokens = self.tokens.write().await.take();
        if let Some(tokens) = tokens {
            if let Err(e) = self.api.logout(&tokens.access_token).await {
                warn!(error = %e, "Server-side logout failed; clearing local session anyway.");
            }
        }
        self.clear_local().await;
        info!("Signed out.");
    }

    async fn clear_local(&self) {
        *self.tokens.write().await = None;
        self.end_scope().await;
        self.cache.clear().await;
        if let Err(e) = self.store.remove(SESSION_KEY) {
            warn!(error = %e, "Failed to remove persisted session.");
        }
        self.state
            .send_replace(SessionSnapshot::with_status(AuthStatus::Anonymous));
    }

    // --- Organization ---

    /// Switches the active organization. Requests still running for the
    /// previous one end with `OrganizationChanged` and its cache entries are dropped.
    pub async fn set_organization(&self, organization_id: Uuid) -> StudioResult<Organization> {
        let snapshot = self.snapshot();
        if !snapshot.is_authenticated() {
            return Err(StudioError::NoSession);
        }
        let organization = snapshot
            .organizations
            .iter()
            .find(|o| o.id == organization_id)
            .cloned()
            .ok_or_else(|| StudioError::Forbidden("Not a member of this organization".to_string()))?;

        if snapshot.organization.as_ref().map(|o| o.id) == Some(organization_id) {
            return Ok(organization);
        }

        self.switch_scope(Some(&organization)).await;
        self.state
            .send_modify(|s| s.organization = Some(organization.clone()));
        self.persist().await;
        info!(organization_id = %organization_id, "Switched organization.");
        Ok(organization)
    }

    async fn switch_scope(&self, organization: Option<&Organization>) {
        let mut scope = self.scope.write().await;
        let next = organization.map(|o| o.id);
        if scope.as_ref().map(OrgScope::organization_id) == next {
            return;
        }
        if let Some(previous) = scope.take() {
            previous.cancel();
            self.cache.remove_organization(previous.organization_id).await;
        }
        *scope = next.map(OrgScope::new);
    }

    async fn end_scope(&self) {
        if let Some(scope) = self.scope.write().await.take() {
            scope.cancel();
        }
    }

    fn preferred_organization(&self) -> Option<Uuid> {
        match self.store.get(PREFERRED_ORGANIZATION_KEY) {
            Ok(value) => value.and_then(|raw| raw.parse().ok()),
            Err(e) => {
                warn!(error = %e, "Failed to read organization preference.");
                None
            }
        }
    }

    // --- Tokens ---

    /// Runs an authorized call. A 401 triggers one token refresh and a single
    /// replay; a second 401 signs the user out.
    pub async fn authorized<T, F, Fut>(&self, call: F) -> StudioResult<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = PortResult<T>>,
    {
        self.authorized_with(StudioError::from, call).await
    }

    /// Like `authorized`, with a custom mapping for errors other than 401.
    pub async fn authorized_with<T, F, Fut>(
        &self,
        map_err: fn(PortError) -> StudioError,
        call: F,
    ) -> StudioResult<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = PortResult<T>>,
    {
        let token = self.access_token().await?;
        match call(token.clone()).await {
            Err(PortError::Unauthorized) => {}
            other => return other.map_err(map_err),
        }

        debug!("Access token rejected; refreshing.");
        let fresh = self.refresh_after(Some(&token)).await?;
        match call(fresh).await {
            Err(PortError::Unauthorized) => {
                warn!("Request rejected again after token refresh; signing out.");
                self.logout().await;
                Err(StudioError::Unauthenticated)
            }
            other => other.map_err(map_err),
        }
    }

    /// Exchanges the refresh token for a new pair.
    pub async fn refresh_token(&self) -> StudioResult<()> {
        self.refresh_after(None).await.map(|_| ())
    }

    /// Single-flight refresh. When `failed` is given and the current access
    /// token differs from it, another caller already refreshed and the current
    /// token is returned as is.
    async fn refresh_after(&self, failed: Option<&str>) -> StudioResult<String> {
        let gate = self.refresh_gate.lock().await;
        let current = self
            .tokens
            .read()
            .await
            .clone()
            .ok_or(StudioError::Unauthenticated)?;
        if let Some(failed) = failed {
            if current.access_token != failed {
                return Ok(current.access_token.clone());
            }
        }

        match self.api.refresh(&current.refresh_token).await {
            Ok(tokens) => {
                let access = tokens.access_token.clone();
                *self.tokens.write().await = Some(Arc::new(tokens));
                drop(gate);
                self.persist().await;
                info!("Access token refreshed.");
                Ok(access)
            }
            Err(e) => {
                drop(gate);
                warn!(error = %e, "Token refresh failed; signing out.");
                self.logout().await;
                Err(StudioError::Unauthenticated)
            }
        }
    }

    async fn needs_refresh(&self) -> bool {
        let leeway = chrono::Duration::from_std(self.settings.refresh_leeway)
            .unwrap_or_else(|_| chrono::Duration::minutes(5));
        self.tokens
            .read()
            .await
            .as_ref()
            .map(|t| t.expires_within(Utc::now(), leeway))
            .unwrap_or(false)
    }

    /// Starts the proactive refresh loop. It holds only a weak reference and
    /// stops on `shutdown` or once the context is dropped.
    pub fn spawn_refresh_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let shutdown = self.shutdown.clone();
        let period = self.settings.refresh_check_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let Some(session) = weak.upgrade() else {
                    break;
                };
                if session.needs_refresh().await {
                    if let Err(e) = session.refresh_token().await {
                        warn!(error = %e, "Proactive token refresh failed.");
                    }
                }
            }
            debug!("Refresh loop stopped.");
        })
    }

    /// Stops background work owned by the context.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        if let Some(handle) = self.revalidation.lock().await.take() {
            handle.abort();
        }
    }

    // --- Profile ---

    pub async fn update_profile(&self, update: UserUpdate) -> StudioResult<User> {
        if let Some(username) = update.username.as_deref() {
            if username.trim().is_empty() {
                return Err(validation::ValidationError::new("username", "Username cannot be empty").into());
            }
        }
        let api = &self.api;
        let update = &update;
        let user = self
            .authorized(move |token| async move { api.update_user(&token, update).await })
            .await?;
        self.cache.apply(&Mutation::ProfileUpdated).await;
        self.state.send_modify(|s| s.user = Some(user.clone()));
        self.persist().await;
        Ok(user)
    }

    // --- Internals ---

    async fn install_profile(&self, profile: &UserProfile, preferred: Option<Uuid>) {
        let organization = choose_organization(&profile.organizations, preferred);
        self.switch_scope(organization.as_ref()).await;
        self.state.send_replace(SessionSnapshot {
            status: AuthStatus::Authenticated,
            user: Some(profile.user.clone()),
            organization,
            organizations: profile.organizations.clone(),
        });
        self.cache.insert(CacheKey::user(), profile.clone()).await;
        self.cache
            .insert(CacheKey::organizations(), profile.organizations.clone())
            .await;
        self.persist().await;
    }

    async fn persist(&self) {
        let Some(tokens) = self.tokens.read().await.clone() else {
            return;
        };
        let snapshot = self.snapshot();
        let record = PersistedSession {
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            expires_at: tokens.expires_at,
            user: snapshot.user.as_ref().map(PersistedUser::from_domain),
            organizations: snapshot
                .organizations
                .iter()
                .map(PersistedOrganization::from_domain)
                .collect(),
            organization_id: snapshot.organization.as_ref().map(|o| o.id),
        };
        let result = serde_json::to_string(&record)
            .map_err(|e| PortError::Storage(e.to_string()))
            .and_then(|raw| self.store.set(SESSION_KEY, &raw));
        if let Err(e) = result {
            warn!(error = %e, "Failed to persist session.");
        }
        if let Some(org) = snapshot.organization {
            if let Err(e) = self.store.set(PREFERRED_ORGANIZATION_KEY, &org.id.to_string()) {
                warn!(error = %e, "Failed to persist organization preference.");
            }
        }
    }
}
