//! services/studio/src/client.rs
//!
//! The `StudioClient` facade. Every read and mutation the workflows and the
//! CLI perform goes through here: the organization scope is resolved, the call
//! runs through the session's 401 handling and a retry policy, and the cache
//! is consulted or invalidated before the result is handed back.

use std::future::Future;
use std::sync::Arc;

use studio_core::domain::{
    ContentIteration, ContentSearchParams, ContentUpdate, EditRequest, FileUpload,
    GeneratedContent, GenerationRequest, NewStyleProfile, Organization, Page, ReferenceArticle,
    StyleAnalysis, StyleProfile, StyleProfileUpdate, StyleSearchParams, UploadedFile, UsageLimits,
    UsageQuery, UsageStats, UserProfile,
};
use studio_core::ports::{PortError, PortResult, StudioApi};
use studio_core::validation;
use tracing::{debug, info};
use uuid::Uuid;

use crate::cache::{CacheKey, EntityCache, Mutation, RetryPolicy};
use crate::error::{StudioError, StudioResult};
use crate::session::{OrgScope, SessionContext};

#[derive(Clone)]
pub struct StudioClient {
    api: Arc<dyn StudioApi>,
    session: Arc<SessionContext>,
    cache: Arc<EntityCache>,
}

impl StudioClient {
    pub fn new(api: Arc<dyn StudioApi>, session: Arc<SessionContext>) -> Self {
        let cache = Arc::clone(session.cache());
        Self { api, session, cache }
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    pub fn cache(&self) -> &Arc<EntityCache> {
        &self.cache
    }

    /// The organization the next scoped call will run against.
    pub async fn organization_id(&self) -> StudioResult<Uuid> {
        Ok(self.session.scope().await?.organization_id())
    }

    //=====================================================================================
    // Plumbing
    //=====================================================================================

    /// Runs one call inside `scope` with the session's 401 handling and `policy`.
    async fn call<T, F, Fut>(
        &self,
        scope: Option<&OrgScope>,
        op: &'static str,
        policy: RetryPolicy,
        map_err: fn(PortError) -> StudioError,
        call: F,
    ) -> StudioResult<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = PortResult<T>>,
    {
        let attempts = policy.run(op, || self.session.authorized_with(map_err, &call));
        match scope {
            Some(scope) => scope.guard(attempts).await,
            None => attempts.await,
        }
    }

    /// Serves `key` from the cache while fresh, otherwise fetches and stores it.
    /// An answer overtaken by a mutation of the same entry is returned but
    /// not stored.
    async fn query<T, F, Fut>(
        &self,
        scope: Option<&OrgScope>,
        key: CacheKey,
        op: &'static str,
        fetch: F,
    ) -> StudioResult<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(String) -> Fut,
        Fut: Future<Output = PortResult<T>>,
    {
        if let Some(hit) = self.cache.get_fresh::<T>(&key).await {
            debug!(op, "Served from cache.");
            return Ok(hit);
        }
        let observed = self.cache.generation().await;
        match self
            .call(scope, op, RetryPolicy::reads(), StudioError::from, fetch)
            .await
        {
            Ok(value) => {
                self.cache.insert_fetched(key, value.clone(), observed).await;
                Ok(value)
            }
            Err(e) => Err(self.forget_missing(&key, e).await),
        }
    }

    /// A not-found read leaves nothing behind in the cache.
    async fn forget_missing(&self, key: &CacheKey, err: StudioError) -> StudioError {
        if matches!(err, StudioError::NotFound(_)) {
            self.cache.remove_key(key).await;
        }
        err
    }

    /// Runs a mutation and applies its invalidations before returning.
    async fn mutate<T, F, Fut>(
        &self,
        scope: &OrgScope,
        op: &'static str,
        policy: RetryPolicy,
        map_err: fn(PortError) -> StudioError,
        call: F,
        invalidates: impl FnOnce(&T) -> Mutation,
    ) -> StudioResult<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = PortResult<T>>,
    {
        let value = self.call(Some(scope), op, policy, map_err, call).await?;
        self.cache.apply(&invalidates(&value)).await;
        Ok(value)
    }

    //=====================================================================================
    // Reads
    //=====================================================================================

    pub async fn current_user(&self) -> StudioResult<UserProfile> {
        if let Some(profile) = self.cache.get_fresh::<UserProfile>(&CacheKey::user()).await {
            return Ok(profile);
        }
        self.session.revalidate_user().await
    }

    pub async fn organizations(&self) -> StudioResult<Vec<Organization>> {
        let api = &self.api;
        self.query(None, CacheKey::organizations(), "list_organizations", move |token| async move {
            api.list_organizations(&token).await
        })
        .await
    }

    pub async fn styles(&self, params: &StyleSearchParams) -> StudioResult<Page<StyleProfile>> {
        let scope = self.session.scope().await?;
        let org = scope.organization_id();
        let api = &self.api;
        self.query(Some(&scope), CacheKey::style_list(org, params), "list_styles", move |token| async move {
            api.list_styles(&token, org, params).await
        })
        .await
    }

    pub async fn style(&self, style_id: Uuid) -> StudioResult<StyleProfile> {
        let scope = self.session.scope().await?;
        let org = scope.organization_id();
        let api = &self.api;
        self.query(Some(&scope), CacheKey::style_detail(org, style_id), "get_style", move |token| async move {
            api.get_style(&token, org, style_id).await
        })
        .await
    }

    /// The style's current analysis, `None` while it has not been analyzed.
    /// Read from the style record; starting an analysis is `request_analysis`.
    pub async fn style_analysis(&self, style_id: Uuid) -> StudioResult<Option<StyleAnalysis>> {
        let scope = self.session.scope().await?;
        let org = scope.organization_id();
        let api = &self.api;
        self.query(
            Some(&scope),
            CacheKey::style_analysis(org, style_id),
            "get_style_analysis",
            move |token| async move {
                api.get_style(&token, org, style_id)
                    .await
                    .map(|style| style.analysis)
            },
        )
        .await
    }

    pub async fn references(&self, style_id: Uuid) -> StudioResult<Vec<ReferenceArticle>> {
        let scope = self.session.scope().await?;
        let org = scope.organization_id();
        let api = &self.api;
        self.query(Some(&scope), CacheKey::references(org, style_id), "list_references", move |token| async move {
            api.list_references(&token, org, style_id).await
        })
        .await
    }

    pub async fn contents(&self, params: &ContentSearchParams) -> StudioResult<Page<GeneratedContent>> {
        let scope = self.session.scope().await?;
        let org = scope.organization_id();
        let api = &self.api;
        self.query(Some(&scope), CacheKey::content_list(org, params), "list_content", move |token| async move {
            api.list_content(&token, org, params).await
        })
        .await
    }

    /// The article with its full iteration history. Detail and iterations are
    /// fetched concurrently.
    pub async fn content(&self, content_id: Uuid) -> StudioResult<GeneratedContent> {
        let scope = self.session.scope().await?;
        let (mut content, iterations) = futures::try_join!(
            self.content_detail(&scope, content_id),
            self.iterations_in(&scope, content_id)
        )?;
        content.iterations = iterations;
        Ok(content)
    }

    async fn content_detail(&self, scope: &OrgScope, content_id: Uuid) -> StudioResult<GeneratedContent> {
        let org = scope.organization_id();
        let api = &self.api;
        self.query(Some(scope), CacheKey::content_detail(org, content_id), "get_content", move |token| async move {
            api.get_content(&token, org, content_id).await
        })
        .await
    }

    pub async fn iterations(&self, content_id: Uuid) -> StudioResult<Vec<ContentIteration>> {
        let scope = self.session.scope().await?;
        self.iterations_in(&scope, content_id).await
    }

    /// Iteration lists only ever grow: a refetch keeps every iteration seen
    /// before and appends the new ones.
    async fn iterations_in(&self, scope: &OrgScope, content_id: Uuid) -> StudioResult<Vec<ContentIteration>> {
        let org = scope.organization_id();
        let key = CacheKey::iterations(org, content_id);
        if let Some(hit) = self.cache.get_fresh::<Vec<ContentIteration>>(&key).await {
            return Ok(hit);
        }
        let previous: Vec<ContentIteration> = self.cache.peek(&key).await.unwrap_or_default();
        let observed = self.cache.generation().await;

        let api = &self.api;
        let fetched = self
            .call(Some(scope), "list_iterations", RetryPolicy::reads(), StudioError::from, move |token| async move {
                api.list_iterations(&token, org, content_id).await
            })
            .await;
        let fetched = match fetched {
            Ok(list) => list,
            Err(e) => return Err(self.forget_missing(&key, e).await),
        };

        let merged = merge_iterations(previous, fetched);
        self.cache.insert_fetched(key, merged.clone(), observed).await;
        Ok(merged)
    }

    pub async fn usage_stats(&self, query: &UsageQuery) -> StudioResult<UsageStats> {
        let scope = self.session.scope().await?;
        let org = scope.organization_id();
        let api = &self.api;
        self.query(Some(&scope), CacheKey::usage_stats(org, query), "usage_stats", move |token| async move {
            api.usage_stats(&token, org, query).await
        })
        .await
    }

    pub async fn usage_limits(&self) -> StudioResult<UsageLimits> {
        let scope = self.session.scope().await?;
        let org = scope.organization_id();
        let api = &self.api;
        self.query(Some(&scope), CacheKey::usage_limits(org), "usage_limits", move |token| async move {
            api.usage_limits(&token, org).await
        })
        .await
    }

    //=====================================================================================
    // Style Mutations
    //=====================================================================================

    pub async fn create_style(&self, style: NewStyleProfile) -> StudioResult<StyleProfile> {
        let style = NewStyleProfile {
            name: validation::validate_style_name(&style.name)?,
            description: style.description.filter(|d| !d.trim().is_empty()),
            tags: style.tags,
        };
        validation::validate_tags(&style.tags)?;

        let scope = self.session.scope().await?;
        let org = scope.organization_id();
        let api = &self.api;
        let style = &style;
        let created = self
            .mutate(
                &scope,
                "create_style",
                RetryPolicy::none(),
                StudioError::from,
                move |token| async move { api.create_style(&token, org, style).await },
                |created: &StyleProfile| Mutation::StyleCreated { org, style_id: created.id },
            )
            .await?;
        info!(style_id = %created.id, "Style profile created.");
        Ok(created)
    }

    pub async fn update_style(&self, style_id: Uuid, update: StyleProfileUpdate) -> StudioResult<StyleProfile> {
        let update = StyleProfileUpdate {
            name: update
                .name
                .as_deref()
                .map(validation::validate_style_name)
                .transpose()?,
            ..update
        };
        if let Some(tags) = update.tags.as_deref() {
            validation::validate_tags(tags)?;
        }

        let scope = self.session.scope().await?;
        let org = scope.organization_id();
        let api = &self.api;
        let update = &update;
        self.mutate(
            &scope,
            "update_style",
            RetryPolicy::mutations(),
            StudioError::from,
            move |token| async move { api.update_style(&token, org, style_id, update).await },
            |_| Mutation::StyleUpdated { org, style_id },
        )
        .await
    }

    pub async fn set_style_active(&self, style_id: Uuid, active: bool) -> StudioResult<StyleProfile> {
        self.update_style(
            style_id,
            StyleProfileUpdate {
                is_active: Some(active),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn delete_style(&self, style_id: Uuid) -> StudioResult<()> {
        let scope = self.session.scope().await?;
        let org = scope.organization_id();
        let api = &self.api;
        self.mutate(
            &scope,
            "delete_style",
            RetryPolicy::mutations(),
            StudioError::from,
            move |token| async move { api.delete_style(&token, org, style_id).await },
            |_| Mutation::StyleDeleted { org, style_id },
        )
        .await?;
        info!(style_id = %style_id, "Style profile deleted.");
        Ok(())
    }

    /// Uploads one reference file. The owning style's cached entries are left
    /// alone; call `invalidate_style` once the batch is done.
    pub async fn upload_reference(&self, style_id: Uuid, file: &FileUpload) -> StudioResult<UploadedFile> {
        validation::validate_upload(file)?;
        let scope = self.session.scope().await?;
        let org = scope.organization_id();
        let api = &self.api;
        self.mutate(
            &scope,
            "upload_reference",
            RetryPolicy::none(),
            StudioError::from,
            move |token| async move { api.upload_reference(&token, org, style_id, file).await },
            |_| Mutation::ReferenceUploaded { org, style_id },
        )
        .await
    }

    pub async fn delete_reference(&self, article_id: Uuid) -> StudioResult<()> {
        let scope = self.session.scope().await?;
        let org = scope.organization_id();
        let api = &self.api;
        self.mutate(
            &scope,
            "delete_reference",
            RetryPolicy::mutations(),
            StudioError::from,
            move |token| async move { api.delete_reference(&token, org, article_id).await },
            |_| Mutation::ReferenceDeleted { org, article_id },
        )
        .await
    }

    /// Marks every cached view of the style stale: list, detail, analysis
    /// and references.
    pub async fn invalidate_style(&self, style_id: Uuid) -> StudioResult<()> {
        let org = self.organization_id().await?;
        self.cache
            .apply(&Mutation::StyleInvalidated { org, style_id })
            .await;
        Ok(())
    }

    /// Asks the backend to analyze the style. Never retried automatically.
    pub async fn request_analysis(&self, style_id: Uuid, force: bool) -> StudioResult<Option<StyleAnalysis>> {
        let scope = self.session.scope().await?;
        let org = scope.organization_id();
        let api = &self.api;
        self.mutate(
            &scope,
            "analyze_style",
            RetryPolicy::none(),
            StudioError::from_processing,
            move |token| async move { api.analyze_style(&token, org, style_id, force).await },
            |_| Mutation::AnalysisRequested { org, style_id },
        )
        .await
    }

    //=====================================================================================
    // Content Mutations
    //=====================================================================================

    /// Sends a validated generation request. Never retried automatically.
    pub async fn generate_content(&self, request: &GenerationRequest) -> StudioResult<GeneratedContent> {
        let scope = self.session.scope().await?;
        let org = scope.organization_id();
        let api = &self.api;
        let content = self
            .mutate(
                &scope,
                "generate_content",
                RetryPolicy::none(),
                StudioError::from_processing,
                move |token| async move { api.generate_content(&token, org, request).await },
                |content: &GeneratedContent| Mutation::ContentGenerated {
                    org,
                    content_id: content.id,
                },
            )
            .await?;
        // The review screen opens the new article straight from the cache.
        self.cache
            .insert(CacheKey::content_detail(org, content.id), content.clone())
            .await;
        self.cache
            .insert(CacheKey::iterations(org, content.id), Vec::<ContentIteration>::new())
            .await;
        info!(content_id = %content.id, tokens = content.token_count, "Content generated.");
        Ok(content)
    }

    /// Sends a validated edit request. Never retried automatically.
    pub async fn edit_content(&self, content_id: Uuid, request: &EditRequest) -> StudioResult<ContentIteration> {
        let scope = self.session.scope().await?;
        let org = scope.organization_id();
        let api = &self.api;
        let iteration = self
            .mutate(
                &scope,
                "edit_content",
                RetryPolicy::none(),
                StudioError::from_processing,
                move |token| async move { api.edit_content(&token, org, content_id, request).await },
                |_| Mutation::ContentEdited { org, content_id },
            )
            .await?;
        info!(
            content_id = %content_id,
            iteration = iteration.iteration_number,
            "Content edited."
        );
        Ok(iteration)
    }

    /// Updates title, brief, archive flag or status. A status change that
    /// would move the article backwards is refused locally.
    pub async fn update_content(&self, content_id: Uuid, update: ContentUpdate) -> StudioResult<GeneratedContent> {
        let scope = self.session.scope().await?;
        let org = scope.organization_id();

        if let Some(next) = update.status {
            let cached = self
                .cache
                .peek::<GeneratedContent>(&CacheKey::content_detail(org, content_id))
                .await;
            if let Some(current) = cached {
                if next < current.status {
                    return Err(StudioError::InvalidState(format!(
                        "cannot move content from {} back to {}",
                        current.status.as_str(),
                        next.as_str()
                    )));
                }
            }
        }

        let api = &self.api;
        let update = &update;
        let content = self
            .mutate(
                &scope,
                "update_content",
                RetryPolicy::mutations(),
                StudioError::from,
                move |token| async move { api.update_content(&token, org, content_id, update).await },
                |_| Mutation::ContentUpdated { org, content_id },
            )
            .await?;
        self.cache
            .insert(CacheKey::content_detail(org, content_id), content.clone())
            .await;
        Ok(content)
    }

    pub async fn delete_content(&self, content_id: Uuid) -> StudioResult<()> {
        let scope = self.session.scope().await?;
        let org = scope.organization_id();
        let api = &self.api;
        self.mutate(
            &scope,
            "delete_content",
            RetryPolicy::mutations(),
            StudioError::from,
            move |token| async move { api.delete_content(&token, org, content_id).await },
            |_| Mutation::ContentDeleted { org, content_id },
        )
        .await?;
        info!(content_id = %content_id, "Content deleted.");
        Ok(())
    }
}

/// Keeps `previous` in order and appends fetched iterations not yet seen.
fn merge_iterations(previous: Vec<ContentIteration>, fetched: Vec<ContentIteration>) -> Vec<ContentIteration> {
    let mut merged = previous;
    for iteration in fetched {
        if !merged.iter().any(|it| it.id == iteration.id) {
            merged.push(iteration);
        }
    }
    merged
}
