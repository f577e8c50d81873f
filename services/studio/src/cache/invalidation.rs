//! services/studio/src/cache/invalidation.rs
//!
//! Declarative invalidation: every mutation names the cache entries it makes
//! stale (and the ones it makes meaningless). Entries are never patched in
//! place.

use uuid::Uuid;

use super::key::{CacheKey, EntityKind};

/// Selects cache entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationTarget {
    /// Every entry of `kind` in the organization, whatever its filter or id.
    Kind { kind: EntityKind, org: Option<Uuid> },
    /// Every entry of `kind` for one entity.
    Entity { kind: EntityKind, org: Option<Uuid>, id: Uuid },
}

impl InvalidationTarget {
    pub fn kind(kind: EntityKind, org: Uuid) -> Self {
        InvalidationTarget::Kind { kind, org: Some(org) }
    }

    pub fn entity(kind: EntityKind, org: Uuid, id: Uuid) -> Self {
        InvalidationTarget::Entity {
            kind,
            org: Some(org),
            id,
        }
    }

    pub fn matches(&self, key: &CacheKey) -> bool {
        match *self {
            InvalidationTarget::Kind { kind, org } => key.kind == kind && key.organization_id == org,
            InvalidationTarget::Entity { kind, org, id } => {
                key.kind == kind && key.organization_id == org && key.entity_id == Some(id)
            }
        }
    }
}

/// A completed server-side change, described by what it touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    StyleCreated { org: Uuid, style_id: Uuid },
    StyleUpdated { org: Uuid, style_id: Uuid },
    StyleDeleted { org: Uuid, style_id: Uuid },
    AnalysisRequested { org: Uuid, style_id: Uuid },
    /// Reference uploads and deletions touch nothing by themselves; the
    /// caller follows up with `StyleInvalidated` for the owning style.
    ReferenceUploaded { org: Uuid, style_id: Uuid },
    ReferenceDeleted { org: Uuid, article_id: Uuid },
    StyleInvalidated { org: Uuid, style_id: Uuid },
    ContentGenerated { org: Uuid, content_id: Uuid },
    ContentEdited { org: Uuid, content_id: Uuid },
    ContentUpdated { org: Uuid, content_id: Uuid },
    ContentDeleted { org: Uuid, content_id: Uuid },
    ProfileUpdated,
}

impl Mutation {
    /// Entries to mark stale.
    pub fn invalidations(&self) -> Vec<InvalidationTarget> {
        use EntityKind::*;
        use InvalidationTarget as T;

        match *self {
            Mutation::StyleCreated { org, style_id }
            | Mutation::StyleUpdated { org, style_id }
            | Mutation::StyleDeleted { org, style_id } => vec![
                T::kind(StyleList, org),
                T::entity(StyleDetail, org, style_id),
            ],
            Mutation::AnalysisRequested { org, style_id } => vec![
                T::kind(StyleList, org),
                T::entity(StyleDetail, org, style_id),
                T::entity(StyleAnalysis, org, style_id),
            ],
            Mutation::ReferenceUploaded { .. } | Mutation::ReferenceDeleted { .. } => Vec::new(),
            Mutation::StyleInvalidated { org, style_id } => vec![
                T::kind(StyleList, org),
                T::entity(StyleDetail, org, style_id),
                T::entity(StyleAnalysis, org, style_id),
                T::entity(ReferenceList, org, style_id),
            ],
            Mutation::ContentGenerated { org, .. } => vec![
                T::kind(ContentList, org),
                T::kind(UsageStats, org),
                T::kind(UsageLimits, org),
            ],
            Mutation::ContentEdited { org, content_id } => vec![
                T::entity(ContentDetail, org, content_id),
                T::entity(IterationList, org, content_id),
                T::kind(UsageStats, org),
                T::kind(UsageLimits, org),
            ],
            Mutation::ContentUpdated { org, content_id } => vec![
                T::kind(ContentList, org),
                T::entity(ContentDetail, org, content_id),
            ],
            Mutation::ContentDeleted { org, .. } => vec![T::kind(ContentList, org)],
            Mutation::ProfileUpdated => vec![T::Kind {
                kind: User,
                org: None,
            }],
        }
    }

    /// Entries to drop outright because the entity no longer exists.
    pub fn removals(&self) -> Vec<InvalidationTarget> {
        use EntityKind::*;
        use InvalidationTarget as T;

        match *self {
            Mutation::ContentDeleted { org, content_id } => vec![
                T::entity(ContentDetail, org, content_id),
                T::entity(IterationList, org, content_id),
            ],
            Mutation::StyleDeleted { org, style_id } => vec![
                T::entity(StyleAnalysis, org, style_id),
                T::entity(ReferenceList, org, style_id),
            ],
            _ => Vec::new(),
        }
    }

    /// Whether this mutation marks or drops `key`.
    pub fn touches(&self, key: &CacheKey) -> bool {
        self.invalidations()
            .into_iter()
            .chain(self.removals())
            .any(|t| t.matches(key))
    }
}
