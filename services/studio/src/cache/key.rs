//! services/studio/src/cache/key.rs
//!
//! Typed cache keys. Every organization-owned entity is namespaced by the
//! organization id so that switching organizations can never serve data
//! fetched for another tenant.

use studio_core::domain::{ContentSearchParams, StyleSearchParams, UsageQuery};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    User,
    Organizations,
    StyleList,
    StyleDetail,
    StyleAnalysis,
    ReferenceList,
    ContentList,
    ContentDetail,
    IterationList,
    UsageStats,
    UsageLimits,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Organizations => "organizations",
            EntityKind::StyleList => "style_list",
            EntityKind::StyleDetail => "style_detail",
            EntityKind::StyleAnalysis => "style_analysis",
            EntityKind::ReferenceList => "reference_list",
            EntityKind::ContentList => "content_list",
            EntityKind::ContentDetail => "content_detail",
            EntityKind::IterationList => "iteration_list",
            EntityKind::UsageStats => "usage_stats",
            EntityKind::UsageLimits => "usage_limits",
        }
    }
}

/// Canonical descriptor of a list query. Pairs are sorted so that the same
/// filters always produce the same key regardless of how they were built.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListFilter(String);

impl ListFilter {
    /// Returns `None` when no filter is set; an unfiltered list and a list
    /// with only blank filters share one key.
    pub fn from_pairs(mut pairs: Vec<(&'static str, String)>) -> Option<Self> {
        if pairs.is_empty() {
            return None;
        }
        pairs.sort();
        let joined = pairs
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("&");
        Some(Self(joined))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub kind: EntityKind,
    pub organization_id: Option<Uuid>,
    pub entity_id: Option<Uuid>,
    pub filter: Option<ListFilter>,
}

impl CacheKey {
    fn scoped(kind: EntityKind, org: Uuid, entity_id: Option<Uuid>, filter: Option<ListFilter>) -> Self {
        Self {
            kind,
            organization_id: Some(org),
            entity_id,
            filter,
        }
    }

    pub fn user() -> Self {
        Self {
            kind: EntityKind::User,
            organization_id: None,
            entity_id: None,
            filter: None,
        }
    }

    pub fn organizations() -> Self {
        Self {
            kind: EntityKind::Organizations,
            organization_id: None,
            entity_id: None,
            filter: None,
        }
    }

    pub fn style_list(org: Uuid, params: &StyleSearchParams) -> Self {
        Self::scoped(EntityKind::StyleList, org, None, ListFilter::from_pairs(params.to_query_pairs()))
    }

    pub fn style_detail(org: Uuid, style_id: Uuid) -> Self {
        Self::scoped(EntityKind::StyleDetail, org, Some(style_id), None)
    }

    pub fn style_analysis(org: Uuid, style_id: Uuid) -> Self {
        Self::scoped(EntityKind::StyleAnalysis, org, Some(style_id), None)
    }

    pub fn references(org: Uuid, style_id: Uuid) -> Self {
        Self::scoped(EntityKind::ReferenceList, org, Some(style_id), None)
    }

    pub fn content_list(org: Uuid, params: &ContentSearchParams) -> Self {
        Self::scoped(EntityKind::ContentList, org, None, ListFilter::from_pairs(params.to_query_pairs()))
    }

    pub fn content_detail(org: Uuid, content_id: Uuid) -> Self {
        Self::scoped(EntityKind::ContentDetail, org, Some(content_id), None)
    }

    pub fn iterations(org: Uuid, content_id: Uuid) -> Self {
        Self::scoped(EntityKind::IterationList, org, Some(content_id), None)
    }

    pub fn usage_stats(org: Uuid, query: &UsageQuery) -> Self {
        Self::scoped(EntityKind::UsageStats, org, None, ListFilter::from_pairs(query.to_query_pairs()))
    }

    pub fn usage_limits(org: Uuid) -> Self {
        Self::scoped(EntityKind::UsageLimits, org, None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use studio_core::domain::ContentStatus;

    #[test]
    fn blank_filters_share_the_unfiltered_key() {
        let org = Uuid::new_v4();
        let blank = ContentSearchParams {
            query: Some("  ".to_string()),
            ..Default::default()
        };
        assert_eq!(
            CacheKey::content_list(org, &blank),
            CacheKey::content_list(org, &ContentSearchParams::default())
        );
    }

    #[test]
    fn filters_are_order_stable_and_distinct() {
        let a = ListFilter::from_pairs(vec![("status", "edited".into()), ("page", "2".into())]);
        let b = ListFilter::from_pairs(vec![("page", "2".into()), ("status", "edited".into())]);
        assert_eq!(a, b);
        assert_eq!(a.unwrap().as_str(), "page=2&status=edited");

        let org = Uuid::new_v4();
        let edited = ContentSearchParams {
            status: Some(ContentStatus::Edited),
            ..Default::default()
        };
        assert_ne!(
            CacheKey::content_list(org, &edited),
            CacheKey::content_list(org, &ContentSearchParams::default())
        );
    }

    #[test]
    fn same_entity_in_two_organizations_has_two_keys() {
        let id = Uuid::new_v4();
        assert_ne!(
            CacheKey::content_detail(Uuid::new_v4(), id),
            CacheKey::content_detail(Uuid::new_v4(), id)
        );
    }
}
