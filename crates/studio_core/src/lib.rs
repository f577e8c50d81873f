pub mod domain;
pub mod ports;
pub mod validation;

pub use domain::{
    AuthTokens, ConfidenceBand, ContentIteration, ContentSearchParams, ContentStatus, ContentType,
    ContentUpdate, DailyUsage, EditRequest, EditType, FileUpload, GeneratedContent,
    GenerationParams, GenerationRequest, NewStyleProfile, Organization, OrganizationSettings, Page,
    ReferenceArticle, SortOrder, StyleAnalysis, StyleProfile, StyleProfileUpdate,
    StyleSearchParams, UploadedFile, UsageLimits, UsageQuery, UsageStats, User, UserProfile,
    UserUpdate,
};
pub use ports::{KeyValueStore, PortError, PortResult, StudioApi};
pub use validation::ValidationError;
