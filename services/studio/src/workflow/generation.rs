//! services/studio/src/workflow/generation.rs
//!
//! The draft-to-article workflow: compose a brief, generate, then refine the
//! result through edit iterations and finally publish it.
//!
//! ```text
//! Composing --submit--> Generating --ok--> Ready <--> Editing
//!     ^                     |                |
//!     +------- error -------+                +--publish--> Ready (published)
//! ```

use studio_core::domain::{
    ConfidenceBand, ContentIteration, ContentStatus, ContentType, ContentUpdate, EditType,
    GeneratedContent, GenerationParams, GenerationRequest, StyleProfile,
};
use studio_core::validation::{self, GenerationInput, ValidationError};
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use crate::client::StudioClient;
use crate::error::{StudioError, StudioResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowPhase {
    Composing,
    Generating,
    Ready,
    Editing,
}

/// The user's inputs. Preserved across failed submissions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Draft {
    pub title: Option<String>,
    pub brief: String,
    pub style_id: Option<Uuid>,
    pub content_type: ContentType,
    pub params: GenerationParams,
    pub additional_instructions: Option<String>,
}

impl Draft {
    fn as_input(&self) -> GenerationInput<'_> {
        GenerationInput {
            title: self.title.as_deref(),
            brief: &self.brief,
            style_id: self.style_id,
            content_type: self.content_type,
            params: self.params,
            additional_instructions: self.additional_instructions.as_deref(),
        }
    }
}

/// Advisory notes about generation quality. Never block a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationWarning {
    UnanalyzedStyle,
    LowConfidence { percent: u8 },
}

impl GenerationWarning {
    fn for_style(style: &StyleProfile) -> Option<Self> {
        match style.confidence_band() {
            ConfidenceBand::Unanalyzed => Some(GenerationWarning::UnanalyzedStyle),
            ConfidenceBand::Low => Some(GenerationWarning::LowConfidence {
                percent: style.analysis.as_ref().map(|a| a.confidence_percent()).unwrap_or(0),
            }),
            ConfidenceBand::Medium | ConfidenceBand::High => None,
        }
    }

    pub fn message(self) -> String {
        match self {
            GenerationWarning::UnanalyzedStyle => {
                "This style has not been analyzed yet; results may not match it closely.".to_string()
            }
            GenerationWarning::LowConfidence { percent } => format!(
                "Style analysis confidence is low ({}%); results may not match it closely.",
                percent
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkflowState {
    pub phase: WorkflowPhase,
    pub draft: Draft,
    pub content: Option<GeneratedContent>,
    /// The error of the last failed step, cleared by the next attempt.
    pub error: Option<StudioError>,
    pub warning: Option<GenerationWarning>,
}

impl WorkflowState {
    fn composing(draft: Draft) -> Self {
        Self {
            phase: WorkflowPhase::Composing,
            draft,
            content: None,
            error: None,
            warning: None,
        }
    }
}

/// One draft session. Owned by whoever drives it; progress is observable
/// through `subscribe`.
pub struct GenerationWorkflow {
    client: StudioClient,
    state: watch::Sender<WorkflowState>,
    /// Key of the last failed generation and the request it was sent with.
    pending_generation: Option<(GenerationRequest, Uuid)>,
    pending_edit: Option<(Uuid, String, EditType, Uuid)>,
}

impl GenerationWorkflow {
    pub fn new(client: StudioClient) -> Self {
        let (state, _) = watch::channel(WorkflowState::composing(Draft::default()));
        Self {
            client,
            state,
            pending_generation: None,
            pending_edit: None,
        }
    }

    /// Starts in `Ready` on an existing article.
    pub async fn open(client: StudioClient, content_id: Uuid) -> StudioResult<Self> {
        let content = client.content(content_id).await?;
        let workflow = Self::new(client);
        workflow.state.send_modify(|s| {
            s.phase = WorkflowPhase::Ready;
            s.draft = Draft {
                title: Some(content.title.clone()),
                brief: content.brief.clone().unwrap_or_default(),
                style_id: content.style_id,
                content_type: content.content_type,
                ..Draft::default()
            };
            s.content = Some(content);
        });
        Ok(workflow)
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkflowState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> WorkflowState {
        self.state.borrow().clone()
    }

    pub fn phase(&self) -> WorkflowPhase {
        self.state.borrow().phase
    }

    /// Changes the draft. Only allowed while composing.
    pub fn update_draft(&mut self, f: impl FnOnce(&mut Draft)) -> StudioResult<()> {
        self.expect_phase(WorkflowPhase::Composing, "edit the draft")?;
        self.state.send_modify(|s| f(&mut s.draft));
        Ok(())
    }

    /// Leaves a finished article and starts composing a fresh draft.
    pub fn new_draft(&mut self) -> StudioResult<()> {
        self.expect_phase(WorkflowPhase::Ready, "start a new draft")?;
        self.pending_generation = None;
        self.pending_edit = None;
        self.state.send_replace(WorkflowState::composing(Draft::default()));
        Ok(())
    }

    fn expect_phase(&self, phase: WorkflowPhase, action: &str) -> StudioResult<()> {
        let current = self.phase();
        if current != phase {
            return Err(StudioError::InvalidState(format!(
                "cannot {} while {:?}",
                action, current
            )));
        }
        Ok(())
    }

    fn record_error<T>(&self, phase: WorkflowPhase, err: StudioError) -> StudioResult<T> {
        self.state.send_modify(|s| {
            s.phase = phase;
            s.error = Some(err.clone());
        });
        Err(err)
    }

    /// Validates the draft and generates the article.
    ///
    /// Invalid input is reported without any network call. A style without
    /// reference articles is refused; a weakly analyzed style only warns.
    pub async fn submit(&mut self) -> StudioResult<GeneratedContent> {
        self.expect_phase(WorkflowPhase::Composing, "submit")?;
        let draft = self.state.borrow().draft.clone();

        let mut request = match validation::build_generation_request(&draft.as_input()) {
            Ok(request) => request,
            Err(e) => return self.record_error(WorkflowPhase::Composing, e.into()),
        };

        let style = match self.client.style(request.style_id).await {
            Ok(style) => style,
            Err(e) => return self.record_error(WorkflowPhase::Composing, e),
        };
        if style.reference_total() == 0 {
            let err = ValidationError::new(
                "style",
                "This style has no reference articles; upload at least one first",
            );
            return self.record_error(WorkflowPhase::Composing, err.into());
        }
        let warning = GenerationWarning::for_style(&style);
        if let Some(w) = warning {
            warn!(style_id = %style.id, band = style.confidence_band().label(), "{}", w.message());
        }

        // Identical resubmission after a failure reuses the key so the
        // backend can recognise a duplicate.
        let key = match &self.pending_generation {
            Some((previous, key)) if *previous == request => *key,
            _ => Uuid::new_v4(),
        };
        self.pending_generation = Some((request.clone(), key));
        request.idempotency_key = Some(key);

        self.state.send_modify(|s| {
            s.phase = WorkflowPhase::Generating;
            s.error = None;
            s.warning = warning;
        });
        info!(style_id = %request.style_id, max_tokens = request.max_tokens, "Generating content.");

        match self.client.generate_content(&request).await {
            Ok(mut content) => {
                content.advance_status(ContentStatus::Generated);
                self.pending_generation = None;
                self.state.send_modify(|s| {
                    s.phase = WorkflowPhase::Ready;
                    s.content = Some(content.clone());
                });
                Ok(content)
            }
            Err(e) => {
                warn!(error = %e, "Generation failed.");
                self.record_error(WorkflowPhase::Composing, e)
            }
        }
    }

    /// Asks for a revision of the current article.
    pub async fn edit(&mut self, prompt: &str, edit_type: EditType) -> StudioResult<ContentIteration> {
        self.expect_phase(WorkflowPhase::Ready, "edit")?;
        let Some(content) = self.state.borrow().content.clone() else {
            return Err(StudioError::InvalidState("no content to edit".to_string()));
        };

        let mut request = match validation::build_edit_request(prompt, edit_type) {
            Ok(request) => request,
            Err(e) => return self.record_error(WorkflowPhase::Ready, e.into()),
        };

        let key = match &self.pending_edit {
            Some((id, p, t, key)) if *id == content.id && *p == request.prompt && *t == request.edit_type => *key,
            _ => Uuid::new_v4(),
        };
        self.pending_edit = Some((content.id, request.prompt.clone(), request.edit_type, key));
        request.idempotency_key = Some(key);

        self.state.send_modify(|s| {
            s.phase = WorkflowPhase::Editing;
            s.error = None;
        });

        let iteration = match self.client.edit_content(content.id, &request).await {
            Ok(iteration) => iteration,
            Err(e) => {
                warn!(error = %e, content_id = %content.id, "Edit failed.");
                return self.record_error(WorkflowPhase::Ready, e);
            }
        };
        self.pending_edit = None;

        // The edit answer carries no text; reload the article to pick up the
        // new body. Falls back to the local history if the reload fails.
        let mut updated = match self.client.content(content.id).await {
            Ok(fresh) => fresh,
            Err(e) => {
                warn!(error = %e, "Could not reload content after edit.");
                content.clone()
            }
        };
        updated.advance_status(content.status);
        if !updated.iterations.iter().any(|it| it.id == iteration.id) {
            updated.apply_iteration(iteration.clone());
        }
        updated.advance_status(ContentStatus::Edited);

        self.state.send_modify(|s| {
            s.phase = WorkflowPhase::Ready;
            s.content = Some(updated);
        });
        Ok(iteration)
    }

    /// Marks the current article as published.
    pub async fn publish(&mut self) -> StudioResult<GeneratedContent> {
        self.expect_phase(WorkflowPhase::Ready, "publish")?;
        let Some(content) = self.state.borrow().content.clone() else {
            return Err(StudioError::InvalidState("no content to publish".to_string()));
        };

        let update = ContentUpdate {
            status: Some(ContentStatus::Published),
            ..Default::default()
        };
        match self.client.update_content(content.id, update).await {
            Ok(mut published) => {
                published.iterations = content.iterations;
                published.advance_status(ContentStatus::Published);
                self.state.send_modify(|s| {
                    s.content = Some(published.clone());
                    s.error = None;
                });
                info!(content_id = %published.id, "Content published.");
                Ok(published)
            }
            Err(e) => self.record_error(WorkflowPhase::Ready, e),
        }
    }
}
