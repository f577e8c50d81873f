//! services/studio/src/workflow/style.rs
//!
//! Creating a style profile from reference files and following its analysis.

use studio_core::domain::{
    ConfidenceBand, FileUpload, NewStyleProfile, StyleAnalysis, StyleProfile, UploadedFile,
};
use studio_core::validation::{self, ValidationError};
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use crate::client::StudioClient;
use crate::error::{StudioError, StudioResult};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StylePhase {
    Idle,
    Uploading { uploaded: usize, total: usize },
    Analyzing,
    Analyzed { confidence: f64, band: ConfidenceBand },
    Unanalyzed,
}

impl StylePhase {
    fn from_analysis(analysis: Option<&StyleAnalysis>) -> Self {
        match analysis {
            Some(a) => StylePhase::Analyzed {
                confidence: a.confidence,
                band: ConfidenceBand::for_score(a.confidence),
            },
            None => StylePhase::Unanalyzed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StyleWorkflowState {
    pub phase: StylePhase,
    pub style: Option<StyleProfile>,
    pub uploaded: Vec<UploadedFile>,
    pub error: Option<StudioError>,
}

pub struct StyleWorkflow {
    client: StudioClient,
    state: watch::Sender<StyleWorkflowState>,
}

impl StyleWorkflow {
    pub fn new(client: StudioClient) -> Self {
        let (state, _) = watch::channel(StyleWorkflowState {
            phase: StylePhase::Idle,
            style: None,
            uploaded: Vec::new(),
            error: None,
        });
        Self { client, state }
    }

    pub fn subscribe(&self) -> watch::Receiver<StyleWorkflowState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> StyleWorkflowState {
        self.state.borrow().clone()
    }

    /// Follows an existing style.
    pub async fn attach(&mut self, style_id: Uuid) -> StudioResult<StylePhase> {
        let style = self.client.style(style_id).await?;
        let phase = StylePhase::from_analysis(style.analysis.as_ref());
        self.state.send_modify(|s| {
            s.phase = phase;
            s.style = Some(style);
            s.error = None;
        });
        Ok(phase)
    }

    /// Creates a style, uploads every file and requests an analysis.
    ///
    /// All inputs are checked before anything is sent. Files already uploaded
    /// when a later upload fails stay attached to the new style.
    pub async fn create_from_files(
        &mut self,
        name: &str,
        description: Option<&str>,
        files: Vec<FileUpload>,
    ) -> StudioResult<StyleProfile> {
        let name = validation::validate_style_name(name)?;
        if files.is_empty() {
            return Err(ValidationError::new("files", "Add at least one reference file").into());
        }
        for file in &files {
            validation::validate_upload(file)?;
        }

        let style = self
            .client
            .create_style(NewStyleProfile {
                name,
                description: description.map(str::to_string),
                tags: Vec::new(),
            })
            .await?;
        let total = files.len();
        self.state.send_replace(StyleWorkflowState {
            phase: StylePhase::Uploading { uploaded: 0, total },
            style: Some(style.clone()),
            uploaded: Vec::new(),
            error: None,
        });

        for (index, file) in files.iter().enumerate() {
            match self.client.upload_reference(style.id, file).await {
                Ok(uploaded) => {
                    self.state.send_modify(|s| {
                        s.uploaded.push(uploaded);
                        s.phase = StylePhase::Uploading {
                            uploaded: index + 1,
                            total,
                        };
                    });
                }
                Err(e) => {
                    warn!(style_id = %style.id, file = %file.filename, error = %e, "Reference upload failed.");
                    // Some files may be stored already.
                    self.client.invalidate_style(style.id).await?;
                    self.state.send_modify(|s| {
                        s.phase = StylePhase::Unanalyzed;
                        s.error = Some(e.clone());
                    });
                    return Err(e);
                }
            }
        }
        self.client.invalidate_style(style.id).await?;
        info!(style_id = %style.id, files = total, "Reference files uploaded.");

        self.state.send_modify(|s| s.phase = StylePhase::Analyzing);
        let phase = match self.client.request_analysis(style.id, false).await {
            Ok(analysis) => StylePhase::from_analysis(analysis.as_ref()),
            Err(e) => {
                warn!(style_id = %style.id, error = %e, "Style analysis request failed.");
                self.state.send_modify(|s| s.error = Some(e));
                StylePhase::Unanalyzed
            }
        };

        let style = match self.client.style(style.id).await {
            Ok(fresh) => fresh,
            Err(e) => {
                warn!(style_id = %style.id, error = %e, "Could not reload style after analysis.");
                style
            }
        };
        self.state.send_modify(|s| {
            s.phase = phase;
            s.style = Some(style.clone());
        });
        Ok(style)
    }

    /// Re-reads the analysis of the followed style. Analysis runs server side;
    /// this only asks for its current result.
    pub async fn refresh(&mut self) -> StudioResult<StylePhase> {
        let Some(style_id) = self.state.borrow().style.as_ref().map(|s| s.id) else {
            return Err(StudioError::InvalidState("no style to refresh".to_string()));
        };
        self.client.invalidate_style(style_id).await?;
        let analysis = self.client.style_analysis(style_id).await?;
        let phase = StylePhase::from_analysis(analysis.as_ref());
        self.state.send_modify(|s| {
            s.phase = phase;
            if let Some(style) = s.style.as_mut() {
                style.analysis = analysis;
            }
            s.error = None;
        });
        Ok(phase)
    }
}
