use std::{collections::BTreeSet, sync::Arc};

use serde::{Deserialize, Serialize};
use shared::{
    domain::{
        Answer, FeedbackCatalog, ProjectId, QuestionAnswer, Rating, SectionFeedback, SectionId,
        SectionSpec, WizardStep,
    },
    protocol::{FeedbackReceipt, FeedbackSubmission, SubmissionType},
};
use storage::DraftKvStore;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    draft::{DraftOptions, DraftStore},
    gateway::{SubmissionError, SubmissionGateway},
    gesture::{GestureConfig, GestureIntent, GestureNavigator, Point},
};

pub const DRAFT_KEY_PREFIX: &str = "feedback:";

pub fn draft_key(project_id: &ProjectId) -> String {
    format!("{DRAFT_KEY_PREFIX}{project_id}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WizardState {
    pub step: WizardStep,
    pub current_section_index: usize,
    pub section_feedback: Vec<SectionFeedback>,
    pub question_answers: Vec<QuestionAnswer>,
    pub general_comment: String,
}

impl WizardState {
    pub fn fresh(catalog: &FeedbackCatalog) -> Self {
        Self {
            step: WizardStep::Intro,
            current_section_index: 0,
            section_feedback: catalog
                .sections
                .iter()
                .map(|section| SectionFeedback::blank(section.id.clone()))
                .collect(),
            question_answers: catalog
                .questions
                .iter()
                .map(QuestionAnswer::unanswered)
                .collect(),
            general_comment: String::new(),
        }
    }

    // A draft only resumes against the catalog shape it was written for.
    pub fn fits_catalog(&self, catalog: &FeedbackCatalog) -> bool {
        let sections_match = self.section_feedback.len() == catalog.sections.len()
            && self
                .section_feedback
                .iter()
                .zip(&catalog.sections)
                .all(|(feedback, spec)| feedback.section_id == spec.id);
        let questions_match = self.question_answers.len() == catalog.questions.len()
            && self
                .question_answers
                .iter()
                .zip(&catalog.questions)
                .all(|(answer, spec)| answer.question_id == spec.id);
        let index_in_bounds = if catalog.sections.is_empty() {
            self.current_section_index == 0
        } else {
            self.current_section_index < catalog.sections.len()
        };
        let step_reachable = match self.step {
            WizardStep::Intro | WizardStep::Summary => true,
            WizardStep::Sections => !catalog.sections.is_empty(),
            WizardStep::Questions => catalog.has_questions(),
        };

        sections_match
            && questions_match
            && index_in_bounds
            && step_reachable
            && self
                .section_feedback
                .iter()
                .flat_map(|feedback| feedback.presets.iter())
                .all(|preset| catalog.has_preset(preset))
    }

    pub fn change_count(&self) -> usize {
        let sections = self
            .section_feedback
            .iter()
            .filter(|feedback| feedback.requests_change())
            .count();
        let questions = self
            .question_answers
            .iter()
            .filter(|answer| answer.requests_change())
            .count();
        sections + questions
    }

    pub fn rated_count(&self) -> usize {
        self.section_feedback
            .iter()
            .filter(|feedback| feedback.rating.is_some())
            .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryAction {
    Approve,
    SubmitFeedback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitChoice {
    Primary,
    Anyway,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub rated: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRow {
    pub index: usize,
    pub section_id: SectionId,
    pub display_name: String,
    pub rating: Option<Rating>,
    pub comment: String,
    pub preset_labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryView {
    pub sections: Vec<SummaryRow>,
    pub questions: Vec<QuestionAnswer>,
    pub general_comment: String,
    pub change_count: usize,
    pub primary_action: PrimaryAction,
}

#[derive(Debug, Error)]
pub enum WizardError {
    #[error("cannot {action} from the {step} step")]
    InvalidTransition {
        action: &'static str,
        step: WizardStep,
    },
    #[error("section index {index} is out of range for {len} sections")]
    SectionOutOfRange { index: usize, len: usize },
    #[error("question index {index} is out of range for {len} questions")]
    QuestionOutOfRange { index: usize, len: usize },
    #[error("unknown preset tag '{0}'")]
    UnknownPreset(String),
    #[error("a submission is already in flight")]
    Busy,
    #[error("no submission is in flight")]
    NotSubmitting,
    #[error("feedback has already been submitted")]
    AlreadySubmitted,
    #[error(transparent)]
    Submission(#[from] SubmissionError),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WizardOptions {
    pub draft: DraftOptions,
    pub gesture: GestureConfig,
}

pub struct WizardController {
    project_id: ProjectId,
    catalog: FeedbackCatalog,
    draft: DraftStore<WizardState>,
    navigator: GestureNavigator,
    gateway: Arc<dyn SubmissionGateway>,
    // Sections whose comment/preset editor is open. View state, not persisted.
    expanded: BTreeSet<usize>,
    restored: bool,
    in_flight: Option<SubmissionType>,
    completed: Option<SubmissionType>,
    last_error: Option<String>,
}

impl WizardController {
    pub async fn mount(
        project_id: ProjectId,
        catalog: FeedbackCatalog,
        backend: Arc<dyn DraftKvStore>,
        gateway: Arc<dyn SubmissionGateway>,
        options: WizardOptions,
    ) -> Self {
        let fresh = WizardState::fresh(&catalog);
        let (draft, restoration) = DraftStore::open_with(
            backend,
            draft_key(&project_id),
            fresh,
            options.draft,
            |stored: &WizardState| stored.fits_catalog(&catalog),
        )
        .await;

        let restored = restoration.was_restored();
        let state = restoration.into_inner();
        let expanded = state
            .section_feedback
            .iter()
            .enumerate()
            .filter(|(_, feedback)| feedback.requests_change())
            .map(|(index, _)| index)
            .collect();
        info!(
            project_id = %project_id,
            restored,
            step = %state.step,
            section_index = state.current_section_index,
            "feedback wizard mounted"
        );

        let mut controller = Self {
            project_id,
            catalog,
            draft,
            navigator: GestureNavigator::new(options.gesture),
            gateway,
            expanded,
            restored,
            in_flight: None,
            completed: None,
            last_error: None,
        };
        controller.sync_navigator();
        controller
    }

    pub fn project_id(&self) -> &ProjectId {
        &self.project_id
    }

    pub fn catalog(&self) -> &FeedbackCatalog {
        &self.catalog
    }

    pub fn was_restored(&self) -> bool {
        self.restored
    }

    pub fn state(&self) -> WizardState {
        self.draft.data()
    }

    pub fn step(&self) -> WizardStep {
        self.draft.read(|state| state.step)
    }

    pub fn current_section_index(&self) -> usize {
        self.draft.read(|state| state.current_section_index)
    }

    pub fn current_section(&self) -> Option<&SectionSpec> {
        self.catalog.sections.get(self.current_section_index())
    }

    pub fn has_questions(&self) -> bool {
        self.catalog.has_questions()
    }

    pub fn is_submitting(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn completed(&self) -> Option<SubmissionType> {
        self.completed
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.draft.has_unsaved_changes()
    }

    pub fn last_saved(&self) -> Option<i64> {
        self.draft.last_saved()
    }

    pub fn is_editor_expanded(&self, index: usize) -> bool {
        self.expanded.contains(&index)
    }

    pub fn change_count(&self) -> usize {
        self.draft.read(WizardState::change_count)
    }

    pub fn primary_action(&self) -> PrimaryAction {
        if self.change_count() == 0 {
            PrimaryAction::Approve
        } else {
            PrimaryAction::SubmitFeedback
        }
    }

    pub fn progress(&self) -> Progress {
        Progress {
            rated: self.draft.read(WizardState::rated_count),
            total: self.catalog.sections.len(),
        }
    }

    pub fn summary(&self) -> SummaryView {
        let state = self.draft.data();
        let sections = self
            .catalog
            .sections
            .iter()
            .zip(&state.section_feedback)
            .enumerate()
            .map(|(index, (spec, feedback))| SummaryRow {
                index,
                section_id: spec.id.clone(),
                display_name: spec.display_name.clone(),
                rating: feedback.rating,
                comment: feedback.comment.clone(),
                preset_labels: self
                    .catalog
                    .presets
                    .iter()
                    .filter(|preset| feedback.presets.contains(&preset.id))
                    .map(|preset| preset.label.clone())
                    .collect(),
            })
            .collect();
        let change_count = state.change_count();
        SummaryView {
            sections,
            questions: state.question_answers,
            general_comment: state.general_comment,
            change_count,
            primary_action: self.primary_action(),
        }
    }

    pub fn start(&mut self) -> Result<WizardStep, WizardError> {
        self.ensure_editable()?;
        let next = match self.step() {
            WizardStep::Intro if self.catalog.sections.is_empty() => self.exit_step(),
            WizardStep::Intro => WizardStep::Sections,
            step @ (WizardStep::Sections | WizardStep::Questions | WizardStep::Summary) => {
                return Err(WizardError::InvalidTransition {
                    action: "start",
                    step,
                })
            }
        };
        self.move_to(next, 0);
        Ok(next)
    }

    pub fn advance(&mut self) -> Result<WizardStep, WizardError> {
        self.ensure_editable()?;
        match self.step() {
            WizardStep::Sections => {
                let index = self.current_section_index();
                if index + 1 < self.catalog.sections.len() {
                    self.move_to(WizardStep::Sections, index + 1);
                    Ok(WizardStep::Sections)
                } else {
                    let next = self.exit_step();
                    self.move_to(next, index);
                    Ok(next)
                }
            }
            step @ (WizardStep::Intro | WizardStep::Questions | WizardStep::Summary) => {
                Err(WizardError::InvalidTransition {
                    action: "advance",
                    step,
                })
            }
        }
    }

    pub fn retreat(&mut self) -> Result<WizardStep, WizardError> {
        self.ensure_editable()?;
        match self.step() {
            WizardStep::Sections => {
                let index = self.current_section_index();
                if index > 0 {
                    self.move_to(WizardStep::Sections, index - 1);
                }
                Ok(WizardStep::Sections)
            }
            step @ (WizardStep::Intro | WizardStep::Questions | WizardStep::Summary) => {
                Err(WizardError::InvalidTransition {
                    action: "retreat",
                    step,
                })
            }
        }
    }

    pub fn view_summary(&mut self) -> Result<(), WizardError> {
        self.ensure_editable()?;
        match self.step() {
            WizardStep::Questions => {
                let index = self.current_section_index();
                self.move_to(WizardStep::Summary, index);
                Ok(())
            }
            step @ (WizardStep::Intro | WizardStep::Sections | WizardStep::Summary) => {
                Err(WizardError::InvalidTransition {
                    action: "view the summary",
                    step,
                })
            }
        }
    }

    pub fn edit_section(&mut self, index: usize) -> Result<(), WizardError> {
        self.ensure_editable()?;
        self.check_section(index)?;
        match self.step() {
            WizardStep::Summary => {
                self.move_to(WizardStep::Sections, index);
                Ok(())
            }
            step @ (WizardStep::Intro | WizardStep::Sections | WizardStep::Questions) => {
                Err(WizardError::InvalidTransition {
                    action: "edit a section",
                    step,
                })
            }
        }
    }

    pub fn edit_questions(&mut self) -> Result<(), WizardError> {
        self.ensure_editable()?;
        match self.step() {
            WizardStep::Summary if self.has_questions() => {
                let index = self.current_section_index();
                self.move_to(WizardStep::Questions, index);
                Ok(())
            }
            step @ (WizardStep::Intro
            | WizardStep::Sections
            | WizardStep::Questions
            | WizardStep::Summary) => Err(WizardError::InvalidTransition {
                action: "edit questions",
                step,
            }),
        }
    }

    pub fn rate_section(&mut self, index: usize, rating: Rating) -> Result<(), WizardError> {
        self.ensure_editable()?;
        self.check_section(index)?;
        self.draft.update(|state| {
            if let Some(feedback) = state.section_feedback.get_mut(index) {
                feedback.rating = Some(rating);
            }
        });
        if rating == Rating::Change {
            self.expanded.insert(index);
        }
        Ok(())
    }

    pub fn set_section_comment(
        &mut self,
        index: usize,
        comment: impl Into<String>,
    ) -> Result<(), WizardError> {
        self.ensure_editable()?;
        self.check_section(index)?;
        let comment = comment.into();
        self.draft.update(|state| {
            if let Some(feedback) = state.section_feedback.get_mut(index) {
                feedback.comment = comment;
            }
        });
        Ok(())
    }

    pub fn toggle_preset(&mut self, index: usize, preset_id: &str) -> Result<bool, WizardError> {
        self.ensure_editable()?;
        self.check_section(index)?;
        if !self.catalog.has_preset(preset_id) {
            return Err(WizardError::UnknownPreset(preset_id.to_string()));
        }
        let selected = self.draft.update(|state| {
            let Some(feedback) = state.section_feedback.get_mut(index) else {
                return false;
            };
            if feedback.presets.remove(preset_id) {
                false
            } else {
                feedback.presets.insert(preset_id.to_string());
                true
            }
        });
        Ok(selected)
    }

    pub fn toggle_editor(&mut self, index: usize) -> Result<bool, WizardError> {
        self.check_section(index)?;
        if self.expanded.remove(&index) {
            Ok(false)
        } else {
            self.expanded.insert(index);
            Ok(true)
        }
    }

    pub fn answer_question(&mut self, index: usize, answer: Answer) -> Result<(), WizardError> {
        self.ensure_editable()?;
        self.check_question(index)?;
        self.draft.update(|state| {
            if let Some(slot) = state.question_answers.get_mut(index) {
                slot.answer = Some(answer);
            }
        });
        Ok(())
    }

    pub fn set_question_comment(
        &mut self,
        index: usize,
        comment: impl Into<String>,
    ) -> Result<(), WizardError> {
        self.ensure_editable()?;
        self.check_question(index)?;
        let comment = comment.into();
        self.draft.update(|state| {
            if let Some(slot) = state.question_answers.get_mut(index) {
                slot.comment = comment;
            }
        });
        Ok(())
    }

    pub fn set_general_comment(&mut self, comment: impl Into<String>) -> Result<(), WizardError> {
        self.ensure_editable()?;
        let comment = comment.into();
        self.draft.update(|state| state.general_comment = comment);
        Ok(())
    }

    pub fn on_gesture_start(&mut self, point: Point, time_ms: f64) {
        self.sync_navigator();
        self.navigator.on_gesture_start(point, time_ms);
    }

    pub fn on_gesture_cancel(&mut self) {
        self.navigator.on_gesture_cancel();
    }

    pub fn on_gesture_end(
        &mut self,
        point: Point,
        time_ms: f64,
    ) -> Result<Option<GestureIntent>, WizardError> {
        self.sync_navigator();
        let intent = self.navigator.on_gesture_end(point, time_ms);
        match intent {
            Some(GestureIntent::Advance) => {
                self.advance()?;
            }
            Some(GestureIntent::Retreat) => {
                self.retreat()?;
            }
            None => {}
        }
        Ok(intent)
    }

    pub fn begin_submit(&mut self, choice: SubmitChoice) -> Result<FeedbackSubmission, WizardError> {
        self.ensure_editable()?;
        let kind = match (choice, self.change_count()) {
            (SubmitChoice::Primary, 0) => SubmissionType::Approval,
            (SubmitChoice::Primary, _) | (SubmitChoice::Anyway, _) => SubmissionType::Changes,
        };
        let submission = self.draft.read(|state| FeedbackSubmission {
            project_id: self.project_id.clone(),
            approved: kind == SubmissionType::Approval,
            kind,
            section_feedback: state
                .section_feedback
                .iter()
                .filter(|feedback| feedback.rating.is_some())
                .cloned()
                .collect(),
            general_comment: state.general_comment.clone(),
            question_answers: state
                .question_answers
                .iter()
                .filter(|answer| answer.answer.is_some())
                .cloned()
                .collect(),
        });
        self.in_flight = Some(kind);
        self.last_error = None;
        self.sync_navigator();
        debug!(project_id = %self.project_id, ?kind, "submission started");
        Ok(submission)
    }

    pub async fn finish_submit(
        &mut self,
        outcome: Result<FeedbackReceipt, SubmissionError>,
    ) -> Result<SubmissionType, WizardError> {
        let kind = self.in_flight.take().ok_or(WizardError::NotSubmitting)?;
        let result = match outcome {
            Ok(receipt) => {
                self.draft.clear().await;
                self.completed = Some(kind);
                info!(
                    project_id = %self.project_id,
                    ?kind,
                    feedback_id = receipt.feedback_id.as_deref().unwrap_or("-"),
                    "feedback accepted; draft cleared"
                );
                Ok(kind)
            }
            Err(err) => {
                warn!(
                    project_id = %self.project_id,
                    error = %err,
                    retryable = err.is_retryable(),
                    "feedback submission failed; draft kept for retry"
                );
                self.last_error = Some(err.to_string());
                Err(WizardError::Submission(err))
            }
        };
        self.sync_navigator();
        result
    }

    pub async fn submit(&mut self, choice: SubmitChoice) -> Result<SubmissionType, WizardError> {
        let submission = self.begin_submit(choice)?;
        let outcome = self.gateway.submit(&submission).await;
        self.finish_submit(outcome).await
    }

    pub async fn flush(&mut self) -> bool {
        if self.completed.is_some() {
            return false;
        }
        self.draft.save_now().await
    }

    pub async fn save_and_exit(mut self) {
        if self.completed.is_none() {
            self.draft.save_now().await;
        }
        self.draft.close().await;
    }

    pub async fn unmount(self) {
        self.draft.close().await;
    }

    fn exit_step(&self) -> WizardStep {
        if self.has_questions() {
            WizardStep::Questions
        } else {
            WizardStep::Summary
        }
    }

    fn move_to(&mut self, step: WizardStep, index: usize) {
        self.draft.update(|state| {
            state.step = step;
            state.current_section_index = index;
        });
        self.sync_navigator();
        debug!(project_id = %self.project_id, %step, index, "wizard moved");
    }

    fn sync_navigator(&mut self) {
        let enabled = self.step() == WizardStep::Sections
            && self.in_flight.is_none()
            && self.completed.is_none();
        if self.navigator.is_enabled() != enabled {
            self.navigator.set_enabled(enabled);
        }
    }

    fn ensure_editable(&self) -> Result<(), WizardError> {
        if self.completed.is_some() {
            return Err(WizardError::AlreadySubmitted);
        }
        if self.in_flight.is_some() {
            return Err(WizardError::Busy);
        }
        Ok(())
    }

    fn check_section(&self, index: usize) -> Result<(), WizardError> {
        let len = self.catalog.sections.len();
        if index < len {
            Ok(())
        } else {
            Err(WizardError::SectionOutOfRange { index, len })
        }
    }

    fn check_question(&self, index: usize) -> Result<(), WizardError> {
        let len = self.catalog.questions.len();
        if index < len {
            Ok(())
        } else {
            Err(WizardError::QuestionOutOfRange { index, len })
        }
    }
}

#[cfg(test)]
#[path = "tests/wizard_tests.rs"]
mod tests;
