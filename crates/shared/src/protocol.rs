use serde::{Deserialize, Serialize};

use crate::domain::{ProjectId, QuestionAnswer, SectionFeedback};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionType {
    Approval,
    Changes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackSubmission {
    pub project_id: ProjectId,
    pub approved: bool,
    #[serde(rename = "type")]
    pub kind: SubmissionType,
    pub section_feedback: Vec<SectionFeedback>,
    pub general_comment: String,
    pub question_answers: Vec<QuestionAnswer>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackReceipt {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Answer, QuestionId, Rating, SectionId};

    #[test]
    fn submission_uses_camel_case_wire_names() {
        let submission = FeedbackSubmission {
            project_id: ProjectId::new("https://preview.example/acme"),
            approved: false,
            kind: SubmissionType::Changes,
            section_feedback: vec![SectionFeedback {
                section_id: SectionId::new("hero"),
                rating: Some(Rating::Change),
                comment: "fix colors".into(),
                presets: ["colors".to_string()].into_iter().collect(),
            }],
            general_comment: String::new(),
            question_answers: vec![QuestionAnswer {
                question_id: QuestionId::new("logo"),
                question: "Is the logo right?".into(),
                answer: Some(Answer::No),
                comment: String::new(),
            }],
        };

        let value = serde_json::to_value(&submission).expect("serialize");
        assert_eq!(value["projectId"], "https://preview.example/acme");
        assert_eq!(value["type"], "changes");
        assert_eq!(value["approved"], false);
        assert_eq!(value["sectionFeedback"][0]["sectionId"], "hero");
        assert_eq!(value["sectionFeedback"][0]["rating"], "change");
        assert_eq!(value["sectionFeedback"][0]["presets"][0], "colors");
        assert_eq!(value["questionAnswers"][0]["answer"], "no");
        assert_eq!(value["generalComment"], "");
    }

    #[test]
    fn unknown_step_value_is_rejected() {
        let parsed = serde_json::from_str::<crate::domain::WizardStep>("\"review\"");
        assert!(parsed.is_err());
        let parsed = serde_json::from_str::<crate::domain::WizardStep>("\"questions\"")
            .expect("known step");
        assert_eq!(parsed, crate::domain::WizardStep::Questions);
    }
}
