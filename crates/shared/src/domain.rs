use std::{collections::BTreeSet, fmt};

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

id_newtype!(ProjectId);
id_newtype!(SectionId);
id_newtype!(QuestionId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    Good,
    Change,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Answer {
    Yes,
    No,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    #[default]
    Intro,
    Sections,
    Questions,
    Summary,
}

impl WizardStep {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Intro => "intro",
            Self::Sections => "sections",
            Self::Questions => "questions",
            Self::Summary => "summary",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionFeedback {
    pub section_id: SectionId,
    #[serde(default)]
    pub rating: Option<Rating>,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub presets: BTreeSet<String>,
}

impl SectionFeedback {
    pub fn blank(section_id: SectionId) -> Self {
        Self {
            section_id,
            rating: None,
            comment: String::new(),
            presets: BTreeSet::new(),
        }
    }

    pub fn requests_change(&self) -> bool {
        self.rating == Some(Rating::Change)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionAnswer {
    pub question_id: QuestionId,
    pub question: String,
    #[serde(default)]
    pub answer: Option<Answer>,
    #[serde(default)]
    pub comment: String,
}

impl QuestionAnswer {
    pub fn unanswered(spec: &QuestionSpec) -> Self {
        Self {
            question_id: spec.id.clone(),
            question: spec.question.clone(),
            answer: None,
            comment: String::new(),
        }
    }

    pub fn requests_change(&self) -> bool {
        self.answer == Some(Answer::No)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionSpec {
    pub id: SectionId,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionSpec {
    pub id: QuestionId,
    pub question: String,
    #[serde(default)]
    pub help_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetTag {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackCatalog {
    pub sections: Vec<SectionSpec>,
    #[serde(default)]
    pub questions: Vec<QuestionSpec>,
    #[serde(default)]
    pub presets: Vec<PresetTag>,
}

impl FeedbackCatalog {
    pub fn has_questions(&self) -> bool {
        !self.questions.is_empty()
    }

    pub fn has_preset(&self, id: &str) -> bool {
        self.presets.iter().any(|preset| preset.id == id)
    }
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
