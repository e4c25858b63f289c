pub mod config;
pub mod draft;
pub mod gateway;
pub mod gesture;
pub mod wizard;

pub use draft::{DraftEnvelope, DraftOptions, DraftStore, Restoration};
pub use gateway::{
    HttpSubmissionGateway, MissingSubmissionGateway, SubmissionError, SubmissionGateway,
};
pub use gesture::{GestureConfig, GestureIntent, GestureNavigator, Point};
pub use wizard::{
    draft_key, PrimaryAction, Progress, SubmitChoice, SummaryRow, SummaryView, WizardController,
    WizardError, WizardOptions, WizardState,
};
