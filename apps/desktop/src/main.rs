mod commands;

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{
    config::{load_settings, normalize_database_url},
    GestureIntent, HttpSubmissionGateway, MissingSubmissionGateway, Point, PrimaryAction,
    SubmissionGateway, SubmitChoice, WizardController, WizardError, WizardOptions,
};
use commands::{parse_command, Command, HELP};
use shared::domain::{Answer, FeedbackCatalog, ProjectId, Rating, WizardStep};
use storage::{DisabledStore, DraftKvStore, Storage};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Parser, Debug)]
struct Args {
    /// Portal base url; falls back to `server_url` in portal.toml.
    #[arg(long)]
    server_url: Option<String>,
    /// Project (preview) id the feedback is about.
    #[arg(long)]
    project: String,
    /// JSON file with `sections`, `questions` and `presets`.
    #[arg(long)]
    catalog: PathBuf,
    #[arg(long)]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();
    let args = Args::parse();
    let mut settings = load_settings();
    if let Some(url) = args.server_url {
        settings.server_url = Some(url);
    }
    if let Some(url) = args.database_url {
        settings.database_url = url;
    }

    let raw_catalog = std::fs::read_to_string(&args.catalog)
        .with_context(|| format!("failed to read catalog '{}'", args.catalog.display()))?;
    let catalog: FeedbackCatalog =
        serde_json::from_str(&raw_catalog).context("catalog is not valid JSON")?;

    let backend = open_backend(&settings.database_url).await;
    let gateway: Arc<dyn SubmissionGateway> = match settings.server_url.as_deref() {
        Some(url) => Arc::new(HttpSubmissionGateway::new(url)?),
        None => {
            warn!("no server url configured; submissions will fail");
            Arc::new(MissingSubmissionGateway)
        }
    };

    let options = WizardOptions {
        draft: settings.draft_options(),
        gesture: settings.gesture_config(),
    };
    let mut wizard = WizardController::mount(
        ProjectId::new(args.project),
        catalog,
        backend,
        gateway,
        options,
    )
    .await;

    if wizard.was_restored() {
        println!("Resumed your saved progress.");
    }
    render(&wizard);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(err) => {
                println!("{err}");
                continue;
            }
        };

        match command {
            Command::Quit => {
                wizard.save_and_exit().await;
                println!("Progress saved.");
                return Ok(());
            }
            Command::Help => println!("{HELP}"),
            command => match apply(&mut wizard, command).await {
                Ok(()) => render(&wizard),
                Err(err) => println!("! {err}"),
            },
        }

        if let Some(kind) = wizard.completed() {
            info!(?kind, "feedback flow finished");
            println!("Thank you! Your {kind:?} was recorded.");
            break;
        }
    }

    wizard.unmount().await;
    Ok(())
}

async fn open_backend(database_url: &str) -> Arc<dyn DraftKvStore> {
    let opened = Storage::new(&normalize_database_url(database_url)).await;
    match opened {
        Ok(storage) => Arc::new(storage),
        Err(err) => {
            warn!(error = %err, "draft storage unavailable; progress will not be saved");
            Arc::new(DisabledStore)
        }
    }
}

async fn apply(wizard: &mut WizardController, command: Command) -> Result<(), WizardError> {
    match command {
        Command::Start => {
            wizard.start()?;
        }
        Command::Next => {
            wizard.advance()?;
        }
        Command::Prev => {
            wizard.retreat()?;
        }
        Command::Rate { index, rating } => wizard.rate_section(index, rating)?,
        Command::Comment { index, text } => wizard.set_section_comment(index, text)?,
        Command::Tag { index, preset } => {
            let selected = wizard.toggle_preset(index, &preset)?;
            println!("{preset} {}", if selected { "added" } else { "removed" });
        }
        Command::Editor { index } => {
            wizard.toggle_editor(index)?;
        }
        Command::Answer { index, answer } => wizard.answer_question(index, answer)?,
        Command::QuestionComment { index, text } => wizard.set_question_comment(index, text)?,
        Command::General(text) => wizard.set_general_comment(text)?,
        Command::Summary => wizard.view_summary()?,
        Command::Edit { index } => wizard.edit_section(index)?,
        Command::EditQuestions => wizard.edit_questions()?,
        Command::Submit => {
            wizard.submit(SubmitChoice::Primary).await?;
        }
        Command::SubmitAnyway => {
            wizard.submit(SubmitChoice::Anyway).await?;
        }
        Command::Swipe { dx, dy, dt } => {
            let origin = Point::new(200.0, 300.0);
            wizard.on_gesture_start(origin, 0.0);
            let end = Point::new(origin.x + dx, origin.y + dy);
            match wizard.on_gesture_end(end, dt)? {
                Some(GestureIntent::Advance) => println!("(swiped forward)"),
                Some(GestureIntent::Retreat) => println!("(swiped back)"),
                None => println!("(not a swipe)"),
            }
        }
        Command::Save => {
            wizard.flush().await;
            println!("Progress saved.");
        }
        Command::Status | Command::Quit | Command::Help => {}
    }
    Ok(())
}

fn render(wizard: &WizardController) {
    let state = wizard.state();
    println!();
    match state.step {
        WizardStep::Intro => {
            println!("Review your project and tell us what to change.");
            println!(
                "{} sections, {} questions. Type 'start' to begin.",
                wizard.catalog().sections.len(),
                wizard.catalog().questions.len()
            );
        }
        WizardStep::Sections => {
            let progress = wizard.progress();
            let index = state.current_section_index;
            if let (Some(spec), Some(feedback)) =
                (wizard.current_section(), state.section_feedback.get(index))
            {
                println!(
                    "[{}/{}] {}  ({} rated)",
                    index + 1,
                    progress.total,
                    spec.display_name,
                    progress.rated
                );
                if !spec.description.is_empty() {
                    println!("  {}", spec.description);
                }
                println!("  rating: {}", rating_label(feedback.rating));
                if wizard.is_editor_expanded(index) {
                    println!("  comment: {}", feedback.comment);
                    let tags: Vec<String> = wizard
                        .catalog()
                        .presets
                        .iter()
                        .map(|preset| {
                            let mark = if feedback.presets.contains(&preset.id) {
                                "x"
                            } else {
                                " "
                            };
                            format!("[{mark}] {} ({})", preset.label, preset.id)
                        })
                        .collect();
                    println!("  tags: {}", tags.join("  "));
                }
            }
        }
        WizardStep::Questions => {
            for (n, answer) in state.question_answers.iter().enumerate() {
                let value = match answer.answer {
                    Some(Answer::Yes) => "yes",
                    Some(Answer::No) => "no",
                    None => "-",
                };
                println!("Q{}. {} [{value}]", n + 1, answer.question);
                if !answer.comment.is_empty() {
                    println!("    {}", answer.comment);
                }
            }
            println!("Type 'summary' when done.");
        }
        WizardStep::Summary => {
            let summary = wizard.summary();
            for row in &summary.sections {
                println!(
                    "{}. {}: {}",
                    row.index + 1,
                    row.display_name,
                    rating_label(row.rating)
                );
                if !row.comment.is_empty() {
                    println!("     {}", row.comment);
                }
                if !row.preset_labels.is_empty() {
                    println!("     tags: {}", row.preset_labels.join(", "));
                }
            }
            if !summary.general_comment.is_empty() {
                println!("General: {}", summary.general_comment);
            }
            println!("{} change(s) requested.", summary.change_count);
            match summary.primary_action {
                PrimaryAction::Approve => {
                    println!("'submit' approves the project; 'submit-anyway' sends comments.")
                }
                PrimaryAction::SubmitFeedback => {
                    println!("'submit' sends your feedback.")
                }
            }
        }
    }
    if let Some(error) = wizard.last_error() {
        println!("Last attempt failed: {error}. Type 'submit' to retry.");
    }
}

fn rating_label(rating: Option<Rating>) -> &'static str {
    match rating {
        Some(Rating::Good) => "looks good",
        Some(Rating::Change) => "needs changes",
        None => "not rated",
    }
}
