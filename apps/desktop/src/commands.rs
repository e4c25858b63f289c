use anyhow::{anyhow, bail, Context, Result};
use shared::domain::{Answer, Rating};

/// One line typed at the wizard prompt. Indices are 1-based on input and
/// stored 0-based here.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start,
    Next,
    Prev,
    Rate { index: usize, rating: Rating },
    Comment { index: usize, text: String },
    Tag { index: usize, preset: String },
    Editor { index: usize },
    Answer { index: usize, answer: Answer },
    QuestionComment { index: usize, text: String },
    General(String),
    Summary,
    Edit { index: usize },
    EditQuestions,
    Submit,
    SubmitAnyway,
    Swipe { dx: f64, dy: f64, dt: f64 },
    Status,
    Save,
    Quit,
    Help,
}

pub const HELP: &str = "\
commands:
  start                      leave the intro
  next | prev                move between sections
  rate <n> good|change       rate section n
  comment <n> <text>         comment on section n
  tag <n> <preset-id>        toggle a preset tag on section n
  editor <n>                 open/close the editor for section n
  answer <n> yes|no          answer question n
  qcomment <n> <text>        comment on question n
  general <text>             set the general comment
  summary                    go from questions to the summary
  edit <n>                   jump back to section n from the summary
  edit-questions             jump back to the questions from the summary
  submit | submit-anyway     send the feedback
  swipe <dx> <dy> <ms>       simulate a horizontal swipe
  status | save | quit | help";

pub fn parse_command(line: &str) -> Result<Command> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word.to_ascii_lowercase().as_str() {
        "start" => Command::Start,
        "next" | "n" => Command::Next,
        "prev" | "p" | "back" => Command::Prev,
        "rate" => {
            let (index, value) = indexed(rest)?;
            let rating = match value.to_ascii_lowercase().as_str() {
                "good" | "g" => Rating::Good,
                "change" | "c" => Rating::Change,
                other => bail!("rating must be 'good' or 'change', got '{other}'"),
            };
            Command::Rate { index, rating }
        }
        "comment" => {
            let (index, text) = indexed(rest)?;
            Command::Comment {
                index,
                text: text.to_string(),
            }
        }
        "tag" => {
            let (index, preset) = indexed(rest)?;
            if preset.is_empty() {
                bail!("usage: tag <n> <preset-id>");
            }
            Command::Tag {
                index,
                preset: preset.to_string(),
            }
        }
        "editor" => Command::Editor {
            index: one_based(rest)?,
        },
        "answer" => {
            let (index, value) = indexed(rest)?;
            let answer = match value.to_ascii_lowercase().as_str() {
                "yes" | "y" => Answer::Yes,
                "no" | "n" => Answer::No,
                other => bail!("answer must be 'yes' or 'no', got '{other}'"),
            };
            Command::Answer { index, answer }
        }
        "qcomment" => {
            let (index, text) = indexed(rest)?;
            Command::QuestionComment {
                index,
                text: text.to_string(),
            }
        }
        "general" => Command::General(rest.to_string()),
        "summary" => Command::Summary,
        "edit" => Command::Edit {
            index: one_based(rest)?,
        },
        "edit-questions" => Command::EditQuestions,
        "submit" => Command::Submit,
        "submit-anyway" => Command::SubmitAnyway,
        "swipe" => {
            let parts = rest
                .split_whitespace()
                .map(|part| part.parse::<f64>())
                .collect::<Result<Vec<_>, _>>()
                .context("usage: swipe <dx> <dy> <ms>")?;
            let &[dx, dy, dt] = parts.as_slice() else {
                bail!("usage: swipe <dx> <dy> <ms>");
            };
            Command::Swipe { dx, dy, dt }
        }
        "status" | "" => Command::Status,
        "save" => Command::Save,
        "quit" | "exit" | "q" => Command::Quit,
        "help" | "?" => Command::Help,
        other => bail!("unknown command '{other}'; type 'help'"),
    };
    Ok(command)
}

fn indexed(rest: &str) -> Result<(usize, &str)> {
    let (index, tail) = match rest.split_once(char::is_whitespace) {
        Some((index, tail)) => (index, tail.trim()),
        None => (rest, ""),
    };
    Ok((one_based(index)?, tail))
}

fn one_based(raw: &str) -> Result<usize> {
    let n: usize = raw
        .trim()
        .parse()
        .with_context(|| format!("expected a number, got '{raw}'"))?;
    n.checked_sub(1)
        .ok_or_else(|| anyhow!("numbers start at 1"))
}
