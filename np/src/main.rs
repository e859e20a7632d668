//! NovelPilot - autonomous multi-stage novel generation
//!
//! CLI entry point for editing a book and running generation tasks.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bookstore::{Book, ChapterRef, Character};
use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result, eyre};
use tokio::sync::broadcast;
use tracing::{debug, info};

use novelpilot::cli::{CharacterCommand, ChapterCommand, Cli, Command, VolumeCommand};
use novelpilot::config::Config;
use novelpilot::correction::CorrectionScope;
use novelpilot::events::{EventBus, FinishKind, NpEvent, read_task_events, spawn_event_logger};
use novelpilot::llm::create_client;
use novelpilot::prompts::PromptLoader;
use novelpilot::state::{MetaEdit, StateEvent, StateManager};
use novelpilot::task::{TaskController, TaskKind, TaskOutcome};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("novelpilot")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(log_dir.join("novelpilot.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    // Setup logging with priority: CLI > config > INFO default
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!(provider = %config.llm.provider, model = %config.llm.model, "NovelPilot loaded config");

    let project = cli.project;
    debug!(command = ?cli.command, ?project, "main: dispatching command");
    match cli.command {
        Some(Command::Init { title, synopsis }) => cmd_init(&project, title, synopsis).await,
        Some(Command::Show { json }) => cmd_show(&project, json).await,
        Some(Command::Read { volume, chapter }) => cmd_read(&project, ChapterRef::new(volume, chapter)).await,
        Some(Command::Write { volume, chapter, file }) => {
            cmd_write(&project, ChapterRef::new(volume, chapter), &file).await
        }
        Some(Command::Generate { volume, chapter, force }) => {
            let target = ChapterRef::new(volume, chapter);
            cmd_task(&config, &project, TaskKind::Generate { target, force }).await
        }
        Some(Command::Autopilot) => cmd_task(&config, &project, TaskKind::Autopilot).await,
        Some(Command::Audit) => cmd_task(&config, &project, TaskKind::Audit).await,
        Some(Command::Correct { mode, volume, chapter }) => {
            let scope = match (volume, chapter) {
                (Some(v), Some(c)) => CorrectionScope::Chapter(ChapterRef::new(v, c)),
                _ => CorrectionScope::Full,
            };
            cmd_task(&config, &project, TaskKind::Correct { scope, mode }).await
        }
        Some(Command::Synopsis { text }) => cmd_edit(&project, MetaEdit::SetGlobalSynopsis(text)).await,
        Some(Command::Volume { command }) => cmd_volume(&project, command).await,
        Some(Command::Chapter { command }) => cmd_chapter(&project, command).await,
        Some(Command::Character { command }) => cmd_character(&project, command).await,
        Some(Command::Events { task_id }) => cmd_events(&config, &task_id),
        None => cmd_show(&project, false).await,
    }
}

/// Open the project, run a state operation, shut the actor down
async fn with_state<T, F, Fut>(project: &Path, op: F) -> Result<T>
where
    F: FnOnce(StateManager) -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let state = StateManager::open(project).context("Failed to open project")?;
    let result = op(state.clone()).await;
    let _ = state.shutdown().await;
    result
}

async fn cmd_init(project: &Path, title: Option<String>, synopsis: Option<String>) -> Result<()> {
    debug!(?project, "cmd_init: called");
    fs::create_dir_all(project).context("Failed to create project directory")?;
    with_state(project, |state| async move {
        if let Some(title) = title {
            state.edit_meta(MetaEdit::SetTitle(title)).await?;
        }
        if let Some(synopsis) = synopsis {
            state.edit_meta(MetaEdit::SetGlobalSynopsis(synopsis)).await?;
        }
        let book = state.snapshot().await?;
        println!("Project '{}' ready at {}", book.title, project.display());
        Ok(())
    })
    .await
}

async fn cmd_show(project: &Path, json: bool) -> Result<()> {
    debug!(?project, json, "cmd_show: called");
    with_state(project, |state| async move {
        let book = state.snapshot().await?;
        if json {
            println!("{}", serde_json::to_string_pretty(&book)?);
            return Ok(());
        }
        print_outline(&state, &book).await
    })
    .await
}

async fn print_outline(state: &StateManager, book: &Book) -> Result<()> {
    println!("{}", book.title.bold());
    if !book.global_synopsis.trim().is_empty() {
        println!("{}", book.global_synopsis.trim().dimmed());
    }
    if !book.characters.is_empty() {
        let names: Vec<&str> = book.characters.iter().map(|c| c.name.as_str()).collect();
        println!("Characters: {}", names.join(", "));
    }
    println!();

    if book.volumes.is_empty() {
        println!("No volumes yet. Add one with `np volume add <name>` or run `np autopilot`.");
        return Ok(());
    }

    for volume in &book.volumes {
        println!("{} {}", "▶".cyan(), volume.name.bold());
        for chapter in &volume.chapters {
            let target = ChapterRef::new(&volume.name, &chapter.name);
            let chars = state.read_content(&target).await?.trim().chars().count();
            let marker = if chars > 0 {
                format!("{} chars", chars).green()
            } else {
                "empty".yellow()
            };
            println!("    {} [{}]", chapter.name, marker);
        }
    }
    Ok(())
}

async fn cmd_read(project: &Path, target: ChapterRef) -> Result<()> {
    debug!(%target, "cmd_read: called");
    with_state(project, |state| async move {
        println!("{}", state.read_content(&target).await?);
        Ok(())
    })
    .await
}

async fn cmd_write(project: &Path, target: ChapterRef, file: &Path) -> Result<()> {
    debug!(%target, ?file, "cmd_write: called");
    let text = fs::read_to_string(file).context(format!("Failed to read {}", file.display()))?;
    with_state(project, |state| async move {
        state.save_content(&target, &text).await?;
        println!("Saved {} characters to {}", text.chars().count(), target);
        Ok(())
    })
    .await
}

async fn cmd_edit(project: &Path, edit: MetaEdit) -> Result<()> {
    debug!(?edit, "cmd_edit: called");
    with_state(project, |state| async move {
        state.edit_meta(edit).await?;
        println!("Updated");
        Ok(())
    })
    .await
}

async fn cmd_volume(project: &Path, command: VolumeCommand) -> Result<()> {
    debug!(?command, "cmd_volume: called");
    with_state(project, |state| async move {
        match command {
            VolumeCommand::Add { name, synopsis } => {
                state.add_volume(&name, &synopsis).await?;
                println!("Added volume '{}'", name);
            }
            VolumeCommand::Rename { name, new_name } => {
                state.rename_volume(&name, &new_name).await?;
                println!("Renamed volume '{}' to '{}'", name, new_name);
            }
            VolumeCommand::Delete { name } => {
                state.delete_volume(&name).await?;
                println!("Deleted volume '{}'", name);
            }
            VolumeCommand::Synopsis { name, text } => {
                state
                    .edit_meta(MetaEdit::SetVolumeSynopsis {
                        volume: name.clone(),
                        synopsis: text,
                    })
                    .await?;
                println!("Updated synopsis of '{}'", name);
            }
        }
        Ok(())
    })
    .await
}

async fn cmd_chapter(project: &Path, command: ChapterCommand) -> Result<()> {
    debug!(?command, "cmd_chapter: called");
    with_state(project, |state| async move {
        match command {
            ChapterCommand::Add { volume, name, synopsis } => {
                state.add_chapter(&volume, &name, &synopsis, "").await?;
                println!("Added chapter '{}' to '{}'", name, volume);
            }
            ChapterCommand::Rename { volume, name, new_name } => {
                state.rename_chapter(&ChapterRef::new(&volume, &name), &new_name).await?;
                println!("Renamed chapter '{}' to '{}'", name, new_name);
            }
            ChapterCommand::Delete { volume, name } => {
                state.delete_chapter(&ChapterRef::new(&volume, &name)).await?;
                println!("Deleted chapter '{}'", name);
            }
            ChapterCommand::Synopsis { volume, name, text } => {
                let target = ChapterRef::new(&volume, &name);
                state
                    .edit_meta(MetaEdit::SetChapterSynopsis {
                        target: target.clone(),
                        synopsis: text,
                    })
                    .await?;
                println!("Updated outline of {}", target);
            }
        }
        Ok(())
    })
    .await
}

async fn cmd_character(project: &Path, command: CharacterCommand) -> Result<()> {
    debug!(?command, "cmd_character: called");
    with_state(project, |state| async move {
        match command {
            CharacterCommand::Add {
                name,
                gender,
                personality,
                experience,
            } => {
                state
                    .edit_meta(MetaEdit::AddCharacter(Character {
                        name: name.clone(),
                        gender,
                        personality,
                        experience,
                    }))
                    .await?;
                println!("Added character '{}'", name);
            }
            CharacterCommand::Remove { name } => {
                state.edit_meta(MetaEdit::RemoveCharacter(name.clone())).await?;
                println!("Removed character '{}'", name);
            }
        }
        Ok(())
    })
    .await
}

fn cmd_events(config: &Config, task_id: &str) -> Result<()> {
    debug!(%task_id, "cmd_events: called");
    let entries = read_task_events(config.events.resolved_runs_dir(), task_id)?;
    if entries.is_empty() {
        println!("No events recorded for task {}", task_id);
        return Ok(());
    }
    for entry in entries {
        println!("{} {}", entry.timestamp.format("%Y-%m-%d %H:%M:%S"), describe(&entry.event));
    }
    Ok(())
}

/// Run a background task to completion, cancelling on Ctrl-C
async fn cmd_task(config: &Config, project: &Path, kind: TaskKind) -> Result<()> {
    debug!(kind = %kind.name(), "cmd_task: called");
    config.validate()?;
    let state = StateManager::open(project).context("Failed to open project")?;
    let llm = create_client(&config.llm).context("Failed to create LLM client")?;
    let prompts = Arc::new(PromptLoader::new(project));
    let bus = Arc::new(EventBus::with_default_capacity());

    let logger = config
        .events
        .persist
        .then(|| spawn_event_logger(&bus, config.events.resolved_runs_dir()));
    let renderer = tokio::spawn(render_events(bus.subscribe()));
    let saves = tokio::spawn(render_state_events(state.subscribe_events()));

    let controller = Arc::new(TaskController::new(
        state.clone(),
        llm,
        prompts,
        Arc::new(config.clone()),
        bus.clone(),
    ));
    let task_id = controller.start(kind).await?;
    eprintln!("{} {}", "Task".dimmed(), task_id.dimmed());

    let interrupt = {
        let controller = controller.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\n{}", "Cancelling...".yellow());
                controller.cancel().await;
            }
        })
    };

    let outcome = controller.wait().await;
    interrupt.abort();
    let _ = interrupt.await;
    let _ = renderer.await;

    // Close the bus so the logger drains and exits
    drop(controller);
    drop(bus);
    if let Some(logger) = logger {
        let _ = logger.await;
    }
    let _ = state.shutdown().await;
    drop(state);
    // Closes once the actor and every handle are gone
    match tokio::time::timeout(Duration::from_secs(1), saves).await {
        Ok(Ok(saved)) => debug!(saved, "cmd_task: state events drained"),
        _ => debug!("cmd_task: state event printer did not finish"),
    }

    match outcome {
        Some(TaskOutcome::Completed(report)) => {
            println!("{} {}", "Done:".green().bold(), report);
            Ok(())
        }
        Some(TaskOutcome::Cancelled(report)) => {
            println!("{} {}", "Cancelled:".yellow().bold(), report);
            Ok(())
        }
        Some(TaskOutcome::Failed { error, .. }) => Err(eyre!("Task failed: {}", error)),
        None => Err(eyre!("Task vanished before reporting an outcome")),
    }
}

/// Print book changes until the state actor closes; returns chapters saved
async fn render_state_events(mut rx: broadcast::Receiver<StateEvent>) -> usize {
    let mut saved = 0;
    loop {
        match rx.recv().await {
            Ok(event) => {
                if matches!(event, StateEvent::ContentSaved { .. }) {
                    saved += 1;
                }
                if let Some(line) = describe_state(&event) {
                    eprintln!("{}", line.dimmed());
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                debug!(missed = n, "render_state_events: lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    saved
}

fn describe_state(event: &StateEvent) -> Option<String> {
    match event {
        StateEvent::ContentSaved { target } => Some(format!("saved {}", target)),
        StateEvent::StructureChanged => Some("outline updated".to_string()),
        StateEvent::MetaChanged => None,
    }
}

/// Print task events until the task finishes
async fn render_events(mut rx: broadcast::Receiver<NpEvent>) {
    let mut streaming = false;
    let mut stdout = std::io::stdout();

    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                debug!(missed = n, "render_events: lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        match &event {
            NpEvent::ReasoningDelta { text, .. } => {
                let _ = write!(stdout, "{}", text.dimmed());
                let _ = stdout.flush();
                streaming = true;
                continue;
            }
            NpEvent::ContentDelta { text, .. } => {
                let _ = write!(stdout, "{}", text);
                let _ = stdout.flush();
                streaming = true;
                continue;
            }
            // The live text already on screen is the cleaned prose
            NpEvent::ContentReset { .. } => continue,
            _ => {}
        }

        if streaming {
            println!();
            streaming = false;
        }
        println!("{}", describe(&event));

        if matches!(event, NpEvent::TaskFinished { .. }) {
            break;
        }
    }
}

/// One-line rendering of a non-delta event
fn describe(event: &NpEvent) -> String {
    match event {
        NpEvent::TaskStarted { kind, description, .. } => format!("{} {}: {}", "●".cyan(), kind.bold(), description),
        NpEvent::StageChanged {
            stage_index,
            stage_name,
            total_stages,
            ..
        } => format!("{} Stage {}/{}: {}", "◆".cyan(), stage_index + 1, total_stages, stage_name.bold()),
        NpEvent::TaskFinished { outcome, message, .. } => {
            let label = match outcome {
                FinishKind::Completed => "finished".green(),
                FinishKind::Cancelled => "cancelled".yellow(),
                FinishKind::Failed => "failed".red(),
            };
            match message {
                Some(m) => format!("{} Task {} ({})", "●".cyan(), label, m),
                None => format!("{} Task {}", "●".cyan(), label),
            }
        }
        NpEvent::UnitStarted { volume, chapter, .. } => {
            format!("{} {}", "→".blue(), unit_label(volume, chapter.as_deref()))
        }
        NpEvent::UnitCompleted {
            volume,
            chapter,
            detail,
            ..
        } => format!("{} {}: {}", "✓".green(), unit_label(volume, chapter.as_deref()), detail),
        NpEvent::UnitSkipped {
            volume,
            chapter,
            reason,
            ..
        } => format!("{} {}: {}", "↷".dimmed(), unit_label(volume, chapter.as_deref()), reason.dimmed()),
        NpEvent::Status { message, .. } => format!("  {}", message),
        NpEvent::Log { message, .. } => format!("  {}", message.dimmed()),
        NpEvent::Warning { message, .. } => format!("{} {}", "!".yellow().bold(), message.yellow()),
        NpEvent::Error { message, .. } => format!("{} {}", "✗".red().bold(), message.red()),
        NpEvent::ReasoningDelta { text, .. } | NpEvent::ContentDelta { text, .. } | NpEvent::ContentReset { text, .. } => {
            text.clone()
        }
    }
}

fn unit_label(volume: &str, chapter: Option<&str>) -> String {
    match chapter {
        Some(chapter) => format!("{} - {}", volume, chapter),
        None => volume.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookstore::{Chapter, MemoryStore, Volume};

    #[test]
    fn test_describe_state_names_saved_chapter() {
        let event = StateEvent::ContentSaved {
            target: ChapterRef::new("V1", "C1"),
        };
        assert_eq!(describe_state(&event).as_deref(), Some("saved V1 - C1"));
        assert!(describe_state(&StateEvent::MetaChanged).is_none());
    }

    #[tokio::test]
    async fn test_state_event_printer_counts_saves_until_shutdown() {
        let mut book = Book::new("T");
        let mut volume = Volume::new("V1", "");
        volume.chapters.push(Chapter::new("C1", "", ""));
        book.volumes.push(volume);
        let state = StateManager::spawn(Box::new(MemoryStore::new(book)));
        let printer = tokio::spawn(render_state_events(state.subscribe_events()));

        let target = ChapterRef::new("V1", "C1");
        state.commit_chapter(&target, "The gates opened.", "Mara leaves.").await.unwrap();
        state.shutdown().await.unwrap();
        drop(state);

        let saved = tokio::time::timeout(Duration::from_secs(5), printer)
            .await
            .expect("printer should stop once the state actor is gone")
            .unwrap();
        assert_eq!(saved, 1);
    }
}
