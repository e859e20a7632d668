//! Conflict audit and correction
//!
//! Full-book correction audits every summary, repairs the flagged chapters
//! with the audit's reason, then proofreads every written chapter. Chapter
//! correction runs the selected passes on one chapter.

mod auditor;
mod repair;

pub use auditor::{Conflict, audit, run_audit};
pub use repair::{Repaired, repair_setting, repair_typo};

use bookstore::{ChapterRef, is_blank};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::task::{RunError, TaskRun};

/// Which passes to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionMode {
    /// Typos and grammar only
    Typo,
    /// Setting and logic only
    Setting,
    /// Setting first, then typos on the result
    All,
}

impl CorrectionMode {
    pub fn includes_setting(self) -> bool {
        matches!(self, CorrectionMode::Setting | CorrectionMode::All)
    }

    pub fn includes_typo(self) -> bool {
        matches!(self, CorrectionMode::Typo | CorrectionMode::All)
    }
}

impl std::fmt::Display for CorrectionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CorrectionMode::Typo => write!(f, "typo"),
            CorrectionMode::Setting => write!(f, "setting"),
            CorrectionMode::All => write!(f, "all"),
        }
    }
}

/// What to correct
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorrectionScope {
    Full,
    Chapter(ChapterRef),
}

/// Run a correction task
pub async fn run_correction(run: &mut TaskRun, scope: &CorrectionScope, mode: CorrectionMode) -> Result<(), RunError> {
    debug!(task_id = %run.task_id, ?scope, %mode, "run_correction: called");
    match scope {
        CorrectionScope::Chapter(target) => correct_chapter(run, target, mode).await,
        CorrectionScope::Full => correct_book(run, mode).await,
    }
}

/// Commit a pass result if anything changed
async fn commit_if_changed(run: &mut TaskRun, target: &ChapterRef, original: &str, repaired: &Repaired) -> Result<(), RunError> {
    if repaired.content == original && is_blank(&repaired.summary) {
        run.report.skipped += 1;
        run.emitter
            .unit_skipped(&target.volume, Some(&target.chapter), "no changes");
        return Ok(());
    }

    let report = run
        .state
        .commit_chapter(target, &repaired.content, &repaired.summary)
        .await?;
    info!(%target, summary = ?report.summary, "Correction committed");
    run.report.committed += 1;
    run.emitter
        .unit_completed(&target.volume, Some(&target.chapter), "corrected");
    Ok(())
}

async fn correct_chapter(run: &mut TaskRun, target: &ChapterRef, mode: CorrectionMode) -> Result<(), RunError> {
    debug!(%target, %mode, "correct_chapter: called");
    let book = run.state.snapshot().await?;
    let original = run.state.read_content(target).await?;
    if is_blank(&original) {
        run.report.skipped += 1;
        run.emitter.status(format!("{} has no text to correct", target));
        return Ok(());
    }

    run.emitter.unit_started(&target.volume, Some(&target.chapter));
    let mut repaired = Repaired {
        content: original.clone(),
        summary: String::new(),
    };
    if mode.includes_setting() {
        repaired = repair_setting(run, &book, target, &original, None).await?;
    }
    if mode.includes_typo() {
        run.check_cancel()?;
        repaired.content = repair_typo(run, target, &repaired.content).await?;
    }

    commit_if_changed(run, target, &original, &repaired).await
}

async fn correct_book(run: &mut TaskRun, mode: CorrectionMode) -> Result<(), RunError> {
    debug!(%mode, "correct_book: called");
    let total = if mode == CorrectionMode::All { 2 } else { 1 };
    let mut stage = 0;

    if mode.includes_setting() {
        run.emitter.stage_changed(stage, "Setting repair", total);
        stage += 1;
        repair_conflicts(run).await?;
    }

    if mode.includes_typo() {
        run.check_cancel()?;
        run.emitter.stage_changed(stage, "Proofreading", total);
        proofread_all(run).await?;
    }
    Ok(())
}

/// Audit, then repair each flagged chapter with the audit's reason
async fn repair_conflicts(run: &mut TaskRun) -> Result<(), RunError> {
    let book = run.state.snapshot().await?;
    let Some(conflicts) = audit(run, &book).await? else {
        return Ok(());
    };
    if conflicts.is_empty() {
        run.emitter.status("Book is consistent, no setting repairs needed");
        return Ok(());
    }

    for conflict in &conflicts {
        run.check_cancel()?;
        let original = run.state.read_content(&conflict.target).await?;
        if is_blank(&original) {
            run.report.skipped += 1;
            run.emitter
                .unit_skipped(&conflict.target.volume, Some(&conflict.target.chapter), "no text");
            continue;
        }

        run.emitter
            .unit_started(&conflict.target.volume, Some(&conflict.target.chapter));
        // Later repairs see the summaries earlier repairs committed
        let current = run.state.snapshot().await?;
        let repaired = repair_setting(run, &current, &conflict.target, &original, Some(&conflict.reason)).await?;
        commit_if_changed(run, &conflict.target, &original, &repaired).await?;
    }
    Ok(())
}

/// Proofread every chapter that has text
async fn proofread_all(run: &mut TaskRun) -> Result<(), RunError> {
    let book = run.state.snapshot().await?;
    let targets: Vec<ChapterRef> = book
        .chapters()
        .map(|(_, _, v, c)| ChapterRef::new(&v.name, &c.name))
        .collect();

    for target in &targets {
        run.check_cancel()?;
        let original = run.state.read_content(target).await?;
        if is_blank(&original) {
            continue;
        }
        run.emitter.unit_started(&target.volume, Some(&target.chapter));
        let fixed = repair_typo(run, target, &original).await?;
        let repaired = Repaired {
            content: fixed,
            summary: String::new(),
        };
        commit_if_changed(run, target, &original, &repaired).await?;
    }
    Ok(())
}
