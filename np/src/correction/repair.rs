//! Per-chapter repair passes
//!
//! The setting pass fixes continuity errors and may rewrite the summary;
//! the typo pass fixes surface errors only. Both fall back to the input
//! when the reply is unusable.

use bookstore::{Book, ChapterRef};
use serde::Serialize;
use tracing::{debug, info};

use crate::context::{NO_SUMMARY, RepairContext};
use crate::state::StateError;
use crate::structured::{SettingRepair, TypoRepair};
use crate::task::{RunError, TaskRun};

/// Text and summary after a repair pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repaired {
    pub content: String,
    /// Proposed summary; empty when the pass has nothing to add
    pub summary: String,
}

/// Diagnoses that mean "nothing wrong"
fn is_no_issue(reason: &str) -> bool {
    matches!(reason.trim(), "" | "none" | "None" | "无")
}

/// A proposed summary, or empty when the reply only echoes a placeholder
fn usable_summary(proposed: String) -> String {
    let trimmed = proposed.trim();
    if is_no_issue(trimmed) || trimmed.eq_ignore_ascii_case(NO_SUMMARY) {
        String::new()
    } else {
        proposed
    }
}

/// Fix setting and logic errors in one chapter
///
/// `reason` carries an audit finding when the pass was triggered by one.
pub async fn repair_setting(
    run: &mut TaskRun,
    book: &Book,
    target: &ChapterRef,
    content: &str,
    reason: Option<&str>,
) -> Result<Repaired, RunError> {
    debug!(%target, has_reason = reason.is_some(), "repair_setting: called");
    let (v_idx, c_idx) = book
        .locate(target)
        .ok_or_else(|| StateError::NotFound(format!("chapter {}", target)))?;
    let Some(ctx) = RepairContext::assemble(book, v_idx, c_idx, content, reason, &run.limits) else {
        return Err(StateError::NotFound(format!("chapter {}", target)).into());
    };

    let unchanged = Repaired {
        content: content.to_string(),
        summary: String::new(),
    };

    run.emitter.status(format!("Checking setting consistency of {}", target));
    let system = run.render("repair-setting-system", &ctx)?;
    let user = run.render("repair-setting", &ctx)?;
    let unit = format!("setting repair of {}", target);
    let Some(repair) = run.stream_rewrite::<SettingRepair>(system, user, &unit).await? else {
        return Ok(unchanged);
    };

    if !repair.has_issue {
        run.emitter.status(format!("{}: no setting issues", target));
        return Ok(unchanged);
    }

    if !is_no_issue(&repair.error_reason) {
        run.emitter.log(format!("{}: {}", target, repair.error_reason.trim()));
    }
    for line in &repair.logs {
        run.emitter.log(format!("{}: {}", target, line));
    }
    info!(%target, fixes = repair.logs.len(), "Setting repair applied");

    let content = if repair.corrected_text.trim().is_empty() {
        run.warn(format!("{}: setting repair returned no text, keeping the original", target));
        content.to_string()
    } else {
        repair.corrected_text
    };
    Ok(Repaired {
        content,
        summary: usable_summary(repair.new_ai_summary),
    })
}

#[derive(Serialize)]
struct TypoContext<'a> {
    content: &'a str,
}

/// Fix typos and grammar in a text
pub async fn repair_typo(run: &mut TaskRun, target: &ChapterRef, content: &str) -> Result<String, RunError> {
    debug!(%target, len = content.len(), "repair_typo: called");
    run.emitter.status(format!("Proofreading {}", target));

    let ctx = TypoContext { content };
    let system = run.render("repair-typo-system", &ctx)?;
    let user = run.render("repair-typo", &ctx)?;
    let unit = format!("typo pass of {}", target);
    let Some(repair) = run.stream_rewrite::<TypoRepair>(system, user, &unit).await? else {
        return Ok(content.to_string());
    };

    for line in &repair.logs {
        run.emitter.log(format!("{}: {}", target, line));
    }
    if repair.corrected_text.trim().is_empty() {
        debug!(%target, "repair_typo: empty corrected text, keeping original");
        return Ok(content.to_string());
    }
    Ok(repair.corrected_text)
}
