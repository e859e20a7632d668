//! Global conflict audit
//!
//! Sends every chapter summary, tagged with its indices, and asks for the
//! chapters that contradict the outline, the roster or each other.

use bookstore::{Book, ChapterRef};
use serde::Serialize;
use tracing::{debug, info};

use crate::context::{BookContext, audit_digest};
use crate::structured::AuditReport;
use crate::task::{RunError, TaskRun};

/// A flagged chapter resolved against the book
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub v_idx: usize,
    pub c_idx: usize,
    pub target: ChapterRef,
    pub reason: String,
}

#[derive(Serialize)]
struct DigestContext {
    digest: String,
}

/// Run the audit
///
/// Returns `None` when the reply was unusable; findings that point outside
/// the book are dropped with a warning.
pub async fn audit(run: &mut TaskRun, book: &Book) -> Result<Option<Vec<Conflict>>, RunError> {
    debug!(task_id = %run.task_id, chapters = book.chapter_count(), "audit: called");
    if book.chapter_count() == 0 {
        run.emitter.status("No chapters to audit");
        return Ok(Some(Vec::new()));
    }

    run.emitter.status("Auditing chapter summaries for conflicts");
    let system = run.render("audit-system", &BookContext::from_book(book))?;
    let user = run.render(
        "audit",
        &DigestContext {
            digest: audit_digest(book),
        },
    )?;

    let Some(report) = run.stream_structured::<AuditReport>(system, user, "conflict audit").await? else {
        return Ok(None);
    };

    let mut conflicts = Vec::new();
    for finding in report.problematic_chapters {
        match book.chapter_ref(finding.v_idx, finding.c_idx) {
            Some(target) => {
                info!(%target, reason = %finding.reason, "Conflict found");
                run.emitter.log(format!("Conflict in {}: {}", target, finding.reason));
                conflicts.push(Conflict {
                    v_idx: finding.v_idx,
                    c_idx: finding.c_idx,
                    target,
                    reason: finding.reason,
                });
            }
            None => run.warn(format!(
                "Audit flagged v_idx={} c_idx={}, which does not exist; ignoring",
                finding.v_idx, finding.c_idx
            )),
        }
    }

    run.report.findings += conflicts.len();
    if conflicts.is_empty() {
        run.emitter.status("Audit found no conflicts");
    } else {
        run.emitter.status(format!("Audit found {} conflicting chapters", conflicts.len()));
    }
    Ok(Some(conflicts))
}

/// Audit-only task: report findings, change nothing
pub async fn run_audit(run: &mut TaskRun) -> Result<(), RunError> {
    debug!(task_id = %run.task_id, "run_audit: called");
    let book = run.state.snapshot().await?;
    audit(run, &book).await?;
    Ok(())
}
