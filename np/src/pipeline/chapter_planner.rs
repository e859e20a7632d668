//! Chapter planning stage
//!
//! Walks volumes in order. For each volume that is short of chapters or
//! has blank outlines, asks for expanded summaries and new chapters with
//! the whole book in view.

use bookstore::{ChapterRef, Volume};
use serde::Serialize;
use tracing::{debug, info};

use crate::context::{book_overview, existing_chapters_json};
use crate::merge::MergeOutcome;
use crate::state::StateError;
use crate::structured::ChapterPlan;
use crate::task::{RunError, TaskRun};

#[derive(Serialize)]
struct ChapterPromptContext {
    book_overview: String,
    volume_name: String,
    volume_synopsis: String,
    existing_chapters: String,
}

/// Whether a volume already has enough outlined chapters
fn volume_is_planned(run: &TaskRun, volume: &Volume) -> bool {
    volume.chapters.len() >= run.limits.min_chapters
        && !volume
            .chapters
            .iter()
            .any(|c| run.limits.is_short(&c.ai_synopsis) && run.limits.is_short(&c.synopsis))
}

/// Run the chapter planning stage over every volume
pub async fn plan_chapters(run: &mut TaskRun) -> Result<(), RunError> {
    debug!(task_id = %run.task_id, "plan_chapters: called");
    let mut v_idx = 0;

    loop {
        run.check_cancel()?;
        // Fresh snapshot so each volume sees what earlier volumes committed
        let book = run.state.snapshot().await?;
        let Some(volume) = book.volumes.get(v_idx) else {
            break;
        };
        v_idx += 1;

        if volume_is_planned(run, volume) {
            run.report.skipped += 1;
            run.emitter.unit_skipped(
                &volume.name,
                None,
                &format!("{} chapters with outlines, skipping", volume.chapters.len()),
            );
            continue;
        }

        plan_volume_chapters(run, &book_overview(&book), volume).await?;
    }

    Ok(())
}

async fn plan_volume_chapters(run: &mut TaskRun, overview: &str, volume: &Volume) -> Result<(), RunError> {
    debug!(volume = %volume.name, "plan_volume_chapters: called");
    run.emitter.unit_started(&volume.name, None);

    let ctx = ChapterPromptContext {
        book_overview: overview.to_string(),
        volume_name: volume.name.clone(),
        volume_synopsis: volume.synopsis.clone(),
        existing_chapters: existing_chapters_json(volume),
    };
    let system = run.render("plan-system", &ctx)?;
    let user = run.render("plan-chapters", &ctx)?;

    let unit = format!("chapter plan for {}", volume.name);
    let Some(plan) = run.stream_structured::<ChapterPlan>(system, user, &unit).await? else {
        run.report.skipped += 1;
        return Ok(());
    };

    let mut expanded = 0;
    for entry in &plan.updated_existing_chapters {
        run.check_cancel()?;
        let target = ChapterRef::new(&volume.name, &entry.name);
        match run.state.merge_chapter_summary(&target, &entry.ai_synopsis).await? {
            MergeOutcome::Applied => expanded += 1,
            MergeOutcome::Kept => debug!(%target, "plan_volume_chapters: existing summary kept"),
            MergeOutcome::Unknown => run.warn(format!("Plan updates unknown chapter '{}', ignoring", target)),
        }
    }

    let mut added = 0;
    for entry in &plan.new_chapters {
        run.check_cancel()?;
        match run
            .state
            .add_chapter(&volume.name, &entry.name, &entry.ai_synopsis, &entry.ai_synopsis)
            .await
        {
            Ok(_) => {
                info!(volume = %volume.name, chapter = %entry.name, "Created chapter");
                added += 1;
            }
            Err(StateError::NameCollision(name)) => {
                run.report.skipped += 1;
                run.emitter
                    .log(format!("Chapter '{}' already exists in {}, skipping", name, volume.name));
            }
            Err(StateError::InvalidName(name)) => {
                run.warn(format!("Plan proposes invalid chapter name '{}', skipping", name));
            }
            Err(e) => return Err(e.into()),
        }
    }

    run.report.committed += expanded + added;
    run.emitter.unit_completed(
        &volume.name,
        None,
        &format!("{} summaries expanded, {} chapters added", expanded, added),
    );
    Ok(())
}
