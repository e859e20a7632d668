//! Autopilot pipeline
//!
//! Three stages run in order: volume planning, chapter planning, content
//! generation. Each stage re-reads the book so it sees what the previous
//! stage committed. Cancellation is honored at every stage and unit boundary.

mod chapter_planner;
mod generator;
mod volume_planner;

pub use chapter_planner::plan_chapters;
pub use generator::{generate_chapter, generate_pending};
pub use volume_planner::plan_volumes;

use tracing::{debug, info};

use crate::task::{RunError, TaskRun};

/// Stage names in execution order
pub const STAGES: [&str; 3] = ["Volume planning", "Chapter planning", "Content generation"];

/// Run all three stages
pub async fn run_autopilot(run: &mut TaskRun) -> Result<(), RunError> {
    debug!(task_id = %run.task_id, "run_autopilot: called");

    for (index, name) in STAGES.iter().enumerate() {
        run.check_cancel()?;
        info!(stage = %name, "Autopilot stage starting");
        run.emitter.stage_changed(index, name, STAGES.len());
        match index {
            0 => plan_volumes(run).await?,
            1 => plan_chapters(run).await?,
            _ => generate_pending(run).await?,
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NpEvent;
    use crate::llm::mock::MockReply;
    use crate::task::testing::Harness;
    use bookstore::{Book, ChapterRef, Volume};
    use serde_json::json;

    #[tokio::test]
    async fn test_autopilot_runs_stages_in_order() {
        let mut book = Book::new("T");
        book.global_synopsis = "A short tale.".to_string();
        book.volumes.push(Volume::new("V1", ""));

        let replies = vec![
            MockReply::json(json!({
                "updated_existing_volumes": [{"name": "V1", "synopsis": "the only volume of a short tale"}],
                "new_volumes": []
            })),
            MockReply::json(json!({
                "new_chapters": [{"name": "C1", "ai_synopsis": "the tale begins and ends"}]
            })),
            MockReply::text("Once upon a time.\n[AI_SUMMARY]\nIt began, and then it ended happily ever after."),
        ];
        let mut h = Harness::with_book(book, replies);
        run_autopilot(&mut h.run).await.unwrap();

        let book = h.book().await;
        assert_eq!(book.volumes[0].synopsis, "the only volume of a short tale");
        assert_eq!(
            book.volumes[0].chapters[0].ai_synopsis,
            "It began, and then it ended happily ever after."
        );
        assert_eq!(
            h.run.state.read_content(&ChapterRef::new("V1", "C1")).await.unwrap(),
            "Once upon a time."
        );

        let stages: Vec<usize> = h
            .drain()
            .into_iter()
            .filter_map(|e| match e {
                NpEvent::StageChanged { stage_index, .. } => Some(stage_index),
                _ => None,
            })
            .collect();
        assert_eq!(stages, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_autopilot_cancelled_before_start() {
        let mut h = Harness::with_book(Book::new("T"), vec![]);
        h.run.cancel.cancel();
        assert!(matches!(run_autopilot(&mut h.run).await, Err(RunError::Cancelled)));
        assert_eq!(h.llm.call_count(), 0);
    }
}
