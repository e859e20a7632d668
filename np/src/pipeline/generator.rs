//! Content generation stage
//!
//! Writes chapter prose with full continuity context and commits the prose
//! together with its memory summary.

use bookstore::ChapterRef;
use tracing::{debug, info};

use crate::context::{GenerationContext, previous_chapter};
use crate::state::StateError;
use crate::stream::split_summary;
use crate::task::{RunError, TaskRun};

/// Generate every chapter that has no substantial prose yet, in book order
pub async fn generate_pending(run: &mut TaskRun) -> Result<(), RunError> {
    debug!(task_id = %run.task_id, "generate_pending: called");
    let book = run.state.snapshot().await?;
    let targets: Vec<ChapterRef> = book
        .chapters()
        .map(|(_, _, v, c)| ChapterRef::new(&v.name, &c.name))
        .collect();

    for target in &targets {
        run.check_cancel()?;
        generate_chapter(run, target, false).await?;
    }
    Ok(())
}

/// Generate one chapter
///
/// Chapters that already hold substantial prose are skipped unless `force`.
pub async fn generate_chapter(run: &mut TaskRun, target: &ChapterRef, force: bool) -> Result<(), RunError> {
    debug!(%target, force, "generate_chapter: called");
    let book = run.state.snapshot().await?;
    let (v_idx, c_idx) = book
        .locate(target)
        .ok_or_else(|| StateError::NotFound(format!("chapter {}", target)))?;

    let existing = run.state.read_content(target).await?;
    if !force && run.limits.is_written(&existing) {
        run.report.skipped += 1;
        run.emitter
            .unit_skipped(&target.volume, Some(&target.chapter), "already written");
        return Ok(());
    }

    run.emitter.unit_started(&target.volume, Some(&target.chapter));

    let previous = match previous_chapter(&book, v_idx, c_idx).and_then(|(v, c)| book.chapter_ref(v, c)) {
        Some(prev) => Some(run.state.read_content(&prev).await?),
        None => None,
    };
    let Some(ctx) = GenerationContext::assemble(&book, v_idx, c_idx, previous.as_deref(), &run.limits) else {
        return Err(StateError::NotFound(format!("chapter {}", target)).into());
    };
    if ctx.history_degraded {
        run.emitter
            .status("History too long, sending the volume outline instead of chapter summaries");
    }

    let system = run.render("generate-system", &ctx)?;
    let user = run.render("generate", &ctx)?;
    let raw = run.stream_prose(system, user).await?;

    let split = split_summary(&raw);
    if split.content.is_empty() {
        run.warn(format!("{}: empty reply, nothing written", target));
        return Ok(());
    }
    if split.summary.is_empty() {
        run.emitter
            .log(format!("{}: reply had no summary section, keeping the existing summary", target));
    }

    let report = run.state.commit_chapter(target, &split.content, &split.summary).await?;
    info!(%target, chars = split.content.chars().count(), summary = ?report.summary, "Chapter written");
    run.report.committed += 1;
    run.emitter.unit_completed(
        &target.volume,
        Some(&target.chapter),
        &format!("{} characters written", split.content.chars().count()),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NpEvent;
    use crate::llm::mock::MockReply;
    use crate::task::testing::Harness;
    use bookstore::{Book, Chapter, MemoryStore, Volume};

    fn two_chapter_book() -> Book {
        let mut book = Book::new("T");
        book.global_synopsis = "A mountain saga.".to_string();
        let mut v = Volume::new("V1", "the forest");
        v.chapters.push(Chapter::new("C1", "hero enters forest", ""));
        v.chapters.push(Chapter::new("C2", "", "the wolf attacks"));
        book.volumes.push(v);
        book
    }

    #[tokio::test]
    async fn test_generate_commits_content_and_summary() {
        let mut h = Harness::with_book(
            two_chapter_book(),
            vec![MockReply::text("Dark trees closed in.\n[AI_SUMMARY]\nHero enters the forest.")],
        );
        let target = ChapterRef::new("V1", "C1");
        generate_chapter(&mut h.run, &target, false).await.unwrap();

        assert_eq!(h.run.state.read_content(&target).await.unwrap(), "Dark trees closed in.");
        let book = h.book().await;
        assert_eq!(book.volumes[0].chapters[0].ai_synopsis, "Hero enters the forest.");
        assert_eq!(book.volumes[0].chapters[0].synopsis, "hero enters forest");

        let prompt = &h.llm.requests()[0].user_prompt;
        assert!(prompt.contains("hero enters forest"));
        assert!(prompt.contains("The book is just beginning"));
    }

    #[tokio::test]
    async fn test_generated_summary_replaces_longer_planned_one() {
        let mut book = two_chapter_book();
        book.volumes[0].chapters[0].ai_synopsis =
            "planner: the hero will probably meet a talking fox and a wolf pack at the river".to_string();
        let mut h = Harness::with_book(book, vec![MockReply::text("Prose.\n[AI_SUMMARY]\nHero met the wolf.")]);
        generate_chapter(&mut h.run, &ChapterRef::new("V1", "C1"), false)
            .await
            .unwrap();

        assert_eq!(h.book().await.volumes[0].chapters[0].ai_synopsis, "Hero met the wolf.");
    }

    #[tokio::test]
    async fn test_written_chapter_is_skipped() {
        let prose = "x".repeat(150);
        let store = MemoryStore::new(two_chapter_book()).with_content("V1", "C1", &prose);
        let mut h = Harness::new(store, vec![]);
        generate_chapter(&mut h.run, &ChapterRef::new("V1", "C1"), false)
            .await
            .unwrap();
        assert_eq!(h.llm.call_count(), 0);
        assert_eq!(h.run.report.skipped, 1);
    }

    #[tokio::test]
    async fn test_force_regenerates_written_chapter() {
        let prose = "x".repeat(150);
        let store = MemoryStore::new(two_chapter_book()).with_content("V1", "C1", &prose);
        let mut h = Harness::new(store, vec![MockReply::text("New prose.\n[AI_SUMMARY]\nNew.")]);
        let target = ChapterRef::new("V1", "C1");
        generate_chapter(&mut h.run, &target, true).await.unwrap();
        assert_eq!(h.run.state.read_content(&target).await.unwrap(), "New prose.");
    }

    #[tokio::test]
    async fn test_previous_tail_and_history_in_prompt() {
        let store = MemoryStore::new(two_chapter_book()).with_content("V1", "C1", "The hero stepped under the pines.");
        let mut h = Harness::new(store, vec![MockReply::text("Fangs.\n[AI_SUMMARY]\nWolf.")]);
        generate_chapter(&mut h.run, &ChapterRef::new("V1", "C2"), false)
            .await
            .unwrap();

        let prompt = &h.llm.requests()[0].user_prompt;
        assert!(prompt.contains("The hero stepped under the pines."));
        assert!(prompt.contains("[C1]: hero enters forest"));
        // No user outline, so the AI summary drives the chapter
        assert!(prompt.contains("What must happen in this chapter: the wolf attacks"));
    }

    #[tokio::test]
    async fn test_missing_delimiter_keeps_summary() {
        let mut h = Harness::with_book(two_chapter_book(), vec![MockReply::text("Only prose here.")]);
        let target = ChapterRef::new("V1", "C2");
        generate_chapter(&mut h.run, &target, false).await.unwrap();

        assert_eq!(h.run.state.read_content(&target).await.unwrap(), "Only prose here.");
        assert_eq!(h.book().await.volumes[0].chapters[1].ai_synopsis, "the wolf attacks");
    }

    #[tokio::test]
    async fn test_unknown_target() {
        let mut h = Harness::with_book(two_chapter_book(), vec![]);
        let result = generate_chapter(&mut h.run, &ChapterRef::new("V1", "C9"), false).await;
        assert!(matches!(result, Err(RunError::State(StateError::NotFound(_)))));
    }

    #[tokio::test]
    async fn test_generate_pending_walks_book_order() {
        let mut h = Harness::with_book(
            two_chapter_book(),
            vec![
                MockReply::text("One.\n[AI_SUMMARY]\nFirst summary."),
                MockReply::text("Two.\n[AI_SUMMARY]\nSecond summary."),
            ],
        );
        generate_pending(&mut h.run).await.unwrap();
        assert_eq!(h.run.report.committed, 2);

        // Second chapter sees the first chapter's tail
        assert!(h.llm.requests()[1].user_prompt.contains("One."));
        let completed = h
            .drain()
            .into_iter()
            .filter(|e| matches!(e, NpEvent::UnitCompleted { .. }))
            .count();
        assert_eq!(completed, 2);
    }

    #[tokio::test]
    async fn test_transport_failure_aborts_without_commit() {
        let mut h = Harness::with_book(two_chapter_book(), vec![MockReply::Fail("down".to_string())]);
        let target = ChapterRef::new("V1", "C1");
        let result = generate_chapter(&mut h.run, &target, false).await;
        assert!(matches!(result, Err(RunError::Transport(_))));
        assert_eq!(h.run.state.read_content(&target).await.unwrap(), "");
    }
}
