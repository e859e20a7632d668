//! Volume planning stage
//!
//! Expands thin volume synopses and proposes further volumes until the
//! story reaches closure.

use bookstore::Book;
use serde::Serialize;
use tracing::{debug, info};

use crate::context::existing_volumes_json;
use crate::merge::MergeOutcome;
use crate::state::StateError;
use crate::structured::VolumePlan;
use crate::task::{RunError, TaskRun};

#[derive(Serialize)]
struct VolumePromptContext {
    global_synopsis: String,
    existing_volumes: String,
}

/// Whether the book already has enough fleshed-out volumes
fn plan_is_complete(run: &TaskRun, book: &Book) -> bool {
    book.volumes.len() >= run.limits.min_volumes && !book.volumes.iter().any(|v| run.limits.is_short(&v.synopsis))
}

/// Run the volume planning stage
pub async fn plan_volumes(run: &mut TaskRun) -> Result<(), RunError> {
    debug!(task_id = %run.task_id, "plan_volumes: called");
    let book = run.state.snapshot().await?;

    if plan_is_complete(run, &book) {
        info!(volumes = book.volumes.len(), "Volume plan complete, skipping");
        run.emitter.status(format!(
            "Volume plan already has {} volumes with synopses, skipping",
            book.volumes.len()
        ));
        return Ok(());
    }

    run.emitter.status("Planning volumes");
    let ctx = VolumePromptContext {
        global_synopsis: book.global_synopsis.clone(),
        existing_volumes: existing_volumes_json(&book),
    };
    let system = run.render("plan-system", &ctx)?;
    let user = run.render("plan-volumes", &ctx)?;

    let Some(plan) = run.stream_structured::<VolumePlan>(system, user, "volume plan").await? else {
        run.report.skipped += 1;
        return Ok(());
    };
    debug!(
        updated = plan.updated_existing_volumes.len(),
        new = plan.new_volumes.len(),
        "plan_volumes: plan received"
    );

    for entry in &plan.updated_existing_volumes {
        run.check_cancel()?;
        match run.state.merge_volume_synopsis(&entry.name, &entry.synopsis).await? {
            MergeOutcome::Applied => {
                run.report.committed += 1;
                run.emitter.unit_completed(&entry.name, None, "synopsis expanded");
            }
            MergeOutcome::Kept => {
                debug!(volume = %entry.name, "plan_volumes: existing synopsis kept");
            }
            MergeOutcome::Unknown => {
                run.warn(format!("Plan updates unknown volume '{}', ignoring", entry.name));
            }
        }
    }

    for entry in &plan.new_volumes {
        run.check_cancel()?;
        match run.state.add_volume(&entry.name, &entry.synopsis).await {
            Ok(_) => {
                info!(volume = %entry.name, "Created volume");
                run.report.committed += 1;
                run.emitter.unit_completed(&entry.name, None, "volume created");
            }
            Err(StateError::NameCollision(name)) => {
                run.report.skipped += 1;
                run.emitter.log(format!("Volume '{}' already exists, skipping", name));
            }
            Err(StateError::InvalidName(name)) => {
                run.warn(format!("Plan proposes invalid volume name '{}', skipping", name));
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::MockReply;
    use crate::task::testing::Harness;
    use bookstore::Volume;
    use serde_json::json;

    fn book_with_volumes(synopses: &[&str]) -> Book {
        let mut book = Book::new("T");
        book.global_synopsis = "An orphan avenges her clan.".to_string();
        for (i, s) in synopses.iter().enumerate() {
            book.volumes.push(Volume::new(format!("V{}", i + 1), *s));
        }
        book
    }

    #[tokio::test]
    async fn test_skips_when_plan_complete() {
        let long = "a sufficiently long synopsis";
        let mut h = Harness::with_book(book_with_volumes(&[long; 5]), vec![]);
        plan_volumes(&mut h.run).await.unwrap();
        assert_eq!(h.llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_short_synopsis_triggers_planning() {
        let long = "a sufficiently long synopsis";
        let reply = MockReply::json(json!({
            "updated_existing_volumes": [{"name": "V5", "synopsis": "the final confrontation at the mountain gate"}],
            "new_volumes": []
        }));
        let mut h = Harness::with_book(book_with_volumes(&[long, long, long, long, "short"]), vec![reply]);
        plan_volumes(&mut h.run).await.unwrap();

        let book = h.book().await;
        assert_eq!(book.volumes[4].synopsis, "the final confrontation at the mountain gate");
        assert!(h.llm.requests()[0].json_mode);
    }

    #[tokio::test]
    async fn test_adds_new_and_skips_duplicates() {
        let reply = MockReply::json(json!({
            "updated_existing_volumes": [
                {"name": "V1", "synopsis": "x"},
                {"name": "V9", "synopsis": "ghost volume synopsis"}
            ],
            "new_volumes": [
                {"name": "V1", "synopsis": "duplicate"},
                {"name": "War", "synopsis": "the clans go to war"}
            ]
        }));
        let mut h = Harness::with_book(book_with_volumes(&["the beginning"]), vec![reply]);
        plan_volumes(&mut h.run).await.unwrap();

        let book = h.book().await;
        let names: Vec<_> = book.volumes.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["V1", "War"]);
        // Shorter proposal did not replace the user's text
        assert_eq!(book.volumes[0].synopsis, "the beginning");
        assert_eq!(h.run.report.committed, 1);
        assert_eq!(h.run.report.skipped, 1);
        assert_eq!(h.run.report.warnings, 1);
    }

    #[tokio::test]
    async fn test_malformed_reply_changes_nothing() {
        let mut h = Harness::with_book(book_with_volumes(&[""]), vec![MockReply::text("{\"new_volumes\": [")]);
        let before = h.book().await;
        plan_volumes(&mut h.run).await.unwrap();
        assert_eq!(h.book().await, before);
        assert_eq!(h.run.report.warnings, 1);
    }

    #[tokio::test]
    async fn test_prompt_carries_existing_volumes() {
        let reply = MockReply::json(json!({}));
        let mut h = Harness::with_book(book_with_volumes(&["the beginning"]), vec![reply]);
        plan_volumes(&mut h.run).await.unwrap();
        let prompt = &h.llm.requests()[0].user_prompt;
        assert!(prompt.contains("\"name\": \"V1\""));
        assert!(prompt.contains("An orphan avenges her clan."));
    }
}
