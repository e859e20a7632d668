//! StateManager - actor that owns the DocumentStore
//!
//! Every read and write of the book goes through this actor, so user edits
//! and pipeline commits are serialized against one another.

use std::collections::HashMap;
use std::path::Path;

use bookstore::{Book, ChapterRef, DocumentStore, FileStore, is_blank};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::merge::{self, MergeOutcome};

use super::messages::{CommitReport, MetaEdit, StateCommand, StateError, StateResponse, TaskScope};

/// Event broadcast after the book changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateEvent {
    /// Titles, synopses, summaries or characters changed
    MetaChanged,
    /// A volume or chapter was added, renamed or deleted
    StructureChanged,
    /// A chapter's prose was written
    ContentSaved { target: ChapterRef },
}

/// Handle to send commands to the StateManager
#[derive(Clone)]
pub struct StateManager {
    tx: mpsc::Sender<StateCommand>,
    /// Broadcast sender for change notifications
    event_tx: broadcast::Sender<StateEvent>,
}

impl StateManager {
    /// Spawn a StateManager actor over an already opened store
    pub fn spawn(store: Box<dyn DocumentStore>) -> Self {
        debug!(title = %store.book().title, "spawn: called");
        let (tx, rx) = mpsc::channel(256);
        let (event_tx, _) = broadcast::channel(64);

        let actor = Actor {
            store,
            claims: HashMap::new(),
            event_tx: event_tx.clone(),
        };
        tokio::spawn(actor.run(rx));

        info!("StateManager spawned");
        Self { tx, event_tx }
    }

    /// Open a project directory and spawn an actor over it
    pub fn open(project: impl AsRef<Path>) -> eyre::Result<Self> {
        debug!(project = %project.as_ref().display(), "open: called");
        let store = FileStore::open(project)?;
        Ok(Self::spawn(Box::new(store)))
    }

    /// Subscribe to change notifications
    pub fn subscribe_events(&self) -> broadcast::Receiver<StateEvent> {
        self.event_tx.subscribe()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<StateResponse<T>>) -> StateCommand,
    ) -> StateResponse<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(make(reply_tx)).await.map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    // === Reads ===

    /// Consistent copy of the whole book
    pub async fn snapshot(&self) -> StateResponse<Book> {
        debug!("snapshot: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(StateCommand::Snapshot { reply: reply_tx })
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)
    }

    /// Stored prose of a chapter; empty when never written
    pub async fn read_content(&self, target: &ChapterRef) -> StateResponse<String> {
        debug!(%target, "read_content: called");
        let target = target.clone();
        self.request(|reply| StateCommand::ReadContent { target, reply }).await
    }

    // === User edits ===

    pub async fn save_content(&self, target: &ChapterRef, text: &str) -> StateResponse<()> {
        debug!(%target, len = text.len(), "save_content: called");
        let target = target.clone();
        let text = text.to_string();
        self.request(|reply| StateCommand::SaveContent { target, text, reply })
            .await
    }

    pub async fn add_volume(&self, name: &str, synopsis: &str) -> StateResponse<usize> {
        debug!(%name, "add_volume: called");
        let name = name.to_string();
        let synopsis = synopsis.to_string();
        self.request(|reply| StateCommand::AddVolume { name, synopsis, reply })
            .await
    }

    pub async fn add_chapter(
        &self,
        volume: &str,
        name: &str,
        synopsis: &str,
        ai_synopsis: &str,
    ) -> StateResponse<usize> {
        debug!(%volume, %name, "add_chapter: called");
        let volume = volume.to_string();
        let name = name.to_string();
        let synopsis = synopsis.to_string();
        let ai_synopsis = ai_synopsis.to_string();
        self.request(|reply| StateCommand::AddChapter {
            volume,
            name,
            synopsis,
            ai_synopsis,
            reply,
        })
        .await
    }

    pub async fn rename_volume(&self, volume: &str, new_name: &str) -> StateResponse<()> {
        debug!(%volume, %new_name, "rename_volume: called");
        let volume = volume.to_string();
        let new_name = new_name.to_string();
        self.request(|reply| StateCommand::RenameVolume { volume, new_name, reply })
            .await
    }

    pub async fn rename_chapter(&self, target: &ChapterRef, new_name: &str) -> StateResponse<()> {
        debug!(%target, %new_name, "rename_chapter: called");
        let target = target.clone();
        let new_name = new_name.to_string();
        self.request(|reply| StateCommand::RenameChapter { target, new_name, reply })
            .await
    }

    pub async fn delete_volume(&self, volume: &str) -> StateResponse<()> {
        debug!(%volume, "delete_volume: called");
        let volume = volume.to_string();
        self.request(|reply| StateCommand::DeleteVolume { volume, reply }).await
    }

    pub async fn delete_chapter(&self, target: &ChapterRef) -> StateResponse<()> {
        debug!(%target, "delete_chapter: called");
        let target = target.clone();
        self.request(|reply| StateCommand::DeleteChapter { target, reply }).await
    }

    /// Apply a metadata-only edit
    pub async fn edit_meta(&self, edit: MetaEdit) -> StateResponse<()> {
        debug!(?edit, "edit_meta: called");
        self.request(|reply| StateCommand::EditMeta { edit, reply }).await
    }

    // === Pipeline commits ===

    /// Merge an AI-proposed volume synopsis under the protective rule
    pub async fn merge_volume_synopsis(&self, volume: &str, proposed: &str) -> StateResponse<MergeOutcome> {
        debug!(%volume, "merge_volume_synopsis: called");
        let volume = volume.to_string();
        let proposed = proposed.to_string();
        self.request(|reply| StateCommand::MergeVolumeSynopsis {
            volume,
            proposed,
            reply,
        })
        .await
    }

    /// Merge an AI-proposed chapter summary under the protective rule
    pub async fn merge_chapter_summary(&self, target: &ChapterRef, proposed: &str) -> StateResponse<MergeOutcome> {
        debug!(%target, "merge_chapter_summary: called");
        let target = target.clone();
        let proposed = proposed.to_string();
        self.request(|reply| StateCommand::MergeChapterSummary {
            target,
            proposed,
            reply,
        })
        .await
    }

    /// Write generated or corrected prose and store its summary
    ///
    /// Blank prose is not written; a non-blank summary always replaces the
    /// chapter's AI summary.
    pub async fn commit_chapter(&self, target: &ChapterRef, content: &str, summary: &str) -> StateResponse<CommitReport> {
        debug!(%target, content_len = content.len(), summary_len = summary.len(), "commit_chapter: called");
        let target = target.clone();
        let content = content.to_string();
        let summary = summary.to_string();
        self.request(|reply| StateCommand::CommitChapter {
            target,
            content,
            summary,
            reply,
        })
        .await
    }

    // === Task claims ===

    /// Register a running task's scope; fails while another claim is held
    pub async fn claim(&self, task_id: &str, scope: TaskScope) -> StateResponse<()> {
        debug!(%task_id, ?scope, "claim: called");
        let task_id = task_id.to_string();
        self.request(|reply| StateCommand::Claim { task_id, scope, reply })
            .await
    }

    /// Drop a task's claim
    pub async fn release(&self, task_id: &str) -> StateResponse<()> {
        debug!(%task_id, "release: called");
        self.tx
            .send(StateCommand::Release {
                task_id: task_id.to_string(),
            })
            .await
            .map_err(|_| StateError::ChannelError)
    }

    /// Shutdown the StateManager
    pub async fn shutdown(&self) -> StateResponse<()> {
        debug!("shutdown: called");
        self.tx
            .send(StateCommand::Shutdown)
            .await
            .map_err(|_| StateError::ChannelError)
    }
}

/// Actor state: the store plus the claims of running tasks
struct Actor {
    store: Box<dyn DocumentStore>,
    claims: HashMap<String, TaskScope>,
    event_tx: broadcast::Sender<StateEvent>,
}

impl Actor {
    async fn run(mut self, mut rx: mpsc::Receiver<StateCommand>) {
        debug!("StateManager actor started");

        while let Some(cmd) = rx.recv().await {
            match cmd {
                StateCommand::Snapshot { reply } => {
                    let _ = reply.send(self.store.book().clone());
                }

                StateCommand::ReadContent { target, reply } => {
                    let result = self.locate(&target).and_then(|_| {
                        self.store
                            .read_chapter_content(&target.volume, &target.chapter)
                            .map_err(StateError::from)
                    });
                    let _ = reply.send(result);
                }

                StateCommand::SaveContent { target, text, reply } => {
                    debug!(%target, "actor: SaveContent command");
                    let _ = reply.send(self.save_content(&target, &text));
                }

                StateCommand::AddVolume { name, synopsis, reply } => {
                    debug!(%name, "actor: AddVolume command");
                    let result = self.store.add_volume(&name, &synopsis).map_err(StateError::from);
                    self.notify_ok(&result, StateEvent::StructureChanged);
                    let _ = reply.send(result);
                }

                StateCommand::AddChapter {
                    volume,
                    name,
                    synopsis,
                    ai_synopsis,
                    reply,
                } => {
                    debug!(%volume, %name, "actor: AddChapter command");
                    let result = self.add_chapter(&volume, &name, &synopsis, &ai_synopsis);
                    self.notify_ok(&result, StateEvent::StructureChanged);
                    let _ = reply.send(result);
                }

                StateCommand::RenameVolume { volume, new_name, reply } => {
                    debug!(%volume, %new_name, "actor: RenameVolume command");
                    let result = self.rename_volume(&volume, &new_name);
                    self.notify_ok(&result, StateEvent::StructureChanged);
                    let _ = reply.send(result);
                }

                StateCommand::RenameChapter { target, new_name, reply } => {
                    debug!(%target, %new_name, "actor: RenameChapter command");
                    let result = self.rename_chapter(&target, &new_name);
                    self.notify_ok(&result, StateEvent::StructureChanged);
                    let _ = reply.send(result);
                }

                StateCommand::DeleteVolume { volume, reply } => {
                    debug!(%volume, "actor: DeleteVolume command");
                    let result = self.delete_volume(&volume);
                    self.notify_ok(&result, StateEvent::StructureChanged);
                    let _ = reply.send(result);
                }

                StateCommand::DeleteChapter { target, reply } => {
                    debug!(%target, "actor: DeleteChapter command");
                    let result = self.delete_chapter(&target);
                    self.notify_ok(&result, StateEvent::StructureChanged);
                    let _ = reply.send(result);
                }

                StateCommand::EditMeta { edit, reply } => {
                    debug!(?edit, "actor: EditMeta command");
                    let result = self.edit_meta(edit);
                    self.notify_ok(&result, StateEvent::MetaChanged);
                    let _ = reply.send(result);
                }

                StateCommand::MergeVolumeSynopsis {
                    volume,
                    proposed,
                    reply,
                } => {
                    debug!(%volume, "actor: MergeVolumeSynopsis command");
                    let result = self.merge_meta(|book| merge::merge_volume_synopsis(book, &volume, &proposed));
                    let _ = reply.send(result);
                }

                StateCommand::MergeChapterSummary {
                    target,
                    proposed,
                    reply,
                } => {
                    debug!(%target, "actor: MergeChapterSummary command");
                    let result = self.merge_chapter_summary(&target, &proposed);
                    let _ = reply.send(result);
                }

                StateCommand::CommitChapter {
                    target,
                    content,
                    summary,
                    reply,
                } => {
                    debug!(%target, "actor: CommitChapter command");
                    let _ = reply.send(self.commit_chapter(&target, &content, &summary));
                }

                StateCommand::Claim { task_id, scope, reply } => {
                    debug!(%task_id, ?scope, "actor: Claim command");
                    let result = match self.claims.keys().next() {
                        Some(holder) => Err(StateError::Busy(format!("book (held by task {})", holder))),
                        None => {
                            self.claims.insert(task_id, scope);
                            Ok(())
                        }
                    };
                    let _ = reply.send(result);
                }

                StateCommand::Release { task_id } => {
                    debug!(%task_id, "actor: Release command");
                    self.claims.remove(&task_id);
                }

                StateCommand::Shutdown => {
                    info!("StateManager shutting down");
                    break;
                }
            }
        }

        debug!("StateManager actor stopped");
    }

    fn notify(&self, event: StateEvent) {
        let _ = self.event_tx.send(event);
    }

    fn notify_ok<T>(&self, result: &StateResponse<T>, event: StateEvent) {
        if result.is_ok() {
            self.notify(event);
        }
    }

    fn volume_index(&self, volume: &str) -> StateResponse<usize> {
        self.store
            .book()
            .volume_index(volume)
            .ok_or_else(|| StateError::NotFound(format!("volume {}", volume)))
    }

    fn locate(&self, target: &ChapterRef) -> StateResponse<(usize, usize)> {
        self.store
            .book()
            .locate(target)
            .ok_or_else(|| StateError::NotFound(format!("chapter {}", target)))
    }

    fn check_volume_free(&self, volume: &str) -> StateResponse<()> {
        match self.claims.values().any(|scope| scope.covers_volume(volume)) {
            true => Err(StateError::Busy(format!("volume {}", volume))),
            false => Ok(()),
        }
    }

    fn check_chapter_free(&self, target: &ChapterRef) -> StateResponse<()> {
        match self.claims.values().any(|scope| scope.covers_chapter(target)) {
            true => Err(StateError::Busy(format!("chapter {}", target))),
            false => Ok(()),
        }
    }

    fn save_content(&mut self, target: &ChapterRef, text: &str) -> StateResponse<()> {
        self.locate(target)?;
        self.store.save_chapter_content(&target.volume, &target.chapter, text)?;
        self.notify(StateEvent::ContentSaved { target: target.clone() });
        Ok(())
    }

    fn add_chapter(&mut self, volume: &str, name: &str, synopsis: &str, ai_synopsis: &str) -> StateResponse<usize> {
        let v_idx = self.volume_index(volume)?;
        Ok(self.store.add_chapter(v_idx, name, synopsis, ai_synopsis)?)
    }

    fn rename_volume(&mut self, volume: &str, new_name: &str) -> StateResponse<()> {
        let v_idx = self.volume_index(volume)?;
        self.check_volume_free(volume)?;
        Ok(self.store.rename_volume(v_idx, new_name)?)
    }

    fn rename_chapter(&mut self, target: &ChapterRef, new_name: &str) -> StateResponse<()> {
        let (v_idx, c_idx) = self.locate(target)?;
        self.check_chapter_free(target)?;
        Ok(self.store.rename_chapter(v_idx, c_idx, new_name)?)
    }

    fn delete_volume(&mut self, volume: &str) -> StateResponse<()> {
        let v_idx = self.volume_index(volume)?;
        self.check_volume_free(volume)?;
        let removed = self.store.delete_volume(v_idx)?;
        info!(volume = %removed.name, chapters = removed.chapters.len(), "Deleted volume");
        Ok(())
    }

    fn delete_chapter(&mut self, target: &ChapterRef) -> StateResponse<()> {
        let (v_idx, c_idx) = self.locate(target)?;
        self.check_chapter_free(target)?;
        let removed = self.store.delete_chapter(v_idx, c_idx)?;
        info!(volume = %target.volume, chapter = %removed.name, "Deleted chapter");
        Ok(())
    }

    fn edit_meta(&mut self, edit: MetaEdit) -> StateResponse<()> {
        let book = self.store.book();
        match &edit {
            MetaEdit::SetVolumeSynopsis { volume, .. } => {
                self.volume_index(volume)?;
            }
            MetaEdit::SetChapterSynopsis { target, .. } => {
                self.locate(target)?;
            }
            MetaEdit::AddCharacter(character) => {
                if is_blank(&character.name) {
                    return Err(StateError::InvalidName(character.name.clone()));
                }
                if book.characters.iter().any(|c| c.name == character.name) {
                    return Err(StateError::NameCollision(character.name.clone()));
                }
            }
            MetaEdit::RemoveCharacter(name) => {
                if !book.characters.iter().any(|c| &c.name == name) {
                    return Err(StateError::NotFound(format!("character {}", name)));
                }
            }
            MetaEdit::SetTitle(_) | MetaEdit::SetGlobalSynopsis(_) => {}
        }

        let mut pending = Some(edit);
        self.store.update_meta(&mut |book| {
            let Some(edit) = pending.take() else { return };
            match edit {
                MetaEdit::SetTitle(title) => book.title = title,
                MetaEdit::SetGlobalSynopsis(text) => book.global_synopsis = text,
                MetaEdit::AddCharacter(character) => book.characters.push(character),
                MetaEdit::RemoveCharacter(name) => book.characters.retain(|c| c.name != name),
                MetaEdit::SetVolumeSynopsis { volume, synopsis } => {
                    if let Some(v) = book.volumes.iter_mut().find(|v| v.name == volume) {
                        v.synopsis = synopsis;
                    }
                }
                MetaEdit::SetChapterSynopsis { target, synopsis } => {
                    if let Some((v_idx, c_idx)) = book.locate(&target)
                        && let Some(chapter) = book.chapter_mut(v_idx, c_idx)
                    {
                        chapter.synopsis = synopsis;
                    }
                }
            }
        })?;
        Ok(())
    }

    /// Run a merge against a scratch copy first; write only when it applies
    fn merge_meta(&mut self, mut apply: impl FnMut(&mut Book) -> MergeOutcome) -> StateResponse<MergeOutcome> {
        let mut scratch = self.store.book().clone();
        let outcome = apply(&mut scratch);
        if outcome != MergeOutcome::Applied {
            debug!(?outcome, "merge_meta: nothing to write");
            return Ok(outcome);
        }
        self.store.update_meta(&mut |book| {
            apply(book);
        })?;
        self.notify(StateEvent::MetaChanged);
        Ok(outcome)
    }

    fn merge_chapter_summary(&mut self, target: &ChapterRef, proposed: &str) -> StateResponse<MergeOutcome> {
        let Some(v_idx) = self.store.book().volume_index(&target.volume) else {
            return Ok(MergeOutcome::Unknown);
        };
        self.merge_meta(|book| merge::merge_chapter_summary(book, v_idx, &target.chapter, proposed))
    }

    fn commit_chapter(&mut self, target: &ChapterRef, content: &str, summary: &str) -> StateResponse<CommitReport> {
        self.locate(target)?;

        let content_saved = if is_blank(content) {
            warn!(%target, "commit_chapter: blank content, keeping stored prose");
            false
        } else {
            self.save_content(target, content)?;
            true
        };
        let Some(v_idx) = self.store.book().volume_index(&target.volume) else {
            return Err(StateError::NotFound(format!("volume {}", target.volume)));
        };
        let summary = self.merge_meta(|book| merge::replace_chapter_summary(book, v_idx, &target.chapter, summary))?;

        Ok(CommitReport { content_saved, summary })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookstore::{Chapter, Character, MemoryStore, Volume};
    use tempfile::tempdir;

    fn sample_book() -> Book {
        let mut book = Book::new("Test");
        let mut v1 = Volume::new("V1", "short");
        v1.chapters.push(Chapter::new("C1", "hero enters forest", ""));
        v1.chapters.push(Chapter::new("C2", "", ""));
        book.volumes.push(v1);
        book.volumes.push(Volume::new("V2", ""));
        book
    }

    fn spawn_memory() -> StateManager {
        StateManager::spawn(Box::new(MemoryStore::new(sample_book())))
    }

    #[tokio::test]
    async fn test_structure_crud() {
        let manager = spawn_memory();
        let mut events = manager.subscribe_events();

        assert_eq!(manager.add_volume("V3", "war").await.unwrap(), 2);
        assert_eq!(events.recv().await.unwrap(), StateEvent::StructureChanged);
        assert_eq!(manager.add_chapter("V3", "C1", "", "plan").await.unwrap(), 0);

        manager.rename_volume("V3", "Finale").await.unwrap();
        manager.rename_chapter(&ChapterRef::new("Finale", "C1"), "Last Stand").await.unwrap();
        let book = manager.snapshot().await.unwrap();
        assert_eq!(book.volumes[2].name, "Finale");
        assert_eq!(book.volumes[2].chapters[0].name, "Last Stand");

        manager.delete_chapter(&ChapterRef::new("Finale", "Last Stand")).await.unwrap();
        manager.delete_volume("Finale").await.unwrap();
        assert_eq!(manager.snapshot().await.unwrap().volumes.len(), 2);

        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_name_collision_leaves_book_unchanged() {
        let manager = spawn_memory();
        let before = manager.snapshot().await.unwrap();

        let err = manager.add_chapter("V1", "C1", "", "").await.unwrap_err();
        assert!(matches!(err, StateError::NameCollision(_)));
        let err = manager.rename_volume("V2", "V1").await.unwrap_err();
        assert!(matches!(err, StateError::NameCollision(_)));

        assert_eq!(manager.snapshot().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_unknown_targets() {
        let manager = spawn_memory();
        assert!(matches!(
            manager.add_chapter("V9", "C1", "", "").await,
            Err(StateError::NotFound(_))
        ));
        assert!(matches!(
            manager.read_content(&ChapterRef::new("V1", "C9")).await,
            Err(StateError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_merge_volume_synopsis_rule() {
        let manager = spawn_memory();
        assert_eq!(
            manager.merge_volume_synopsis("V1", "a much longer volume synopsis").await.unwrap(),
            MergeOutcome::Applied
        );
        assert_eq!(
            manager.merge_volume_synopsis("V1", "tiny").await.unwrap(),
            MergeOutcome::Kept
        );
        assert_eq!(
            manager.merge_volume_synopsis("V9", "whatever").await.unwrap(),
            MergeOutcome::Unknown
        );
        let book = manager.snapshot().await.unwrap();
        assert_eq!(book.volumes[0].synopsis, "a much longer volume synopsis");
    }

    #[tokio::test]
    async fn test_commit_chapter_writes_content_and_summary() {
        let manager = spawn_memory();
        let mut events = manager.subscribe_events();
        let target = ChapterRef::new("V1", "C2");

        let report = manager
            .commit_chapter(&target, "The wolf howled.", "The wolf appears.")
            .await
            .unwrap();
        assert!(report.content_saved);
        assert_eq!(report.summary, MergeOutcome::Applied);
        assert_eq!(
            events.recv().await.unwrap(),
            StateEvent::ContentSaved { target: target.clone() }
        );

        assert_eq!(manager.read_content(&target).await.unwrap(), "The wolf howled.");
        let book = manager.snapshot().await.unwrap();
        assert_eq!(book.volumes[0].chapters[1].ai_synopsis, "The wolf appears.");
        assert_eq!(book.volumes[0].chapters[1].synopsis, "");
    }

    #[tokio::test]
    async fn test_commit_chapter_replaces_longer_planned_summary() {
        let mut book = sample_book();
        book.volumes[0].chapters[0].ai_synopsis =
            "the hero will probably meet a talking fox and a wolf pack at the river".to_string();
        let manager = StateManager::spawn(Box::new(MemoryStore::new(book)));
        let target = ChapterRef::new("V1", "C1");

        let report = manager
            .commit_chapter(&target, "Prose.", "Hero met the wolf.")
            .await
            .unwrap();
        assert_eq!(report.summary, MergeOutcome::Applied);
        let book = manager.snapshot().await.unwrap();
        assert_eq!(book.volumes[0].chapters[0].ai_synopsis, "Hero met the wolf.");
        assert_eq!(book.volumes[0].chapters[0].synopsis, "hero enters forest");
    }

    #[tokio::test]
    async fn test_commit_chapter_blank_content_keeps_prose() {
        let store = MemoryStore::new(sample_book()).with_content("V1", "C1", "original prose");
        let manager = StateManager::spawn(Box::new(store));
        let target = ChapterRef::new("V1", "C1");

        let report = manager.commit_chapter(&target, "   ", "").await.unwrap();
        assert!(!report.content_saved);
        assert_eq!(report.summary, MergeOutcome::Kept);
        assert_eq!(manager.read_content(&target).await.unwrap(), "original prose");
    }

    #[tokio::test]
    async fn test_claims_block_rename_and_delete() {
        let manager = spawn_memory();
        let target = ChapterRef::new("V1", "C1");
        manager.claim("task-1", TaskScope::Chapter(target.clone())).await.unwrap();

        assert!(matches!(
            manager.rename_chapter(&target, "Renamed").await,
            Err(StateError::Busy(_))
        ));
        assert!(matches!(manager.delete_volume("V1").await, Err(StateError::Busy(_))));
        // Outside the claim
        manager.rename_volume("V2", "Second").await.unwrap();
        // A second claim is refused
        assert!(matches!(
            manager.claim("task-2", TaskScope::Book).await,
            Err(StateError::Busy(_))
        ));

        manager.release("task-1").await.unwrap();
        manager.rename_chapter(&target, "Renamed").await.unwrap();
    }

    #[tokio::test]
    async fn test_edit_meta() {
        let manager = spawn_memory();
        manager
            .edit_meta(MetaEdit::SetGlobalSynopsis("An orphan seeks revenge.".to_string()))
            .await
            .unwrap();
        manager
            .edit_meta(MetaEdit::AddCharacter(Character {
                name: "Lin".to_string(),
                ..Default::default()
            }))
            .await
            .unwrap();
        assert!(matches!(
            manager
                .edit_meta(MetaEdit::AddCharacter(Character {
                    name: "Lin".to_string(),
                    ..Default::default()
                }))
                .await,
            Err(StateError::NameCollision(_))
        ));
        manager
            .edit_meta(MetaEdit::SetChapterSynopsis {
                target: ChapterRef::new("V1", "C2"),
                synopsis: "the wolf attacks".to_string(),
            })
            .await
            .unwrap();

        let book = manager.snapshot().await.unwrap();
        assert_eq!(book.global_synopsis, "An orphan seeks revenge.");
        assert_eq!(book.characters.len(), 1);
        assert_eq!(book.volumes[0].chapters[1].synopsis, "the wolf attacks");

        manager.edit_meta(MetaEdit::RemoveCharacter("Lin".to_string())).await.unwrap();
        assert!(manager.snapshot().await.unwrap().characters.is_empty());
    }

    #[tokio::test]
    async fn test_file_backed_manager_persists() {
        let temp = tempdir().unwrap();
        {
            let manager = StateManager::open(temp.path()).unwrap();
            manager.add_volume("V1", "").await.unwrap();
            manager.add_chapter("V1", "C1", "", "").await.unwrap();
            manager
                .save_content(&ChapterRef::new("V1", "C1"), "Once upon a time.")
                .await
                .unwrap();
            manager.shutdown().await.unwrap();
        }

        let manager = StateManager::open(temp.path()).unwrap();
        assert_eq!(
            manager.read_content(&ChapterRef::new("V1", "C1")).await.unwrap(),
            "Once upon a time."
        );
    }
}
