//! In-memory document store

use std::collections::HashMap;
use tracing::debug;

use crate::error::StoreError;
use crate::model::{Book, Chapter, Volume};
use crate::store::{DocumentStore, chapter_ref, check_chapter_name_free, check_volume_name_free, volume_ref};

/// Document store that keeps everything in memory
///
/// Enforces the same naming rules as `FileStore`; useful for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    book: Book,
    content: HashMap<(String, String), String>,
}

impl MemoryStore {
    pub fn new(book: Book) -> Self {
        Self {
            book,
            content: HashMap::new(),
        }
    }

    /// Seed chapter content directly
    pub fn with_content(mut self, volume: &str, chapter: &str, text: &str) -> Self {
        self.content
            .insert((volume.to_string(), chapter.to_string()), text.to_string());
        self
    }
}

impl DocumentStore for MemoryStore {
    fn book(&self) -> &Book {
        &self.book
    }

    fn read_chapter_content(&self, volume: &str, chapter: &str) -> Result<String, StoreError> {
        Ok(self
            .content
            .get(&(volume.to_string(), chapter.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    fn save_chapter_content(&mut self, volume: &str, chapter: &str, text: &str) -> Result<(), StoreError> {
        debug!(%volume, %chapter, "MemoryStore::save_chapter_content: called");
        self.content
            .insert((volume.to_string(), chapter.to_string()), text.to_string());
        Ok(())
    }

    fn add_volume(&mut self, name: &str, synopsis: &str) -> Result<usize, StoreError> {
        check_volume_name_free(&self.book, name)?;
        self.book.volumes.push(Volume::new(name, synopsis));
        Ok(self.book.volumes.len() - 1)
    }

    fn add_chapter(
        &mut self,
        volume: usize,
        name: &str,
        synopsis: &str,
        ai_synopsis: &str,
    ) -> Result<usize, StoreError> {
        check_chapter_name_free(&self.book, volume, name)?;
        let volume_name = volume_ref(&self.book, volume)?.name.clone();
        self.content.remove(&(volume_name, name.to_string()));
        let chapters = &mut self.book.volumes[volume].chapters;
        chapters.push(Chapter::new(name, synopsis, ai_synopsis));
        Ok(chapters.len() - 1)
    }

    fn rename_volume(&mut self, volume: usize, new_name: &str) -> Result<(), StoreError> {
        let old_name = volume_ref(&self.book, volume)?.name.clone();
        if old_name == new_name {
            return Ok(());
        }
        check_volume_name_free(&self.book, new_name)?;

        let moved: Vec<_> = self.content.keys().filter(|(v, _)| *v == old_name).cloned().collect();
        for key in moved {
            if let Some(text) = self.content.remove(&key) {
                self.content.insert((new_name.to_string(), key.1), text);
            }
        }
        self.book.volumes[volume].name = new_name.to_string();
        Ok(())
    }

    fn rename_chapter(&mut self, volume: usize, chapter: usize, new_name: &str) -> Result<(), StoreError> {
        let old_name = chapter_ref(&self.book, volume, chapter)?.name.clone();
        if old_name == new_name {
            return Ok(());
        }
        check_chapter_name_free(&self.book, volume, new_name)?;

        let volume_name = self.book.volumes[volume].name.clone();
        if let Some(text) = self.content.remove(&(volume_name.clone(), old_name)) {
            self.content.insert((volume_name, new_name.to_string()), text);
        }
        self.book.volumes[volume].chapters[chapter].name = new_name.to_string();
        Ok(())
    }

    fn delete_volume(&mut self, volume: usize) -> Result<Volume, StoreError> {
        volume_ref(&self.book, volume)?;
        let removed = self.book.volumes.remove(volume);
        self.content.retain(|(v, _), _| *v != removed.name);
        Ok(removed)
    }

    fn delete_chapter(&mut self, volume: usize, chapter: usize) -> Result<Chapter, StoreError> {
        chapter_ref(&self.book, volume, chapter)?;
        let removed = self.book.volumes[volume].chapters.remove(chapter);
        let volume_name = self.book.volumes[volume].name.clone();
        self.content.remove(&(volume_name, removed.name.clone()));
        Ok(removed)
    }

    fn update_meta(&mut self, edit: &mut dyn FnMut(&mut Book)) -> Result<(), StoreError> {
        edit(&mut self.book);
        Ok(())
    }
}
