//! DocumentStore trait and the directory-backed FileStore

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::model::{Book, Chapter, Volume};

/// Metadata file name inside a project directory
pub const META_FILE: &str = "meta.json";

/// Extension of chapter content files
pub const CONTENT_EXTENSION: &str = "txt";

/// Owner of the hierarchical document and its persisted text
///
/// Chapter content is addressed by the (volume name, chapter name) pair.
/// Every mutation is persisted before the call returns; a failed write is
/// reported as an error and leaves the in-memory book unchanged.
pub trait DocumentStore: Send {
    /// Current book metadata
    fn book(&self) -> &Book;

    /// Read a chapter's prose; a chapter that was never written reads as empty
    fn read_chapter_content(&self, volume: &str, chapter: &str) -> Result<String, StoreError>;

    /// Replace a chapter's prose
    fn save_chapter_content(&mut self, volume: &str, chapter: &str, text: &str) -> Result<(), StoreError>;

    /// Append a volume, returning its index
    fn add_volume(&mut self, name: &str, synopsis: &str) -> Result<usize, StoreError>;

    /// Append a chapter to a volume, returning its index
    fn add_chapter(&mut self, volume: usize, name: &str, synopsis: &str, ai_synopsis: &str)
    -> Result<usize, StoreError>;

    /// Rename a volume, moving its stored content with it
    fn rename_volume(&mut self, volume: usize, new_name: &str) -> Result<(), StoreError>;

    /// Rename a chapter, moving its stored content with it
    fn rename_chapter(&mut self, volume: usize, chapter: usize, new_name: &str) -> Result<(), StoreError>;

    /// Remove a volume and all of its stored content
    fn delete_volume(&mut self, volume: usize) -> Result<Volume, StoreError>;

    /// Remove a chapter and its stored content
    fn delete_chapter(&mut self, volume: usize, chapter: usize) -> Result<Chapter, StoreError>;

    /// Apply a metadata edit and persist it
    fn update_meta(&mut self, edit: &mut dyn FnMut(&mut Book)) -> Result<(), StoreError>;
}

/// Reject names that cannot address a file or directory
pub(crate) fn validate_name(name: &str) -> Result<(), StoreError> {
    let trimmed = name.trim();
    if trimmed.is_empty()
        || trimmed != name
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0'])
    {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}

pub(crate) fn volume_ref(book: &Book, volume: usize) -> Result<&Volume, StoreError> {
    book.volumes.get(volume).ok_or(StoreError::VolumeNotFound(volume))
}

pub(crate) fn chapter_ref(book: &Book, volume: usize, chapter: usize) -> Result<&Chapter, StoreError> {
    volume_ref(book, volume)?
        .chapters
        .get(chapter)
        .ok_or(StoreError::ChapterNotFound { volume, chapter })
}

pub(crate) fn check_volume_name_free(book: &Book, name: &str) -> Result<(), StoreError> {
    validate_name(name)?;
    if book.volume_index(name).is_some() {
        return Err(StoreError::NameCollision(name.to_string()));
    }
    Ok(())
}

pub(crate) fn check_chapter_name_free(book: &Book, volume: usize, name: &str) -> Result<(), StoreError> {
    validate_name(name)?;
    if volume_ref(book, volume)?.has_chapter(name) {
        return Err(StoreError::NameCollision(name.to_string()));
    }
    Ok(())
}

/// Directory-backed document store
pub struct FileStore {
    root: PathBuf,
    book: Book,
}

impl FileStore {
    /// Open or create a project at the given directory
    ///
    /// A new project takes its title from the directory name.
    pub fn open(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let root = path.as_ref().to_path_buf();
        debug!(?root, "FileStore::open: called");
        fs::create_dir_all(&root)?;

        let meta_path = root.join(META_FILE);
        let book = if meta_path.exists() {
            debug!("FileStore::open: loading existing metadata");
            let content = fs::read_to_string(&meta_path)?;
            serde_json::from_str(&content)?
        } else {
            let title = root
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            info!(%title, "FileStore::open: creating new project");
            Book::new(title)
        };

        let mut store = Self { root, book };
        if !meta_path.exists() {
            store.save_meta()?;
        }
        Ok(store)
    }

    /// Project directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn volume_dir(&self, volume: &str) -> PathBuf {
        self.root.join(volume)
    }

    fn chapter_path(&self, volume: &str, chapter: &str) -> PathBuf {
        self.volume_dir(volume).join(format!("{}.{}", chapter, CONTENT_EXTENSION))
    }

    /// Persist metadata through a temp file so a failed write never truncates it
    fn write_meta(&self, book: &Book) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(book)?;
        let tmp = self.root.join(format!("{}.tmp", META_FILE));
        fs::write(&tmp, json)?;
        fs::rename(&tmp, self.root.join(META_FILE))?;
        Ok(())
    }

    fn save_meta(&mut self) -> Result<(), StoreError> {
        debug!("FileStore::save_meta: called");
        self.write_meta(&self.book)
    }

    /// Apply an edit to a copy of the book, persist it, then swap it in
    fn commit(&mut self, edit: impl FnOnce(&mut Book)) -> Result<(), StoreError> {
        let mut next = self.book.clone();
        edit(&mut next);
        self.write_meta(&next)?;
        self.book = next;
        Ok(())
    }
}

impl DocumentStore for FileStore {
    fn book(&self) -> &Book {
        &self.book
    }

    fn read_chapter_content(&self, volume: &str, chapter: &str) -> Result<String, StoreError> {
        let path = self.chapter_path(volume, chapter);
        debug!(?path, "FileStore::read_chapter_content: called");
        if !path.exists() {
            return Ok(String::new());
        }
        Ok(fs::read_to_string(path)?)
    }

    fn save_chapter_content(&mut self, volume: &str, chapter: &str, text: &str) -> Result<(), StoreError> {
        debug!(%volume, %chapter, len = text.len(), "FileStore::save_chapter_content: called");
        validate_name(volume)?;
        validate_name(chapter)?;
        fs::create_dir_all(self.volume_dir(volume))?;
        fs::write(self.chapter_path(volume, chapter), text)?;
        Ok(())
    }

    fn add_volume(&mut self, name: &str, synopsis: &str) -> Result<usize, StoreError> {
        debug!(%name, "FileStore::add_volume: called");
        check_volume_name_free(&self.book, name)?;
        fs::create_dir_all(self.volume_dir(name))?;
        self.commit(|book| book.volumes.push(Volume::new(name, synopsis)))?;
        Ok(self.book.volumes.len() - 1)
    }

    fn add_chapter(
        &mut self,
        volume: usize,
        name: &str,
        synopsis: &str,
        ai_synopsis: &str,
    ) -> Result<usize, StoreError> {
        debug!(%volume, %name, "FileStore::add_chapter: called");
        check_chapter_name_free(&self.book, volume, name)?;
        let volume_name = volume_ref(&self.book, volume)?.name.clone();

        // A new chapter starts empty even if a stray file with its name exists
        fs::create_dir_all(self.volume_dir(&volume_name))?;
        fs::write(self.chapter_path(&volume_name, name), "")?;

        self.commit(|book| {
            book.volumes[volume]
                .chapters
                .push(Chapter::new(name, synopsis, ai_synopsis))
        })?;
        Ok(self.book.volumes[volume].chapters.len() - 1)
    }

    fn rename_volume(&mut self, volume: usize, new_name: &str) -> Result<(), StoreError> {
        debug!(%volume, %new_name, "FileStore::rename_volume: called");
        let old_name = volume_ref(&self.book, volume)?.name.clone();
        if old_name == new_name {
            return Ok(());
        }
        check_volume_name_free(&self.book, new_name)?;

        let old_dir = self.volume_dir(&old_name);
        let new_dir = self.volume_dir(new_name);
        let moved = old_dir.exists();
        if moved {
            fs::rename(&old_dir, &new_dir)?;
        }

        if let Err(e) = self.commit(|book| book.volumes[volume].name = new_name.to_string()) {
            if moved && let Err(revert) = fs::rename(&new_dir, &old_dir) {
                warn!(error = %revert, "FileStore::rename_volume: failed to revert directory move");
            }
            return Err(e);
        }
        info!(%old_name, %new_name, "Renamed volume");
        Ok(())
    }

    fn rename_chapter(&mut self, volume: usize, chapter: usize, new_name: &str) -> Result<(), StoreError> {
        debug!(%volume, %chapter, %new_name, "FileStore::rename_chapter: called");
        let old_name = chapter_ref(&self.book, volume, chapter)?.name.clone();
        if old_name == new_name {
            return Ok(());
        }
        check_chapter_name_free(&self.book, volume, new_name)?;

        let volume_name = self.book.volumes[volume].name.clone();
        let old_path = self.chapter_path(&volume_name, &old_name);
        let new_path = self.chapter_path(&volume_name, new_name);
        let moved = old_path.exists();
        if moved {
            fs::rename(&old_path, &new_path)?;
        }

        if let Err(e) = self.commit(|book| book.volumes[volume].chapters[chapter].name = new_name.to_string()) {
            if moved && let Err(revert) = fs::rename(&new_path, &old_path) {
                warn!(error = %revert, "FileStore::rename_chapter: failed to revert file move");
            }
            return Err(e);
        }
        info!(volume = %volume_name, %old_name, %new_name, "Renamed chapter");
        Ok(())
    }

    fn delete_volume(&mut self, volume: usize) -> Result<Volume, StoreError> {
        debug!(%volume, "FileStore::delete_volume: called");
        let removed = volume_ref(&self.book, volume)?.clone();
        self.commit(|book| {
            book.volumes.remove(volume);
        })?;

        let dir = self.volume_dir(&removed.name);
        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        info!(name = %removed.name, "Deleted volume");
        Ok(removed)
    }

    fn delete_chapter(&mut self, volume: usize, chapter: usize) -> Result<Chapter, StoreError> {
        debug!(%volume, %chapter, "FileStore::delete_chapter: called");
        let removed = chapter_ref(&self.book, volume, chapter)?.clone();
        let volume_name = self.book.volumes[volume].name.clone();
        self.commit(|book| {
            book.volumes[volume].chapters.remove(chapter);
        })?;

        let path = self.chapter_path(&volume_name, &removed.name);
        if path.exists() {
            fs::remove_file(path)?;
        }
        info!(volume = %volume_name, name = %removed.name, "Deleted chapter");
        Ok(removed)
    }

    fn update_meta(&mut self, edit: &mut dyn FnMut(&mut Book)) -> Result<(), StoreError> {
        debug!("FileStore::update_meta: called");
        self.commit(|book| edit(book))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, FileStore) {
        let temp = TempDir::new().unwrap();
        let store = FileStore::open(temp.path().join("novel")).unwrap();
        (temp, store)
    }

    #[test]
    fn test_open_creates_project() {
        let (temp, store) = open_store();
        assert!(temp.path().join("novel").join(META_FILE).exists());
        assert_eq!(store.book().title, "novel");
        assert!(store.book().volumes.is_empty());
    }

    #[test]
    fn test_metadata_survives_reopen() {
        let (temp, mut store) = open_store();
        let v = store.add_volume("V1", "opening").unwrap();
        store.add_chapter(v, "C1", "hero enters forest", "").unwrap();
        drop(store);

        let reopened = FileStore::open(temp.path().join("novel")).unwrap();
        assert_eq!(reopened.book().volumes[0].name, "V1");
        assert_eq!(reopened.book().volumes[0].chapters[0].synopsis, "hero enters forest");
    }

    #[test]
    fn test_content_round_trip() {
        let (_temp, mut store) = open_store();
        let v = store.add_volume("V1", "").unwrap();
        store.add_chapter(v, "C1", "", "").unwrap();

        assert_eq!(store.read_chapter_content("V1", "C1").unwrap(), "");
        store.save_chapter_content("V1", "C1", "The forest was dark.").unwrap();
        assert_eq!(store.read_chapter_content("V1", "C1").unwrap(), "The forest was dark.");
    }

    #[test]
    fn test_add_chapter_discards_stray_file() {
        let (temp, mut store) = open_store();
        let v = store.add_volume("V1", "").unwrap();
        fs::write(temp.path().join("novel").join("V1").join("C1.txt"), "leftover prose").unwrap();

        store.add_chapter(v, "C1", "", "").unwrap();
        assert_eq!(store.read_chapter_content("V1", "C1").unwrap(), "");
    }

    #[test]
    fn test_missing_chapter_reads_empty() {
        let (_temp, store) = open_store();
        assert_eq!(store.read_chapter_content("Nope", "Nope").unwrap(), "");
    }

    #[test]
    fn test_duplicate_volume_rejected() {
        let (_temp, mut store) = open_store();
        store.add_volume("V1", "").unwrap();
        let err = store.add_volume("V1", "again").unwrap_err();
        assert!(err.is_name_collision());
        assert_eq!(store.book().volumes.len(), 1);
    }

    #[test]
    fn test_duplicate_chapter_rejected() {
        let (_temp, mut store) = open_store();
        let v = store.add_volume("V1", "").unwrap();
        store.add_chapter(v, "C1", "", "").unwrap();
        assert!(store.add_chapter(v, "C1", "", "").unwrap_err().is_name_collision());
        assert_eq!(store.book().volumes[0].chapters.len(), 1);
    }

    #[test]
    fn test_invalid_names_rejected() {
        let (_temp, mut store) = open_store();
        assert!(matches!(store.add_volume("", ""), Err(StoreError::InvalidName(_))));
        assert!(matches!(store.add_volume("a/b", ""), Err(StoreError::InvalidName(_))));
        assert!(matches!(store.add_volume("..", ""), Err(StoreError::InvalidName(_))));
        assert!(matches!(store.add_volume(" padded", ""), Err(StoreError::InvalidName(_))));
    }

    #[test]
    fn test_rename_volume_moves_content() {
        let (_temp, mut store) = open_store();
        let v = store.add_volume("V1", "").unwrap();
        store.add_chapter(v, "C1", "", "").unwrap();
        store.save_chapter_content("V1", "C1", "prose").unwrap();

        store.rename_volume(v, "Book One").unwrap();
        assert_eq!(store.book().volumes[0].name, "Book One");
        assert_eq!(store.read_chapter_content("Book One", "C1").unwrap(), "prose");
        assert_eq!(store.read_chapter_content("V1", "C1").unwrap(), "");
    }

    #[test]
    fn test_rename_chapter_moves_content() {
        let (_temp, mut store) = open_store();
        let v = store.add_volume("V1", "").unwrap();
        let c = store.add_chapter(v, "C1", "", "").unwrap();
        store.save_chapter_content("V1", "C1", "prose").unwrap();

        store.rename_chapter(v, c, "Arrival").unwrap();
        assert_eq!(store.read_chapter_content("V1", "Arrival").unwrap(), "prose");
        assert_eq!(store.book().volumes[0].chapters[0].name, "Arrival");
    }

    #[test]
    fn test_rename_to_existing_name_rejected() {
        let (_temp, mut store) = open_store();
        let v = store.add_volume("V1", "").unwrap();
        store.add_chapter(v, "C1", "", "").unwrap();
        store.add_chapter(v, "C2", "", "").unwrap();
        assert!(store.rename_chapter(v, 1, "C1").unwrap_err().is_name_collision());
        assert_eq!(store.book().volumes[0].chapters[1].name, "C2");
    }

    #[test]
    fn test_delete_chapter_removes_content() {
        let (temp, mut store) = open_store();
        let v = store.add_volume("V1", "").unwrap();
        store.add_chapter(v, "C1", "", "").unwrap();
        store.save_chapter_content("V1", "C1", "prose").unwrap();

        let removed = store.delete_chapter(v, 0).unwrap();
        assert_eq!(removed.name, "C1");
        assert!(store.book().volumes[0].chapters.is_empty());
        assert!(!temp.path().join("novel").join("V1").join("C1.txt").exists());
    }

    #[test]
    fn test_delete_volume_removes_directory() {
        let (temp, mut store) = open_store();
        let v = store.add_volume("V1", "").unwrap();
        store.add_chapter(v, "C1", "", "").unwrap();

        store.delete_volume(v).unwrap();
        assert!(store.book().volumes.is_empty());
        assert!(!temp.path().join("novel").join("V1").exists());
    }

    #[test]
    fn test_out_of_range_index() {
        let (_temp, mut store) = open_store();
        assert!(matches!(store.delete_volume(3), Err(StoreError::VolumeNotFound(3))));
        assert!(matches!(store.add_chapter(0, "C1", "", ""), Err(StoreError::VolumeNotFound(0))));
    }

    #[test]
    fn test_update_meta_persists() {
        let (temp, mut store) = open_store();
        store
            .update_meta(&mut |book| book.global_synopsis = "A long journey".to_string())
            .unwrap();
        drop(store);

        let reopened = FileStore::open(temp.path().join("novel")).unwrap();
        assert_eq!(reopened.book().global_synopsis, "A long journey");
    }
}
