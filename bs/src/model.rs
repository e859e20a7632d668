//! Book data model

use serde::{Deserialize, Serialize};

/// True when the text has no non-whitespace characters
pub fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}

/// The full hierarchical document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Book {
    pub title: String,
    pub global_synopsis: String,
    pub characters: Vec<Character>,
    pub volumes: Vec<Volume>,
}

/// Flat character record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Character {
    pub name: String,
    pub gender: String,
    pub personality: String,
    pub experience: String,
}

/// A top-level narrative unit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Volume {
    /// Unique within the book
    pub name: String,
    pub synopsis: String,
    pub chapters: Vec<Chapter>,
}

/// A leaf narrative unit; prose lives in the store, not here
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Chapter {
    /// Unique within its volume
    pub name: String,
    /// User-facing outline
    pub synopsis: String,
    /// Machine-maintained continuity summary
    pub ai_synopsis: String,
}

/// Name-based address of a chapter
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChapterRef {
    pub volume: String,
    pub chapter: String,
}

impl ChapterRef {
    pub fn new(volume: impl Into<String>, chapter: impl Into<String>) -> Self {
        Self {
            volume: volume.into(),
            chapter: chapter.into(),
        }
    }
}

impl std::fmt::Display for ChapterRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.volume, self.chapter)
    }
}

impl Book {
    /// Create an empty book with the given title
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Find a volume index by name
    pub fn volume_index(&self, name: &str) -> Option<usize> {
        self.volumes.iter().position(|v| v.name == name)
    }

    /// Resolve a chapter address to (volume index, chapter index)
    pub fn locate(&self, target: &ChapterRef) -> Option<(usize, usize)> {
        let v_idx = self.volume_index(&target.volume)?;
        let c_idx = self.volumes[v_idx].chapter_index(&target.chapter)?;
        Some((v_idx, c_idx))
    }

    /// Build the name-based address for an index pair
    pub fn chapter_ref(&self, v_idx: usize, c_idx: usize) -> Option<ChapterRef> {
        let volume = self.volumes.get(v_idx)?;
        let chapter = volume.chapters.get(c_idx)?;
        Some(ChapterRef::new(&volume.name, &chapter.name))
    }

    pub fn chapter(&self, v_idx: usize, c_idx: usize) -> Option<&Chapter> {
        self.volumes.get(v_idx)?.chapters.get(c_idx)
    }

    pub fn chapter_mut(&mut self, v_idx: usize, c_idx: usize) -> Option<&mut Chapter> {
        self.volumes.get_mut(v_idx)?.chapters.get_mut(c_idx)
    }

    /// Total chapter count across all volumes
    pub fn chapter_count(&self) -> usize {
        self.volumes.iter().map(|v| v.chapters.len()).sum()
    }

    /// Iterate chapters in book order with their indices
    pub fn chapters(&self) -> impl Iterator<Item = (usize, usize, &Volume, &Chapter)> {
        self.volumes
            .iter()
            .enumerate()
            .flat_map(|(v_idx, v)| v.chapters.iter().enumerate().map(move |(c_idx, c)| (v_idx, c_idx, v, c)))
    }
}

impl Volume {
    pub fn new(name: impl Into<String>, synopsis: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            synopsis: synopsis.into(),
            chapters: Vec::new(),
        }
    }

    pub fn chapter_index(&self, name: &str) -> Option<usize> {
        self.chapters.iter().position(|c| c.name == name)
    }

    pub fn has_chapter(&self, name: &str) -> bool {
        self.chapter_index(name).is_some()
    }
}

impl Chapter {
    pub fn new(name: impl Into<String>, synopsis: impl Into<String>, ai_synopsis: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            synopsis: synopsis.into(),
            ai_synopsis: ai_synopsis.into(),
        }
    }

    /// Summary for continuity context: AI summary first, then the user outline
    pub fn memory_summary(&self) -> Option<&str> {
        if !is_blank(&self.ai_synopsis) {
            Some(&self.ai_synopsis)
        } else if !is_blank(&self.synopsis) {
            Some(&self.synopsis)
        } else {
            None
        }
    }

    /// Directive for writing this chapter: user outline first, then the AI summary
    pub fn writing_directive(&self) -> Option<&str> {
        if !is_blank(&self.synopsis) {
            Some(self.synopsis.trim())
        } else if !is_blank(&self.ai_synopsis) {
            Some(self.ai_synopsis.trim())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_book() -> Book {
        let mut book = Book::new("Test");
        let mut v1 = Volume::new("V1", "first");
        v1.chapters.push(Chapter::new("C1", "hero enters forest", ""));
        v1.chapters.push(Chapter::new("C2", "", "the wolf attacks"));
        book.volumes.push(v1);
        book.volumes.push(Volume::new("V2", ""));
        book
    }

    #[test]
    fn test_locate_by_name() {
        let book = sample_book();
        assert_eq!(book.locate(&ChapterRef::new("V1", "C2")), Some((0, 1)));
        assert_eq!(book.locate(&ChapterRef::new("V2", "C1")), None);
        assert_eq!(book.locate(&ChapterRef::new("V9", "C1")), None);
    }

    #[test]
    fn test_memory_summary_prefers_ai() {
        let chapter = Chapter::new("C", "user outline", "ai recap");
        assert_eq!(chapter.memory_summary(), Some("ai recap"));

        let chapter = Chapter::new("C", "user outline", "   ");
        assert_eq!(chapter.memory_summary(), Some("user outline"));

        let chapter = Chapter::new("C", "", "");
        assert_eq!(chapter.memory_summary(), None);
    }

    #[test]
    fn test_writing_directive_prefers_user() {
        let chapter = Chapter::new("C", "user outline", "ai recap");
        assert_eq!(chapter.writing_directive(), Some("user outline"));

        let chapter = Chapter::new("C", "", "ai recap");
        assert_eq!(chapter.writing_directive(), Some("ai recap"));
    }

    #[test]
    fn test_chapters_iterates_in_book_order() {
        let book = sample_book();
        let names: Vec<_> = book.chapters().map(|(_, _, _, c)| c.name.as_str()).collect();
        assert_eq!(names, vec!["C1", "C2"]);
        assert_eq!(book.chapter_count(), 2);
    }

    #[test]
    fn test_missing_fields_default_on_load() {
        let json = r#"{"title":"T","volumes":[{"name":"V1","chapters":[{"name":"C1"}]}]}"#;
        let book: Book = serde_json::from_str(json).unwrap();
        assert_eq!(book.volumes[0].chapters[0].ai_synopsis, "");
        assert!(book.characters.is_empty());
    }
}
