//! Context assembly
//!
//! Pure functions that turn a book snapshot into the text blocks the
//! prompt templates consume. Nothing here touches the store or the network.

use bookstore::{Book, Chapter, Volume, is_blank};
use serde::Serialize;
use tracing::debug;

use crate::config::LimitsConfig;

/// Prefix for a tail-truncated previous chapter
pub const ELISION_MARKER: &str = "...(earlier text omitted)...";

/// Shown when no chapter precedes the target
pub const EMPTY_HISTORY: &str = "The book is just beginning; there is no earlier plot.";

/// Stands in for a missing summary in history lines
pub const NO_SUMMARY: &str = "no summary";
const NO_SYNOPSIS: &str = "none";
const NO_DIRECTIVE: &str = "none provided";
const NO_CHARACTERS: &str = "No characters specified.";

/// Find the chapter written immediately before (v_idx, c_idx)
///
/// Same volume first; otherwise the last chapter of the nearest earlier
/// volume that has any chapters.
pub fn previous_chapter(book: &Book, v_idx: usize, c_idx: usize) -> Option<(usize, usize)> {
    if c_idx > 0 {
        return Some((v_idx, c_idx - 1));
    }
    (0..v_idx)
        .rev()
        .find_map(|i| book.volumes.get(i).and_then(|v| v.chapters.len().checked_sub(1)).map(|last| (i, last)))
}

/// Keep the last `limit` characters, marking the cut
pub fn tail(content: &str, limit: usize) -> String {
    let count = content.chars().count();
    if count <= limit {
        return content.to_string();
    }
    let kept: String = content.chars().skip(count - limit).collect();
    format!("{}\n{}", ELISION_MARKER, kept)
}

fn or_placeholder<'a>(text: &'a str, placeholder: &'a str) -> &'a str {
    if is_blank(text) { placeholder } else { text.trim() }
}

fn volume_line(v_idx: usize, volume: &Volume) -> String {
    format!(
        "> Volume {}: {} (synopsis: {})\n",
        v_idx + 1,
        volume.name,
        or_placeholder(&volume.synopsis, NO_SYNOPSIS)
    )
}

fn chapter_line(c_idx: usize, chapter: &Chapter) -> String {
    format!(
        "  - Chapter {} [{}]: {}\n",
        c_idx + 1,
        chapter.name,
        chapter.memory_summary().map(str::trim).unwrap_or(NO_SUMMARY)
    )
}

/// Summaries of every chapter before (v_idx, c_idx), grouped by volume
///
/// Returns the text and whether it had to be degraded to volume lines only.
pub fn history(book: &Book, v_idx: usize, c_idx: usize, limits: &LimitsConfig) -> (String, bool) {
    debug!(v_idx, c_idx, "history: called");
    let mut full = String::new();
    let mut outline = String::new();
    let mut any_chapter = false;

    for (i, volume) in book.volumes.iter().enumerate().take(v_idx + 1) {
        let line = volume_line(i, volume);
        full.push_str(&line);
        outline.push_str(&line);

        let limit = if i == v_idx { c_idx.min(volume.chapters.len()) } else { volume.chapters.len() };
        for (j, chapter) in volume.chapters.iter().enumerate().take(limit) {
            any_chapter = true;
            full.push_str(&chapter_line(j, chapter));
        }
    }

    if !any_chapter {
        return (EMPTY_HISTORY.to_string(), false);
    }

    if full.chars().count() > limits.history_chars {
        debug!(limit = limits.history_chars, "history: degrading to volume outline");
        let note = format!(
            "(Chapter summaries omitted: the full history exceeds {} characters. Volume outline follows.)\n",
            limits.history_chars
        );
        return (format!("{}{}", note, outline.trim_end()), true);
    }

    (full.trim_end().to_string(), false)
}

/// One line per character
pub fn roster(book: &Book) -> String {
    if book.characters.is_empty() {
        return NO_CHARACTERS.to_string();
    }
    book.characters
        .iter()
        .map(|c| {
            format!(
                "[{}] gender: {}, personality: {}, experience: {}",
                c.name, c.gender, c.personality, c.experience
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// System-level context shared by generation and audit prompts
#[derive(Debug, Clone, Serialize)]
pub struct BookContext {
    pub global_synopsis: String,
    pub roster: String,
}

impl BookContext {
    pub fn from_book(book: &Book) -> Self {
        Self {
            global_synopsis: or_placeholder(&book.global_synopsis, NO_SYNOPSIS).to_string(),
            roster: roster(book),
        }
    }
}

/// Everything the chapter generation prompts need
#[derive(Debug, Clone, Serialize)]
pub struct GenerationContext {
    #[serde(flatten)]
    pub book: BookContext,
    pub history: String,
    pub history_degraded: bool,
    /// Tail of the previous chapter; absent when there is none or it is empty
    pub previous_tail: Option<String>,
    pub volume_name: String,
    pub volume_synopsis: String,
    pub chapter_name: String,
    pub directive: String,
}

impl GenerationContext {
    /// Build the context for the chapter at (v_idx, c_idx)
    ///
    /// `previous_content` is the stored prose of the chapter that
    /// `previous_chapter` resolves to, if any.
    pub fn assemble(
        book: &Book,
        v_idx: usize,
        c_idx: usize,
        previous_content: Option<&str>,
        limits: &LimitsConfig,
    ) -> Option<Self> {
        debug!(v_idx, c_idx, "GenerationContext::assemble: called");
        let volume = book.volumes.get(v_idx)?;
        let chapter = volume.chapters.get(c_idx)?;
        let (history, history_degraded) = history(book, v_idx, c_idx, limits);

        Some(Self {
            book: BookContext::from_book(book),
            history,
            history_degraded,
            previous_tail: previous_content
                .filter(|text| !is_blank(text))
                .map(|text| tail(text, limits.tail_chars)),
            volume_name: volume.name.clone(),
            volume_synopsis: or_placeholder(&volume.synopsis, NO_SYNOPSIS).to_string(),
            chapter_name: chapter.name.clone(),
            directive: chapter.writing_directive().unwrap_or(NO_DIRECTIVE).to_string(),
        })
    }
}

/// Every volume and chapter with its best-available summary
///
/// Rebuilt before each volume is planned so it reflects earlier commits.
pub fn book_overview(book: &Book) -> String {
    let mut out = String::new();
    for (i, volume) in book.volumes.iter().enumerate() {
        out.push_str(&volume_line(i, volume));
        for (j, chapter) in volume.chapters.iter().enumerate() {
            out.push_str(&chapter_line(j, chapter));
        }
    }
    if out.is_empty() { "No volumes yet.".to_string() } else { out.trim_end().to_string() }
}

#[derive(Serialize)]
struct VolumeInfo<'a> {
    name: &'a str,
    synopsis: &'a str,
}

#[derive(Serialize)]
struct ChapterInfo<'a> {
    name: &'a str,
    user_synopsis: &'a str,
    ai_synopsis: &'a str,
}

/// Existing volumes as a JSON array of {name, synopsis}
pub fn existing_volumes_json(book: &Book) -> String {
    let infos: Vec<_> = book
        .volumes
        .iter()
        .map(|v| VolumeInfo {
            name: &v.name,
            synopsis: &v.synopsis,
        })
        .collect();
    serde_json::to_string_pretty(&infos).unwrap_or_else(|_| "[]".to_string())
}

/// Existing chapters of one volume as a JSON array of {name, user_synopsis, ai_synopsis}
pub fn existing_chapters_json(volume: &Volume) -> String {
    let infos: Vec<_> = volume
        .chapters
        .iter()
        .map(|c| ChapterInfo {
            name: &c.name,
            user_synopsis: &c.synopsis,
            ai_synopsis: &c.ai_synopsis,
        })
        .collect();
    serde_json::to_string_pretty(&infos).unwrap_or_else(|_| "[]".to_string())
}

/// Per-chapter summaries tagged with zero-based indices for the auditor
pub fn audit_digest(book: &Book) -> String {
    let mut out = String::new();
    for (v_idx, volume) in book.volumes.iter().enumerate() {
        out.push_str(&format!("> v_idx={} Volume: {}\n", v_idx, volume.name));
        for (c_idx, chapter) in volume.chapters.iter().enumerate() {
            out.push_str(&format!(
                "  - c_idx={} [{}]: {}\n",
                c_idx,
                chapter.name,
                chapter.memory_summary().map(str::trim).unwrap_or(NO_SUMMARY)
            ));
        }
    }
    out.trim_end().to_string()
}

/// Everything the setting repair prompt needs
#[derive(Debug, Clone, Serialize)]
pub struct RepairContext {
    pub global_synopsis: String,
    /// Absent when nothing precedes the chapter
    pub history: Option<String>,
    pub volume_synopsis: String,
    /// Audit finding that triggered the repair
    pub reason: Option<String>,
    pub content: String,
    /// Absent when the chapter has no summary yet
    pub summary: Option<String>,
}

impl RepairContext {
    pub fn assemble(
        book: &Book,
        v_idx: usize,
        c_idx: usize,
        content: &str,
        reason: Option<&str>,
        limits: &LimitsConfig,
    ) -> Option<Self> {
        debug!(v_idx, c_idx, has_reason = reason.is_some(), "RepairContext::assemble: called");
        let volume = book.volumes.get(v_idx)?;
        let chapter = volume.chapters.get(c_idx)?;
        let (history, _) = history(book, v_idx, c_idx, limits);

        Some(Self {
            global_synopsis: or_placeholder(&book.global_synopsis, NO_SYNOPSIS).to_string(),
            history: (history != EMPTY_HISTORY).then_some(history),
            volume_synopsis: or_placeholder(&volume.synopsis, NO_SYNOPSIS).to_string(),
            reason: reason.filter(|r| !is_blank(r)).map(str::to_string),
            content: content.to_string(),
            summary: chapter.memory_summary().map(|s| s.trim().to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookstore::Character;

    fn book_with(volumes: &[(&str, &[&str])]) -> Book {
        let mut book = Book::new("T");
        for (name, chapters) in volumes {
            let mut v = Volume::new(*name, format!("{} synopsis", name));
            for c in *chapters {
                v.chapters.push(Chapter::new(*c, "", format!("{} summary", c)));
            }
            book.volumes.push(v);
        }
        book
    }

    #[test]
    fn test_previous_chapter_same_volume() {
        let book = book_with(&[("V1", &["C1", "C2"])]);
        assert_eq!(previous_chapter(&book, 0, 1), Some((0, 0)));
        assert_eq!(previous_chapter(&book, 0, 0), None);
    }

    #[test]
    fn test_previous_chapter_skips_empty_volumes() {
        let book = book_with(&[("V1", &["C1", "C2"]), ("V2", &[]), ("V3", &["C1"])]);
        assert_eq!(previous_chapter(&book, 2, 0), Some((0, 1)));
    }

    #[test]
    fn test_tail_keeps_short_text() {
        assert_eq!(tail("short", 10), "short");
    }

    #[test]
    fn test_tail_truncates_by_chars() {
        let text = "林".repeat(2000);
        let out = tail(&text, 1500);
        assert!(out.starts_with(ELISION_MARKER));
        let kept = out.trim_start_matches(ELISION_MARKER).trim_start_matches('\n');
        assert_eq!(kept.chars().count(), 1500);
    }

    #[test]
    fn test_history_covers_only_earlier_chapters() {
        let book = book_with(&[("V1", &["C1", "C2"]), ("V2", &["C1", "C2", "C3"])]);
        let (text, degraded) = history(&book, 1, 1, &LimitsConfig::default());
        assert!(!degraded);
        assert!(text.contains("Volume 1: V1"));
        assert!(text.contains("C2 summary"));
        assert!(text.contains("Volume 2: V2"));
        // V2's C1 precedes the target, C2 and C3 do not
        assert_eq!(text.matches("[C1]").count(), 2);
        assert_eq!(text.matches("[C2]").count(), 1);
        assert!(!text.contains("[C3]"));
    }

    #[test]
    fn test_history_empty_at_start() {
        let book = book_with(&[("V1", &["C1"])]);
        let (text, degraded) = history(&book, 0, 0, &LimitsConfig::default());
        assert_eq!(text, EMPTY_HISTORY);
        assert!(!degraded);
    }

    #[test]
    fn test_history_degrades_when_too_long() {
        let mut book = book_with(&[("V1", &["C1", "C2", "C3"]), ("V2", &["C1"])]);
        for chapter in &mut book.volumes[0].chapters {
            chapter.ai_synopsis = "x".repeat(100);
        }
        let limits = LimitsConfig {
            history_chars: 200,
            ..Default::default()
        };
        let (text, degraded) = history(&book, 1, 0, &limits);
        assert!(degraded);
        assert!(text.contains("Volume 1: V1"));
        assert!(!text.contains("[C1]"));
    }

    #[test]
    fn test_history_uses_user_outline_when_no_ai_summary() {
        let mut book = book_with(&[("V1", &["C1", "C2"])]);
        book.volumes[0].chapters[0] = Chapter::new("C1", "user outline", "");
        let (text, _) = history(&book, 0, 1, &LimitsConfig::default());
        assert!(text.contains("[C1]: user outline"));
    }

    #[test]
    fn test_roster_formats_characters() {
        let mut book = Book::new("T");
        assert_eq!(roster(&book), NO_CHARACTERS);
        book.characters.push(Character {
            name: "Lin".to_string(),
            gender: "female".to_string(),
            personality: "stubborn".to_string(),
            experience: "orphan".to_string(),
        });
        assert_eq!(roster(&book), "[Lin] gender: female, personality: stubborn, experience: orphan");
    }

    #[test]
    fn test_assemble_generation_context() {
        let mut book = book_with(&[("V1", &["C1", "C2"])]);
        book.volumes[0].chapters[1] = Chapter::new("C2", "  the wolf attacks  ", "machine plan");
        let ctx = GenerationContext::assemble(&book, 0, 1, Some("He walked on."), &LimitsConfig::default()).unwrap();
        assert_eq!(ctx.directive, "the wolf attacks");
        assert_eq!(ctx.previous_tail.as_deref(), Some("He walked on."));
        assert_eq!(ctx.volume_name, "V1");
        assert!(ctx.history.contains("C1 summary"));
    }

    #[test]
    fn test_assemble_without_directive_or_previous() {
        let mut book = Book::new("T");
        let mut v = Volume::new("V1", "");
        v.chapters.push(Chapter::new("C1", "", ""));
        book.volumes.push(v);
        let ctx = GenerationContext::assemble(&book, 0, 0, None, &LimitsConfig::default()).unwrap();
        assert_eq!(ctx.directive, NO_DIRECTIVE);
        assert!(ctx.previous_tail.is_none());
        assert_eq!(ctx.history, EMPTY_HISTORY);
        assert!(GenerationContext::assemble(&book, 0, 5, None, &LimitsConfig::default()).is_none());
    }

    #[test]
    fn test_existing_chapters_json_shape() {
        let mut v = Volume::new("V1", "");
        v.chapters.push(Chapter::new("C1", "user", "ai"));
        let value: serde_json::Value = serde_json::from_str(&existing_chapters_json(&v)).unwrap();
        assert_eq!(value[0]["name"], "C1");
        assert_eq!(value[0]["user_synopsis"], "user");
        assert_eq!(value[0]["ai_synopsis"], "ai");
    }

    #[test]
    fn test_audit_digest_tags_indices() {
        let book = book_with(&[("V1", &["C1"]), ("V2", &["C1", "C2"])]);
        let digest = audit_digest(&book);
        assert!(digest.contains("v_idx=1 Volume: V2"));
        assert!(digest.contains("c_idx=1 [C2]: C2 summary"));
    }

    #[test]
    fn test_repair_context_first_chapter_has_no_history() {
        let book = book_with(&[("V1", &["C1"])]);
        let ctx = RepairContext::assemble(&book, 0, 0, "text", Some("dead man walks"), &LimitsConfig::default())
            .unwrap();
        assert!(ctx.history.is_none());
        assert_eq!(ctx.reason.as_deref(), Some("dead man walks"));
        assert_eq!(ctx.summary.as_deref(), Some("C1 summary"));
    }

    #[test]
    fn test_repair_context_omits_missing_summary() {
        let mut book = book_with(&[("V1", &["C1"])]);
        book.volumes[0].chapters[0].ai_synopsis = String::new();
        book.volumes[0].chapters[0].synopsis = "  ".to_string();
        let ctx = RepairContext::assemble(&book, 0, 0, "text", None, &LimitsConfig::default()).unwrap();
        assert!(ctx.summary.is_none());
    }
}
