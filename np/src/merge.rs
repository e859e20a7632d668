//! Protective merge rules for AI-proposed text
//!
//! An AI proposal may replace an existing field only when it is non-blank
//! and strictly longer than the current value. Summaries committed with
//! freshly written prose are the exception: they replace unconditionally.
//! Structural additions are guarded by sibling-name checks in the state actor.

use bookstore::Book;
use tracing::debug;

/// Length in characters of the trimmed text
fn char_len(text: &str) -> usize {
    text.trim().chars().count()
}

/// Decide whether a proposed value may replace the current one
pub fn should_replace(current: &str, proposed: &str) -> bool {
    let proposed_len = char_len(proposed);
    let accept = proposed_len > 0 && proposed_len > char_len(current);
    debug!(current_len = char_len(current), proposed_len, accept, "should_replace: called");
    accept
}

/// Apply a proposal to a field in place, returning whether it changed
pub fn merge_field(field: &mut String, proposed: &str) -> bool {
    if should_replace(field, proposed) {
        *field = proposed.trim().to_string();
        true
    } else {
        false
    }
}

/// Result of merging a proposed field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The field was replaced
    Applied,
    /// The proposal was not longer than the current value
    Kept,
    /// No sibling with that name exists
    Unknown,
}

/// Merge a proposed volume synopsis by volume name
pub fn merge_volume_synopsis(book: &mut Book, volume: &str, proposed: &str) -> MergeOutcome {
    match book.volumes.iter_mut().find(|v| v.name == volume) {
        Some(v) => {
            if merge_field(&mut v.synopsis, proposed) {
                MergeOutcome::Applied
            } else {
                MergeOutcome::Kept
            }
        }
        None => MergeOutcome::Unknown,
    }
}

/// Merge a proposed chapter AI summary by name pair
///
/// A blank user outline is filled with the same text so it becomes visible.
pub fn merge_chapter_summary(book: &mut Book, v_idx: usize, chapter: &str, proposed: &str) -> MergeOutcome {
    let Some(volume) = book.volumes.get_mut(v_idx) else {
        return MergeOutcome::Unknown;
    };
    let Some(chap) = volume.chapters.iter_mut().find(|c| c.name == chapter) else {
        return MergeOutcome::Unknown;
    };

    if !merge_field(&mut chap.ai_synopsis, proposed) {
        return MergeOutcome::Kept;
    }
    if bookstore::is_blank(&chap.synopsis) {
        chap.synopsis = chap.ai_synopsis.clone();
    }
    MergeOutcome::Applied
}

/// Store the summary written alongside new prose
///
/// The summary describes what the prose actually contains, so any non-blank
/// value replaces the current one regardless of length.
pub fn replace_chapter_summary(book: &mut Book, v_idx: usize, chapter: &str, summary: &str) -> MergeOutcome {
    let Some(chap) = book
        .volumes
        .get_mut(v_idx)
        .and_then(|v| v.chapters.iter_mut().find(|c| c.name == chapter))
    else {
        return MergeOutcome::Unknown;
    };

    let summary = summary.trim();
    if summary.is_empty() || summary == chap.ai_synopsis {
        return MergeOutcome::Kept;
    }
    chap.ai_synopsis = summary.to_string();
    MergeOutcome::Applied
}
