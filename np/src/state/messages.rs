//! State manager messages
//!
//! Commands and responses for the actor pattern.

use bookstore::{Book, ChapterRef, Character, StoreError};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::merge::MergeOutcome;

/// Errors from state operations
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Name already exists: {0}")]
    NameCollision(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("{0} is in use by a running task")]
    Busy(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Channel error")]
    ChannelError,
}

impl From<StoreError> for StateError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::VolumeNotFound(_) | StoreError::ChapterNotFound { .. } => StateError::NotFound(e.to_string()),
            StoreError::NameCollision(name) => StateError::NameCollision(name),
            StoreError::InvalidName(name) => StateError::InvalidName(name),
            other => StateError::StoreError(other.to_string()),
        }
    }
}

/// Response from state operations
pub type StateResponse<T> = Result<T, StateError>;

/// What a running task holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskScope {
    /// Every volume and chapter
    Book,
    /// One chapter and its volume
    Chapter(ChapterRef),
}

impl TaskScope {
    /// Whether this claim covers the named volume
    pub fn covers_volume(&self, volume: &str) -> bool {
        match self {
            TaskScope::Book => true,
            TaskScope::Chapter(target) => target.volume == volume,
        }
    }

    /// Whether this claim covers the chapter
    pub fn covers_chapter(&self, target: &ChapterRef) -> bool {
        match self {
            TaskScope::Book => true,
            TaskScope::Chapter(claimed) => claimed == target,
        }
    }
}

/// Field edits that touch metadata only
#[derive(Debug, Clone)]
pub enum MetaEdit {
    SetTitle(String),
    SetGlobalSynopsis(String),
    AddCharacter(Character),
    RemoveCharacter(String),
    SetVolumeSynopsis { volume: String, synopsis: String },
    SetChapterSynopsis { target: ChapterRef, synopsis: String },
}

/// What a chapter commit changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReport {
    /// Prose was written
    pub content_saved: bool,
    /// Result of merging the summary into the AI synopsis
    pub summary: MergeOutcome,
}

/// Commands sent to the StateManager actor
#[derive(Debug)]
pub enum StateCommand {
    // Reads
    Snapshot {
        reply: oneshot::Sender<Book>,
    },
    ReadContent {
        target: ChapterRef,
        reply: oneshot::Sender<StateResponse<String>>,
    },

    // User edits
    SaveContent {
        target: ChapterRef,
        text: String,
        reply: oneshot::Sender<StateResponse<()>>,
    },
    AddVolume {
        name: String,
        synopsis: String,
        reply: oneshot::Sender<StateResponse<usize>>,
    },
    AddChapter {
        volume: String,
        name: String,
        synopsis: String,
        ai_synopsis: String,
        reply: oneshot::Sender<StateResponse<usize>>,
    },
    RenameVolume {
        volume: String,
        new_name: String,
        reply: oneshot::Sender<StateResponse<()>>,
    },
    RenameChapter {
        target: ChapterRef,
        new_name: String,
        reply: oneshot::Sender<StateResponse<()>>,
    },
    DeleteVolume {
        volume: String,
        reply: oneshot::Sender<StateResponse<()>>,
    },
    DeleteChapter {
        target: ChapterRef,
        reply: oneshot::Sender<StateResponse<()>>,
    },
    EditMeta {
        edit: MetaEdit,
        reply: oneshot::Sender<StateResponse<()>>,
    },

    // Pipeline commits
    MergeVolumeSynopsis {
        volume: String,
        proposed: String,
        reply: oneshot::Sender<StateResponse<MergeOutcome>>,
    },
    MergeChapterSummary {
        target: ChapterRef,
        proposed: String,
        reply: oneshot::Sender<StateResponse<MergeOutcome>>,
    },
    CommitChapter {
        target: ChapterRef,
        content: String,
        summary: String,
        reply: oneshot::Sender<StateResponse<CommitReport>>,
    },

    // Task claims
    Claim {
        task_id: String,
        scope: TaskScope,
        reply: oneshot::Sender<StateResponse<()>>,
    },
    Release {
        task_id: String,
    },

    // Shutdown
    Shutdown,
}
