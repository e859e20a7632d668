//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::correction::CorrectionMode;

/// NovelPilot - autonomous multi-stage novel generation
#[derive(Parser)]
#[command(
    name = "np",
    about = "Plan, write and correct serialized fiction with an LLM",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Project directory holding meta.json and chapter files
    #[arg(short, long, global = true, default_value = ".")]
    pub project: PathBuf,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a project (or open an existing one) and set its title
    Init {
        /// Book title; defaults to the directory name
        #[arg(short, long)]
        title: Option<String>,

        /// Global story outline
        #[arg(short, long)]
        synopsis: Option<String>,
    },

    /// Show the book outline
    Show {
        /// Print the raw metadata as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print a chapter's prose
    Read {
        volume: String,
        chapter: String,
    },

    /// Replace a chapter's prose with the contents of a file
    Write {
        volume: String,
        chapter: String,

        /// File to read the prose from
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Generate one chapter
    Generate {
        #[arg(short, long)]
        volume: String,

        #[arg(short = 'C', long)]
        chapter: String,

        /// Regenerate even if the chapter already has prose
        #[arg(short, long)]
        force: bool,
    },

    /// Plan volumes and chapters, then write every pending chapter
    Autopilot,

    /// Report continuity conflicts without changing anything
    Audit,

    /// Repair continuity errors and typos
    Correct {
        /// Passes to run
        #[arg(short, long, value_enum, default_value = "all")]
        mode: CorrectionMode,

        /// Restrict to one chapter (requires --chapter)
        #[arg(short, long, requires = "chapter")]
        volume: Option<String>,

        #[arg(short = 'C', long, requires = "volume")]
        chapter: Option<String>,
    },

    /// Set the global story outline
    Synopsis { text: String },

    /// Manage volumes
    Volume {
        #[command(subcommand)]
        command: VolumeCommand,
    },

    /// Manage chapters
    Chapter {
        #[command(subcommand)]
        command: ChapterCommand,
    },

    /// Manage the character roster
    Character {
        #[command(subcommand)]
        command: CharacterCommand,
    },

    /// Show the persisted events of a task
    Events {
        /// Task ID printed when the task started
        task_id: String,
    },
}

/// Volume subcommands
#[derive(Debug, Subcommand)]
pub enum VolumeCommand {
    /// Append a volume
    Add {
        name: String,

        #[arg(short, long, default_value = "")]
        synopsis: String,
    },
    /// Rename a volume
    Rename { name: String, new_name: String },
    /// Delete a volume and all its chapters
    Delete { name: String },
    /// Set a volume's synopsis
    Synopsis { name: String, text: String },
}

/// Chapter subcommands
#[derive(Debug, Subcommand)]
pub enum ChapterCommand {
    /// Append a chapter to a volume
    Add {
        volume: String,
        name: String,

        /// User outline
        #[arg(short, long, default_value = "")]
        synopsis: String,
    },
    /// Rename a chapter
    Rename {
        volume: String,
        name: String,
        new_name: String,
    },
    /// Delete a chapter and its prose
    Delete { volume: String, name: String },
    /// Set a chapter's user outline
    Synopsis {
        volume: String,
        name: String,
        text: String,
    },
}

/// Character subcommands
#[derive(Debug, Subcommand)]
pub enum CharacterCommand {
    /// Add a character
    Add {
        name: String,

        #[arg(short, long, default_value = "")]
        gender: String,

        #[arg(long, default_value = "")]
        personality: String,

        #[arg(short, long, default_value = "")]
        experience: String,
    },
    /// Remove a character
    Remove { name: String },
}
