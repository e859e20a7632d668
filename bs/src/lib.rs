//! BookStore - file-backed storage for hierarchical book projects
//!
//! A project is a directory holding the book metadata and one plain-text
//! file per chapter, addressed by the (volume name, chapter name) pair.
//!
//! # Layout
//!
//! ```text
//! my-novel/
//! ├── meta.json            # title, synopsis, characters, volumes, chapters
//! ├── Volume One/
//! │   ├── Chapter 1.txt
//! │   └── Chapter 2.txt
//! └── Volume Two/
//!     └── ...
//! ```
//!
//! # Example
//!
//! ```ignore
//! use bookstore::{DocumentStore, FileStore};
//!
//! let mut store = FileStore::open("my-novel")?;
//! let v = store.add_volume("Volume One", "The hero leaves home")?;
//! store.add_chapter(v, "Chapter 1", "hero enters forest", "")?;
//! store.save_chapter_content("Volume One", "Chapter 1", "It was dark.")?;
//! ```

mod error;
mod memory;
mod model;
mod store;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use model::{Book, Chapter, ChapterRef, Character, Volume, is_blank};
pub use store::{CONTENT_EXTENSION, DocumentStore, FileStore, META_FILE};
