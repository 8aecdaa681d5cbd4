pub mod journal;
pub mod journalctl;
pub mod reader;

pub use journal::{JournalApi, JournalEntry, SourceError};
pub use journalctl::{JournalctlReader, Seek, StartPosition};
pub use reader::SourceReader;
