pub mod checkpoint;
pub mod traits;

pub use checkpoint::FileCursorStore;
pub use traits::{CursorError, CursorStore};
