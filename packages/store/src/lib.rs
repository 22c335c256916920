pub mod models;
pub mod note_store;
pub mod password;

mod error;
mod file_store;
mod memory;
pub use file_store::FileStore;
pub use memory::MemoryStore;

pub use error::StoreError;
pub use models::{NewNote, Note, NoteId, NotePatch, User, UserId, UserNoteEntry};
pub use note_store::{NoteStore, PushHandler, Subscription};
