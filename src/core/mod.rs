pub mod message;
pub mod participant;
pub mod store;

pub use message::{Author, Message, MessageId, MessageKind, DEFAULT_DELAY_MS};
pub use participant::{Participant, Participants, DEFAULT_AVATAR};
pub use store::{MessageStore, MessageUpdate, SharedStore};
