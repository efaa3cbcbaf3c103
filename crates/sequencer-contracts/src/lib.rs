pub mod errors;
pub mod events;
pub mod images;
pub mod instructions;
pub mod models;
pub mod queue;
pub mod suggestions;

pub use errors::EditError;
pub use images::ImagePayload;
