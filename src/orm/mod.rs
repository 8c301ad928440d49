//! SeaORM entities.

pub mod auth_tokens;
pub mod conversation_participants;
pub mod conversations;
pub mod messages;
pub mod properties;
pub mod property_images;
pub mod users;
