pub mod conversation;
pub mod country;
pub mod message;
