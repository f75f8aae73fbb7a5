pub mod encryption;
pub mod message_service;
pub mod presence_service;
pub mod push;
