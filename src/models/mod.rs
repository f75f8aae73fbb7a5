pub mod group;
pub mod message;
pub mod user;

pub use group::Group;
pub use message::{
    ContactInfo, DeliveryStatus, GiftInfo, GiftKind, LocationInfo, MediaInfo, Message,
    MessageType, MessageView, Reaction,
};
pub use user::{PresenceStatus, User};
