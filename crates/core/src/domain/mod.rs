pub mod booking;
pub mod conversation;
pub mod event;
pub mod message;
pub mod property;
