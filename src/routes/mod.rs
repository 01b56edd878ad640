pub mod admin;
pub mod client;
pub mod events;
pub mod public;
pub mod staff;
