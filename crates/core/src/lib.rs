pub mod lifecycle;
pub mod messages;
pub mod types;
