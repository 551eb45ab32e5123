pub mod actions;
pub mod chat;
pub mod events;
pub mod prompts;
pub mod results;
