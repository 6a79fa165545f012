//! Shared contracts for the ID-photo editor: media codecs, edit operations and
//! prompts, the Gemini wire format, the event log and chat command parsing.

pub mod chat;
pub mod edits;
pub mod events;
pub mod gemini;
pub mod media;
