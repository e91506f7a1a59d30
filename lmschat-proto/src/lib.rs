//! `LmsChat` data model.
//!
//! Plain data types shared by the messaging core: users and roles,
//! conversations, messages with their attachments, and in-flight uploads.

pub mod conversation;
pub mod message;
pub mod upload;
pub mod user;
