//! `LmsChat`: classroom messaging core for a role-based learning
//! management system.
//!
//! Users message counterparts of a different role. Everything past the
//! local send (replies, file transfer) is simulated.

pub mod chat;
pub mod config;
pub mod directory;
pub mod files;
pub mod session;
pub mod view;
