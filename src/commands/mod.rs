//! Tauri command surface. Each submodule parses the loose JSON payloads
//! the frontend sends, then delegates to the typed core modules.

pub mod auth;
pub mod reports;
pub mod sales;
