//! Shared types, URL checks, and error taxonomy for Songdrop.
pub mod errors;
pub mod models;
pub mod url_guard;
