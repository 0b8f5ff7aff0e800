//! Background services for the chat window.

pub mod updater;

pub use updater::{UpdateChecker, UpdateError};
