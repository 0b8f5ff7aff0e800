//! Modal dialogs for the application.

pub mod message_box;

pub use message_box::MessageBox;
