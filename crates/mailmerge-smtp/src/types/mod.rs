//! Core SMTP types.

mod address;
mod extension;
mod reply;

pub use address::{Address, Envelope, validate_line};
pub use extension::{AuthMechanism, Extension};
pub use reply::{Reply, ReplyCode};
