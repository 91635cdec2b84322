pub mod attach;
pub mod money;
pub mod random;

pub use attach::{AttachLayout, Attachment};
