//! Request and response DTOs

pub mod admin;
pub mod common;
pub mod credits;
pub mod edits;
pub mod payments;

pub use admin::*;
pub use common::*;
pub use credits::*;
pub use edits::*;
pub use payments::*;
