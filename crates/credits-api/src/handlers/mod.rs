//! Request handlers for API endpoints

pub mod admin;
pub mod credits;
pub mod edits;
pub mod health;
pub mod helpers;
pub mod payments;
pub mod webhook;

pub use admin::*;
pub use credits::*;
pub use edits::*;
pub use health::*;
pub use payments::*;
pub use webhook::*;
