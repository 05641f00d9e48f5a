//! Domain models for the credit engine

pub mod edits;
pub mod ledger;
pub mod package;
pub mod payment;
pub mod pricing;
pub mod promotion;

pub use edits::*;
pub use ledger::*;
pub use package::*;
pub use payment::*;
pub use pricing::*;
pub use promotion::*;
