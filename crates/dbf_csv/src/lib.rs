//! dBase / Visual FoxPro table conversion to and from CSV

pub mod errors;
pub mod models;

pub use errors::*;
pub use models::*;
