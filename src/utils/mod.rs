//!
//! Formatting helpers shared by the wallet and the demo binary.
pub mod index;

pub use index::{format_amount, format_signed_amount};
