//! Background-check key configuration and collection tracking.
//!
//! `keys` holds the requirements model and the two key grammars, `collection` holds the
//! customer/individual records, the status lifecycle, and the scheduled-action sweep.

pub mod collection;
pub mod config;
pub mod error;
pub mod keys;
pub mod telemetry;
