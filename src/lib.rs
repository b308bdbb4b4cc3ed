//! KDIGO creatinine-based acute kidney injury flagging.
//!
//! Readings are grouped per patient, sorted and deduplicated, tagged with
//! admissions, and staged against trailing rolling minima and, optionally, a
//! pre-admission baseline creatinine.

pub mod config;
pub mod error;
pub mod flagger;
pub mod records;
pub mod table;

pub use crate::config::FlaggerConfig;
pub use crate::error::{AkiError, AkiResult};
pub use crate::flagger::{FlaggedReading, Flagger, FlaggerOutput, FlaggingSummary};
pub use crate::records::{AkiFlag, Baseline, Demographics, Reading, Stage};
