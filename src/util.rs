//! Shared utility modules used across Termsift components.

pub mod varint;
