//! Entity metadata, dynamic values and the record contract.
//!
//! # Responsibility
//! - Describe record types as typed field lists (`EntitySchema`).
//! - Carry values between callers, predicates and storage (`Value`, `Row`).
//!
//! # Invariants
//! - Metadata is produced once per entity type and never mutated.
//! - Every entity is identified by a required text `id`.

pub mod entity;
pub mod field;
pub mod value;
