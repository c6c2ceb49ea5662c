//! Query construction: typed predicates, filter/search descriptions and
//! statement assembly.
//!
//! # Responsibility
//! - Map declared field kinds to comparison strategies.
//! - Describe sorting, pagination and projection independently of storage.
//!
//! # Invariants
//! - Every identifier rendered into SQL comes from validated entity metadata
//!   or from an explicit `Predicate::Raw` fragment.

pub mod options;
pub mod predicate;
pub(crate) mod select;

pub use options::{FilterQuery, ListOptions, SearchQuery, SortDirection, SortSpec};
pub use predicate::{resolve, Comparison, Predicate};
