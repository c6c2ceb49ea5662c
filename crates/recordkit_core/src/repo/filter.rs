//! Type-aware filter and free-text search.
//!
//! # Responsibility
//! - Validate caller criteria, resolve them into predicates and execute one
//!   ordered, paginated SELECT.
//!
//! # Invariants
//! - Validation and parsing finish before a session is opened.
//! - Without an explicit sort, results are ordered by `id` ascending.

use super::entity_repo::{validate_fields, validate_options, Repository};
use super::RepoResult;
use crate::model::entity::Entity;
use crate::model::value::Row;
use crate::query::options::{FilterQuery, SearchQuery};
use crate::query::predicate::{resolve, Predicate};
use crate::query::select::{Order, Select};
use std::time::Instant;

impl<E: Entity> Repository<'_, E> {
    /// Records matching every criterion of `query`.
    ///
    /// Each `(field, value)` pair is resolved by the field's declared kind:
    /// null checks, closed date ranges, set membership, substring or exact
    /// equality (see [`resolve`]). Projection names are validated but the
    /// records are always complete; use [`Repository::filter_rows`] for
    /// projected output.
    ///
    /// # Errors
    /// - `ValidationError` for unknown criterion, sort or projection fields.
    /// - `ParseError` for malformed identifier or temporal text.
    pub fn filter(&self, query: &FilterQuery) -> RepoResult<Vec<E>> {
        let started_at = Instant::now();
        let select = self.filter_select(query, false)?;
        let records = self.load(&select)?;
        self.log_op("filter", records.len(), started_at);
        Ok(records)
    }

    /// Like [`Repository::filter`], returning plain rows limited to the
    /// projection when one is given.
    pub fn filter_rows(&self, query: &FilterQuery) -> RepoResult<Vec<Row>> {
        let started_at = Instant::now();
        let select = self.filter_select(query, true)?;
        let rows = self.load_rows(&select)?;
        self.log_op("filter_rows", rows.len(), started_at);
        Ok(rows)
    }

    /// Number of records `filter` would return without pagination.
    pub fn count_matching(&self, query: &FilterQuery) -> RepoResult<u64> {
        let started_at = Instant::now();
        let select = self.filter_select(query, false)?;
        let count = self.count_select(&select)?;
        self.log_op("count_matching", 1, started_at);
        Ok(count)
    }

    /// Case-insensitive substring search over every text field.
    ///
    /// Blank text matches everything.
    pub fn search(&self, query: &SearchQuery) -> RepoResult<Vec<E>> {
        let started_at = Instant::now();
        let select = self.search_select(query, false)?;
        let records = self.load(&select)?;
        self.log_op("search", records.len(), started_at);
        Ok(records)
    }

    pub fn search_rows(&self, query: &SearchQuery) -> RepoResult<Vec<Row>> {
        let started_at = Instant::now();
        let select = self.search_select(query, true)?;
        let rows = self.load_rows(&select)?;
        self.log_op("search_rows", rows.len(), started_at);
        Ok(rows)
    }

    fn filter_select(&self, query: &FilterQuery, project: bool) -> RepoResult<Select<'static>> {
        let schema = self.schema();
        validate_fields(schema, query.criteria.iter().map(|(field, _)| field.as_str()))?;
        let order = validate_options(schema, &query.options, Order::PrimaryKey)?;

        let mut predicates = Vec::with_capacity(query.criteria.len());
        for (field, value) in &query.criteria {
            predicates.push(resolve(schema, field, value.clone(), query.exact_match)?);
        }
        let predicate = (!predicates.is_empty()).then_some(Predicate::AllOf(predicates));

        let select = Select::new(schema)
            .filter(predicate)
            .order(order)
            .page(query.options.limit, query.options.offset);
        Ok(if project {
            select.project(query.options.fields.as_deref())
        } else {
            select
        })
    }

    fn search_select(&self, query: &SearchQuery, project: bool) -> RepoResult<Select<'static>> {
        let schema = self.schema();
        let order = validate_options(schema, &query.options, Order::PrimaryKey)?;

        let predicate = query.needle().map(|needle| {
            Predicate::AnyOf(
                schema
                    .text_fields()
                    .into_iter()
                    .map(|field| Predicate::contains(field.name(), needle))
                    .collect(),
            )
        });

        let select = Select::new(schema)
            .filter(predicate)
            .order(order)
            .page(query.options.limit, query.options.offset);
        Ok(if project {
            select.project(query.options.fields.as_deref())
        } else {
            select
        })
    }
}
