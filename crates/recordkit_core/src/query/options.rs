//! Caller-facing query descriptions for filter, search and predicate listing.

use crate::model::value::Value;
use crate::repo::ValidationError;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub(crate) fn sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl FromStr for SortDirection {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(ValidationError::InvalidSortDirection(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

/// Sorting, pagination and projection shared by every listing call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub sort: Option<SortSpec>,
    pub limit: Option<u32>,
    pub offset: u32,
    /// Projection. Only the `*_rows` variants narrow their output to it;
    /// `filter` and `search` validate the names and still return complete
    /// records.
    pub fields: Option<Vec<String>>,
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sort_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort = Some(SortSpec {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    /// Sets the projection; record-returning calls only validate it.
    pub fn fields<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }
}

/// Structured, type-aware filter: an AND over `(field, value)` criteria.
///
/// ```ignore
/// let query = FilterQuery::new()
///     .with("status", Value::list(["active", "pending"]))
///     .with("name", "ali")
///     .exact_match(false)
///     .sort_by("age", SortDirection::Desc)
///     .limit(10);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FilterQuery {
    pub criteria: Vec<(String, Value)>,
    /// `false` turns text criteria into case-insensitive substring matches.
    pub exact_match: bool,
    pub options: ListOptions,
}

impl Default for FilterQuery {
    fn default() -> Self {
        Self {
            criteria: Vec::new(),
            exact_match: true,
            options: ListOptions::default(),
        }
    }
}

impl FilterQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.criteria.push((field.into(), value.into()));
        self
    }

    pub fn exact_match(mut self, exact_match: bool) -> Self {
        self.exact_match = exact_match;
        self
    }

    pub fn sort_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.options = self.options.sort_by(field, direction);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.options = self.options.limit(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.options = self.options.offset(offset);
        self
    }

    /// Projection for [`Repository::filter_rows`](crate::Repository::filter_rows) and
    /// [`Repository::search_rows`](crate::Repository::search_rows); the
    /// record-returning calls only validate it.
    pub fn fields<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.options = self.options.fields(fields);
        self
    }
}

/// Free-text search across every text field of an entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    /// Blank or `None` applies no predicate.
    pub text: Option<String>,
    pub options: ListOptions,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            options: ListOptions::default(),
        }
    }

    /// A search without text; only sorting and pagination apply.
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn sort_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.options = self.options.sort_by(field, direction);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.options = self.options.limit(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.options = self.options.offset(offset);
        self
    }

    /// Projection for [`Repository::filter_rows`](crate::Repository::filter_rows) and
    /// [`Repository::search_rows`](crate::Repository::search_rows); the
    /// record-returning calls only validate it.
    pub fn fields<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.options = self.options.fields(fields);
        self
    }

    pub(crate) fn needle(&self) -> Option<&str> {
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }
}
