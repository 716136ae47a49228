//! Cursor pagination over a filtered record view.
//!
//! DESIGN
//! ======
//! Callers hand the paginator a [`RecordSource`] that is already narrowed to
//! what the principal may see (tenant, owner, soft-delete flag). The paginator
//! only knows how to resolve a "last seen" id back to its record, turn that
//! record into a strict-inequality [`Boundary`] on the sort field, and ask the
//! source for the next `limit` rows beyond it.
//!
//! TRADE-OFFS
//! ==========
//! The boundary compares the sort field only. Records that share the
//! reference's sort value are on neither side of the boundary, so they are
//! skipped when they straddle a page break. Sources order by id after the sort
//! field so the contents of a single page are reproducible.

#[cfg(test)]
mod memory;

use std::str::FromStr;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

#[cfg(test)]
pub use memory::VecSource;

// =============================================================================
// SORTING
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Sort field plus direction, e.g. `-updated_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec<F> {
    pub field: F,
    pub direction: Direction,
}

impl<F> SortSpec<F> {
    #[must_use]
    pub fn new(field: F, direction: Direction) -> Self {
        Self { field, direction }
    }
}

impl<F: FromStr> SortSpec<F> {
    /// Parse a sort expression. A leading `-` selects descending order.
    ///
    /// # Errors
    ///
    /// Returns the field type's parse error for an unknown field name.
    pub fn parse(raw: &str) -> Result<Self, F::Err> {
        let (direction, name) = match raw.trim().strip_prefix('-') {
            Some(rest) => (Direction::Desc, rest),
            None => (Direction::Asc, raw.trim()),
        };
        Ok(Self::new(name.parse()?, direction))
    }
}

// =============================================================================
// FILTERS
// =============================================================================

/// Inclusion/exclusion id sets applied before the cursor boundary.
///
/// `include: Some(vec![])` admits nothing; `exclude: Some(vec![])` excludes
/// nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdFilter {
    pub include: Option<Vec<Uuid>>,
    pub exclude: Option<Vec<Uuid>>,
}

impl IdFilter {
    #[cfg(test)]
    #[must_use]
    pub fn admits(&self, id: Uuid) -> bool {
        if let Some(include) = &self.include {
            if !include.contains(&id) {
                return false;
            }
        }
        self.exclude.as_ref().is_none_or(|exclude| !exclude.contains(&id))
    }
}

/// Strict-inequality predicate anchored on a reference record's sort value.
#[derive(Debug, Clone, PartialEq)]
pub struct Boundary<K> {
    pub key: K,
    pub direction: Direction,
}

impl<K: PartialOrd> Boundary<K> {
    /// Boundary that keeps only records past `record` in `sort` order.
    pub fn after<R>(record: &R, sort: SortSpec<R::Field>) -> Self
    where
        R: Keyed<Key = K>,
    {
        Self { key: record.sort_key(sort.field), direction: sort.direction }
    }

    #[cfg(test)]
    #[must_use]
    pub fn admits(&self, key: &K) -> bool {
        match self.direction {
            Direction::Desc => *key < self.key,
            Direction::Asc => *key > self.key,
        }
    }

    /// SQL comparison operator for this boundary.
    #[must_use]
    pub fn operator(&self) -> &'static str {
        match self.direction {
            Direction::Desc => "<",
            Direction::Asc => ">",
        }
    }
}

// =============================================================================
// RECORDS AND SOURCES
// =============================================================================

/// A record that can be paginated: unique id plus typed sortable fields.
pub trait Keyed {
    type Field: Copy + Send + Sync;
    type Key: Clone + PartialOrd + Send + Sync;

    fn id(&self) -> Uuid;
    fn sort_key(&self, field: Self::Field) -> Self::Key;
}

pub type FieldOf<S> = <<S as RecordSource>::Record as Keyed>::Field;
pub type KeyOf<S> = <<S as RecordSource>::Record as Keyed>::Key;

/// One read against a source: id filters, ordering, optional boundary.
#[derive(Debug, Clone)]
pub struct PageQuery<'a, F, K> {
    pub ids: &'a IdFilter,
    pub sort: SortSpec<F>,
    pub boundary: Option<Boundary<K>>,
}

/// Queryable view of records already scoped to the caller.
#[async_trait]
pub trait RecordSource: Send + Sync {
    type Record: Keyed + Send + Sync;

    /// Look up one record by id, honoring the view and `ids`.
    async fn find(&self, id: Uuid, ids: &IdFilter) -> Result<Option<Self::Record>, sqlx::Error>;

    /// Fetch up to `limit` records matching `query`, in sort order.
    async fn fetch(
        &self,
        query: &PageQuery<'_, FieldOf<Self>, KeyOf<Self>>,
        limit: usize,
    ) -> Result<Vec<Self::Record>, sqlx::Error>;

    /// Count records matching `query`.
    async fn count(&self, query: &PageQuery<'_, FieldOf<Self>, KeyOf<Self>>) -> Result<u64, sqlx::Error>;
}

// =============================================================================
// PAGINATION
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PaginationError {
    #[error("reference record not found: {0}")]
    ReferenceNotFound(Uuid),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone)]
pub struct PageRequest<F> {
    pub sort: SortSpec<F>,
    pub last_id: Option<Uuid>,
    pub limit: usize,
    pub ids: IdFilter,
}

/// One page of records plus whether more exist beyond it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub limit: usize,
    pub has_more: bool,
    pub data: Vec<T>,
}

impl<T> Page<T> {
    #[must_use]
    pub fn empty(limit: usize) -> Self {
        Self { limit, has_more: false, data: Vec::new() }
    }
}

/// Return the page after `request.last_id` (or the first page).
///
/// # Errors
///
/// Returns [`PaginationError::ReferenceNotFound`] when `last_id` does not
/// resolve to a visible record, or a database error from the source.
pub async fn paginate_by_last_id<S>(
    source: &S,
    request: PageRequest<FieldOf<S>>,
) -> Result<Page<S::Record>, PaginationError>
where
    S: RecordSource + ?Sized,
{
    let PageRequest { sort, last_id, limit, ids } = request;
    if limit == 0 {
        return Ok(Page::empty(limit));
    }

    let boundary = match last_id {
        Some(id) => {
            let reference = source
                .find(id, &ids)
                .await?
                .ok_or(PaginationError::ReferenceNotFound(id))?;
            Some(Boundary::after(&reference, sort))
        }
        None => None,
    };

    let query = PageQuery { ids: &ids, sort, boundary };
    let data = source.fetch(&query, limit).await?;

    let has_more = match data.last() {
        Some(last) if data.len() >= limit => {
            let rest = PageQuery { boundary: Some(Boundary::after(last, sort)), ..query };
            source.count(&rest).await? > 0
        }
        _ => false,
    };

    Ok(Page { limit, has_more, data })
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
