//! In-memory record source.

use std::cmp::Ordering;

use async_trait::async_trait;
use uuid::Uuid;

use super::{Direction, FieldOf, IdFilter, KeyOf, Keyed, PageQuery, RecordSource};

/// Orient an ascending comparison in `direction`.
fn orient(direction: Direction, ordering: Ordering) -> Ordering {
    match direction {
        Direction::Asc => ordering,
        Direction::Desc => ordering.reverse(),
    }
}

type Visibility<R> = Box<dyn Fn(&R) -> bool + Send + Sync>;

/// `Vec`-backed source with a visibility predicate standing in for
/// ownership and soft-delete filters.
pub struct VecSource<R> {
    records: Vec<R>,
    visible: Visibility<R>,
}

impl<R> VecSource<R>
where
    R: Keyed + Clone + Send + Sync,
{
    #[must_use]
    pub fn new(records: Vec<R>) -> Self {
        Self { records, visible: Box::new(|_| true) }
    }

    /// Hide records for which `visible` returns `false`.
    #[must_use]
    pub fn with_visibility(mut self, visible: impl Fn(&R) -> bool + Send + Sync + 'static) -> Self {
        self.visible = Box::new(visible);
        self
    }

    fn matching<'s>(&'s self, query: &'s PageQuery<'_, R::Field, R::Key>) -> impl Iterator<Item = &'s R> + 's {
        self.records.iter().filter(move |r| {
            (self.visible)(*r)
                && query.ids.admits(r.id())
                && query
                    .boundary
                    .as_ref()
                    .is_none_or(|b| b.admits(&r.sort_key(query.sort.field)))
        })
    }
}

#[async_trait]
impl<R> RecordSource for VecSource<R>
where
    R: Keyed + Clone + Send + Sync,
{
    type Record = R;

    async fn find(&self, id: Uuid, ids: &IdFilter) -> Result<Option<R>, sqlx::Error> {
        Ok(self
            .records
            .iter()
            .find(|r| r.id() == id && (self.visible)(*r) && ids.admits(id))
            .cloned())
    }

    async fn fetch(&self, query: &PageQuery<'_, FieldOf<Self>, KeyOf<Self>>, limit: usize) -> Result<Vec<R>, sqlx::Error> {
        let mut rows: Vec<&R> = self.matching(query).collect();
        let field = query.sort.field;
        let direction = query.sort.direction;
        rows.sort_by(|a, b| {
            let by_key = a
                .sort_key(field)
                .partial_cmp(&b.sort_key(field))
                .unwrap_or(Ordering::Equal);
            orient(direction, by_key.then_with(|| a.id().cmp(&b.id())))
        });
        Ok(rows.into_iter().take(limit).cloned().collect())
    }

    async fn count(&self, query: &PageQuery<'_, FieldOf<Self>, KeyOf<Self>>) -> Result<u64, sqlx::Error> {
        Ok(self.matching(query).count() as u64)
    }
}
