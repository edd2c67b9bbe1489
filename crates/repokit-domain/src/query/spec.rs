use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use super::Filter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

type Comparator<T> = Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

enum OrderKey<T> {
    /// Sorted by the store.
    Field(String),
    /// Sorted in memory after the filtered set is loaded.
    Key(Comparator<T>),
}

/// Ordering of a query, either by a stored field or by an in-memory key selector.
pub struct OrderBy<T> {
    key: OrderKey<T>,
    direction: SortDirection,
}

impl<T> OrderBy<T> {
    /// Order by a serialized field; translated into the store's query.
    pub fn field(path: impl Into<String>) -> Self {
        Self {
            key: OrderKey::Field(path.into()),
            direction: SortDirection::Ascending,
        }
    }

    /// Order by a key computed from the entity. Matches are fully loaded and
    /// sorted in memory; paging is applied after sorting.
    pub fn key<K, F>(selector: F) -> Self
    where
        K: Ord,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        Self {
            key: OrderKey::Key(Arc::new(move |a: &T, b: &T| selector(a).cmp(&selector(b)))),
            direction: SortDirection::Ascending,
        }
    }

    pub fn ascending(mut self) -> Self {
        self.direction = SortDirection::Ascending;
        self
    }

    pub fn descending(mut self) -> Self {
        self.direction = SortDirection::Descending;
        self
    }

    pub fn with_direction(mut self, direction: SortDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn direction(&self) -> SortDirection {
        self.direction
    }

    /// The field path when ordering happens in the store.
    pub fn field_path(&self) -> Option<&str> {
        match &self.key {
            OrderKey::Field(path) => Some(path),
            OrderKey::Key(_) => None,
        }
    }

    pub fn is_in_memory(&self) -> bool {
        matches!(self.key, OrderKey::Key(_))
    }

    /// Compares two entities with an in-memory key, honouring the direction.
    /// Returns `None` for field ordering.
    pub fn compare(&self, a: &T, b: &T) -> Option<Ordering> {
        match &self.key {
            OrderKey::Field(_) => None,
            OrderKey::Key(cmp) => {
                let ord = cmp(a, b);
                Some(match self.direction {
                    SortDirection::Ascending => ord,
                    SortDirection::Descending => ord.reverse(),
                })
            }
        }
    }
}

impl<T> Clone for OrderBy<T> {
    fn clone(&self) -> Self {
        let key = match &self.key {
            OrderKey::Field(path) => OrderKey::Field(path.clone()),
            OrderKey::Key(cmp) => OrderKey::Key(Arc::clone(cmp)),
        };
        Self {
            key,
            direction: self.direction,
        }
    }
}

impl<T> fmt::Debug for OrderBy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = match &self.key {
            OrderKey::Field(path) => path.as_str(),
            OrderKey::Key(_) => "<key selector>",
        };
        f.debug_struct("OrderBy")
            .field("key", &key)
            .field("direction", &self.direction)
            .finish()
    }
}

/// Filter, ordering and paging of one query.
pub struct QuerySpec<T> {
    filter: Filter,
    order: Option<OrderBy<T>>,
    skip: Option<usize>,
    take: Option<usize>,
}

impl<T> QuerySpec<T> {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            order: None,
            skip: None,
            take: None,
        }
    }

    pub fn all() -> Self {
        Self::new(Filter::All)
    }

    /// Narrows the filter (AND).
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = std::mem::take(&mut self.filter).and(filter);
        self
    }

    pub fn order_by(mut self, order: OrderBy<T>) -> Self {
        self.order = Some(order);
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn take(mut self, take: usize) -> Self {
        self.take = Some(take);
        self
    }

    pub fn paged(self, skip: usize, take: usize) -> Self {
        self.skip(skip).take(take)
    }

    pub fn filter_ref(&self) -> &Filter {
        &self.filter
    }

    pub fn order(&self) -> Option<&OrderBy<T>> {
        self.order.as_ref()
    }

    pub fn skip_count(&self) -> Option<usize> {
        self.skip
    }

    pub fn take_count(&self) -> Option<usize> {
        self.take
    }

    pub fn is_paged(&self) -> bool {
        self.skip.is_some() || self.take.is_some()
    }

    /// Whether ordering (and therefore paging) must run in memory.
    pub fn needs_in_memory_pass(&self) -> bool {
        self.order.as_ref().is_some_and(OrderBy::is_in_memory)
    }

    /// Sorts with the in-memory key (stable) and applies skip/take.
    ///
    /// Providers call this after loading the filtered set when
    /// [`QuerySpec::needs_in_memory_pass`] is true.
    pub fn apply_in_memory(&self, mut items: Vec<T>) -> Vec<T> {
        if let Some(order) = &self.order {
            if order.is_in_memory() {
                items.sort_by(|a, b| order.compare(a, b).unwrap_or(Ordering::Equal));
            }
        }
        let skip = self.skip.unwrap_or(0);
        let take = self.take.unwrap_or(usize::MAX);
        items.into_iter().skip(skip).take(take).collect()
    }
}

impl<T> Default for QuerySpec<T> {
    fn default() -> Self {
        Self::all()
    }
}

impl<T> Clone for QuerySpec<T> {
    fn clone(&self) -> Self {
        Self {
            filter: self.filter.clone(),
            order: self.order.clone(),
            skip: self.skip,
            take: self.take,
        }
    }
}

impl<T> fmt::Debug for QuerySpec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySpec")
            .field("filter", &self.filter)
            .field("order", &self.order)
            .field("skip", &self.skip)
            .field("take", &self.take)
            .finish()
    }
}

impl<T> From<Filter> for QuerySpec<T> {
    fn from(filter: Filter) -> Self {
        Self::new(filter)
    }
}
