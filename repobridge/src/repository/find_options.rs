/// Sort direction of a `get_all` result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Smallest first.
    #[default]
    Ascending,
    /// Largest first.
    Descending,
}

impl SortOrder {
    /// Parses the wire form of a sort direction: exactly `"desc"` is
    /// descending, anything else ascending.
    pub fn parse(direction: &str) -> SortOrder {
        if direction == "desc" {
            SortOrder::Descending
        } else {
            SortOrder::Ascending
        }
    }
}

/// Sorting and pagination options of a `get_all` call.
///
/// A limit of zero means unlimited.
///
/// # Examples
///
/// ```rust
/// use repobridge::repository::{FindOptions, SortOrder};
///
/// let options = FindOptions::new()
///     .sort_by("age", SortOrder::Descending)
///     .offset(10)
///     .limit(20);
///
/// assert_eq!(options, FindOptions::from_params("age", "desc", 20, 10));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    sort: Option<(String, SortOrder)>,
    limit: usize,
    offset: usize,
}

impl FindOptions {
    pub fn new() -> Self {
        FindOptions::default()
    }

    /// Builds options from raw request parameters; an empty sort field means
    /// natural order.
    pub fn from_params(sort_field: &str, sort_direction: &str, limit: usize, offset: usize) -> Self {
        let options = FindOptions::new().limit(limit).offset(offset);
        if sort_field.is_empty() {
            options
        } else {
            options.sort_by(sort_field, SortOrder::parse(sort_direction))
        }
    }

    pub fn sort_by(mut self, field: &str, order: SortOrder) -> Self {
        self.sort = Some((field.to_string(), order));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn sort(&self) -> Option<(&str, SortOrder)> {
        self.sort.as_ref().map(|(field, order)| (field.as_str(), *order))
    }

    /// The cap on returned records, or `None` when unlimited.
    pub fn limit_value(&self) -> Option<usize> {
        if self.limit == 0 {
            None
        } else {
            Some(self.limit)
        }
    }

    pub fn offset_value(&self) -> usize {
        self.offset
    }

    /// Applies offset and limit to an already sorted result.
    pub fn paginate<T>(&self, items: Vec<T>) -> Vec<T> {
        let iter = items.into_iter().skip(self.offset);
        match self.limit_value() {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_sort_order() {
        assert_eq!(SortOrder::parse("desc"), SortOrder::Descending);
        assert_eq!(SortOrder::parse("DESC"), SortOrder::Ascending);
        assert_eq!(SortOrder::parse("Desc"), SortOrder::Ascending);
        assert_eq!(SortOrder::parse("asc"), SortOrder::Ascending);
        assert_eq!(SortOrder::parse(""), SortOrder::Ascending);
        assert_eq!(SortOrder::parse("sideways"), SortOrder::Ascending);
    }

    #[test]
    fn zero_limit_is_unlimited() {
        let options = FindOptions::new();
        assert_eq!(options.limit_value(), None);
        assert_eq!(options.paginate(vec![1, 2, 3]), vec![1, 2, 3]);
    }

    #[test]
    fn paginate_skips_then_caps() {
        let options = FindOptions::new().offset(1).limit(2);
        assert_eq!(options.paginate(vec![1, 2, 3, 4]), vec![2, 3]);

        let options = FindOptions::new().offset(10);
        assert!(options.paginate(vec![1, 2]).is_empty());
    }

    #[test]
    fn from_params_without_field_is_unsorted() {
        let options = FindOptions::from_params("", "desc", 5, 0);
        assert_eq!(options.sort(), None);
        assert_eq!(options.limit_value(), Some(5));
    }
}
