//! The filter and pagination state behind the transactions view.
//!
//! [TransactionFilters] is the single owner of the page offset: every change to
//! a filter dimension goes through it, and it resets the offset as a side effect.

use std::{collections::BTreeSet, fmt::Display};

use crate::Error;

use super::core::Category;

/// The page size used until the user picks another.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// The page sizes offered in the page size picker.
pub const PAGE_SIZE_OPTIONS: [u32; 4] = [5, 10, 20, 50];

/// The direction of a sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Smallest or oldest first.
    Ascending,
    /// Largest or newest first.
    Descending,
}

impl Direction {
    fn suffix(self) -> &'static str {
        match self {
            Direction::Ascending => "asc",
            Direction::Descending => "desc",
        }
    }
}

/// How a filtered query is sorted.
///
/// Sorting by amount and sorting by date are mutually exclusive, so there is
/// only ever one sort at a time.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortOrder {
    /// The server's default order.
    #[default]
    None,
    /// Sort by amount.
    ByAmount(Direction),
    /// Sort by date.
    ByDate(Direction),
}

impl SortOrder {
    /// The value of the `order` query parameter, or `None` for the default order.
    pub fn as_query_value(self) -> Option<String> {
        match self {
            SortOrder::None => None,
            SortOrder::ByAmount(direction) => Some(format!("amount_{}", direction.suffix())),
            SortOrder::ByDate(direction) => Some(format!("date_{}", direction.suffix())),
        }
    }

    /// The direction of the amount sort, if sorting by amount.
    pub fn amount_direction(self) -> Option<Direction> {
        match self {
            SortOrder::ByAmount(direction) => Some(direction),
            _ => None,
        }
    }

    /// The direction of the date sort, if sorting by date.
    pub fn date_direction(self) -> Option<Direction> {
        match self {
            SortOrder::ByDate(direction) => Some(direction),
            _ => None,
        }
    }
}

/// An inclusive amount filter where either end may be open.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct AmountRange {
    /// The smallest amount to include.
    pub min: Option<f64>,
    /// The largest amount to include.
    pub max: Option<f64>,
}

impl AmountRange {
    /// Whether neither end is set.
    pub fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    /// The value of the `amount` query parameter, e.g. "10-50", "10-" or "-50".
    pub fn as_query_value(&self) -> String {
        let bound = |value: Option<f64>| value.map(|value| value.to_string()).unwrap_or_default();

        format!("{}-{}", bound(self.min), bound(self.max))
    }
}

/// The limit and offset of one page of the plain transaction list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageRequest {
    /// The maximum number of transactions in the page.
    pub limit: u32,
    /// The zero-based index of the first transaction in the page.
    pub offset: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

impl Display for PageRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "limit={}, offset={}", self.limit, self.offset)
    }
}

/// The search text, sort, category and amount filters and the page position
/// of the transactions view.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionFilters {
    page_size: u32,
    offset: u32,
    search: String,
    sort: SortOrder,
    categories: BTreeSet<Category>,
    amount_range: Option<AmountRange>,
}

impl Default for TransactionFilters {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            offset: 0,
            search: String::new(),
            sort: SortOrder::None,
            categories: BTreeSet::new(),
            amount_range: None,
        }
    }
}

impl TransactionFilters {
    /// No filters, first page, default page size.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of transactions per page.
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// The zero-based offset of the current page.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// The search text as entered.
    pub fn search(&self) -> &str {
        &self.search
    }

    /// The current sort.
    pub fn sort(&self) -> SortOrder {
        self.sort
    }

    /// The selected categories.
    pub fn categories(&self) -> &BTreeSet<Category> {
        &self.categories
    }

    /// The amount filter, if any.
    pub fn amount_range(&self) -> Option<AmountRange> {
        self.amount_range
    }

    /// Replace the search text and go back to the first page.
    pub fn set_search(&mut self, search: &str) {
        self.search = search.to_owned();
        self.offset = 0;
    }

    /// Empty the search text and go back to the first page.
    pub fn clear_search(&mut self) {
        self.set_search("");
    }

    /// Sort by amount, replacing any date sort. `None` removes the sort.
    pub fn set_amount_order(&mut self, direction: Option<Direction>) {
        self.set_sort(direction.map_or(SortOrder::None, SortOrder::ByAmount));
    }

    /// Sort by date, replacing any amount sort. `None` removes the sort.
    pub fn set_date_order(&mut self, direction: Option<Direction>) {
        self.set_sort(direction.map_or(SortOrder::None, SortOrder::ByDate));
    }

    /// Replace the sort and go back to the first page.
    pub fn set_sort(&mut self, sort: SortOrder) {
        self.sort = sort;
        self.offset = 0;
    }

    /// Replace the category filter and go back to the first page.
    pub fn set_categories(&mut self, categories: impl IntoIterator<Item = Category>) {
        self.categories = categories.into_iter().collect();
        self.offset = 0;
    }

    /// Add `category` to the filter if it is missing, otherwise remove it.
    /// Goes back to the first page.
    pub fn toggle_category(&mut self, category: Category) {
        if !self.categories.remove(&category) {
            self.categories.insert(category);
        }
        self.offset = 0;
    }

    /// Replace the amount filter and go back to the first page.
    ///
    /// A range with neither end set is the same as no range.
    pub fn set_amount_range(&mut self, amount_range: Option<AmountRange>) {
        self.amount_range = amount_range.filter(|range| !range.is_unbounded());
        self.offset = 0;
    }

    /// Change the page size and go back to the first page.
    ///
    /// # Errors
    ///
    /// Returns [Error::InvalidPageSize] if `page_size` is zero.
    pub fn set_page_size(&mut self, page_size: u32) -> Result<(), Error> {
        if page_size == 0 {
            return Err(Error::InvalidPageSize);
        }

        self.page_size = page_size;
        self.offset = 0;
        Ok(())
    }

    /// Clear the sort, categories and amount range, and go back to the first page.
    ///
    /// The search text and page size are kept.
    pub fn reset_filters(&mut self) {
        self.sort = SortOrder::None;
        self.categories.clear();
        self.amount_range = None;
        self.offset = 0;
    }

    /// Move forward one page.
    ///
    /// There is no upper bound; the caller hides the button using [super::has_more].
    pub fn next_page(&mut self) {
        self.offset = self.offset.saturating_add(self.page_size);
    }

    /// Move back one page, stopping at the first.
    pub fn previous_page(&mut self) {
        self.offset = self.offset.saturating_sub(self.page_size);
    }

    /// The one-based number of the current page.
    pub fn current_page(&self) -> u32 {
        self.offset / self.page_size + 1
    }

    /// Whether a sort, category or amount filter is set.
    pub fn has_active_filters(&self) -> bool {
        self.sort != SortOrder::None || !self.categories.is_empty() || self.amount_range.is_some()
    }

    /// Whether there is non-blank search text.
    pub fn has_search_query(&self) -> bool {
        !self.search.trim().is_empty()
    }

    /// Whether the filtered query, rather than the plain list, backs the view.
    pub fn is_filtered(&self) -> bool {
        self.has_search_query() || self.has_active_filters()
    }

    /// The limit and offset of the current page.
    pub fn page_request(&self) -> PageRequest {
        PageRequest {
            limit: self.page_size,
            offset: self.offset,
        }
    }

    /// The comma separated category keys, in a stable order.
    pub(crate) fn category_query_value(&self) -> Option<String> {
        if self.categories.is_empty() {
            return None;
        }

        let keys: Vec<&str> = self.categories.iter().map(|category| category.key()).collect();
        Some(keys.join(","))
    }

    /// The query string pairs for the filtered query. Empty dimensions are left out.
    pub(crate) fn search_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::with_capacity(6);

        if self.has_search_query() {
            pairs.push(("search", self.search.trim().to_owned()));
        }
        if let Some(categories) = self.category_query_value() {
            pairs.push(("category", categories));
        }
        if let Some(order) = self.sort.as_query_value() {
            pairs.push(("order", order));
        }
        if let Some(amount_range) = self.amount_range {
            pairs.push(("amount", amount_range.as_query_value()));
        }
        pairs.push(("limit", self.page_size.to_string()));
        pairs.push(("offset", self.offset.to_string()));

        pairs
    }
}
