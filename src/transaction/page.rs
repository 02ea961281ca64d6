//! The transactions page view model: which read backs the view, and whether
//! there are more pages.

use crate::{Error, cache::QueryState};

use super::{core::Transaction, filters::TransactionFilters, query::TransactionQueries};

/// Whether another page probably follows one with `count` results.
///
/// The API does not report a total, so a page that exactly fills `limit`
/// reports more pages even when it is the last one.
pub fn has_more(count: usize, limit: u32) -> bool {
    count >= limit as usize
}

/// The read a [TransactionsPage] was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSource {
    /// The unfiltered list.
    List,
    /// The filtered query.
    Search,
}

/// One page of the transactions view.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionsPage {
    /// The transactions to display, empty if the read failed.
    pub transactions: Vec<Transaction>,
    /// Which read the transactions came from.
    pub source: PageSource,
    /// Whether to offer a next page button.
    pub has_more: bool,
    /// The one-based page number.
    pub current_page: u32,
    /// Why the read failed, if it did.
    pub error: Option<Error>,
}

impl TransactionQueries {
    /// Load the page described by `filters`.
    ///
    /// The filtered query backs the page when there is search text or an
    /// active filter, otherwise the plain list does. Only the backing read is
    /// issued.
    pub async fn load_page(&self, filters: &TransactionFilters) -> TransactionsPage {
        let (source, state) = if filters.is_filtered() {
            (PageSource::Search, self.search(filters).await)
        } else {
            (PageSource::List, self.list(filters.page_request()).await)
        };

        let (transactions, error) = match state {
            QueryState::Ready(transactions) => (transactions, None),
            QueryState::Failed(error) => (Vec::new(), Some(error)),
            QueryState::Disabled => (Vec::new(), None),
        };

        TransactionsPage {
            has_more: error.is_none() && has_more(transactions.len(), filters.page_size()),
            transactions,
            source,
            current_page: filters.current_page(),
            error,
        }
    }

    /// Whether the read that backs `filters` is in flight.
    pub fn is_loading(&self, filters: &TransactionFilters) -> bool {
        if filters.is_filtered() {
            self.is_fetching_search(filters)
        } else {
            self.is_fetching_list(filters.page_request())
        }
    }
}
