//! Cached transaction reads and the mutations that invalidate them.

use std::sync::Arc;

use serde::Deserialize;

use crate::{
    Error,
    api_client::ApiClient,
    cache::{QueryCache, QueryKey, QueryState},
    endpoints::{self, format_endpoint},
    retry::RetryPolicy,
};

use super::{
    core::{MutationResponse, NewTransaction, Transaction, TransactionId, TransactionUpdate},
    filters::{PageRequest, TransactionFilters},
};

const LISTS_ROOT: &str = "transactions";
const ITEM_ROOT: &str = "transaction";

#[derive(Debug, Deserialize)]
struct ListResponse {
    transactions: Vec<Transaction>,
}

#[derive(Debug, Deserialize)]
struct ItemResponse {
    transaction: Transaction,
}

/// The prefix shared by the plain and filtered list keys.
pub(crate) fn lists_prefix() -> QueryKey {
    QueryKey::new([LISTS_ROOT])
}

pub(crate) fn list_key(page: PageRequest) -> QueryKey {
    QueryKey::new([
        LISTS_ROOT.to_owned(),
        "list".to_owned(),
        page.limit.to_string(),
        page.offset.to_string(),
    ])
}

pub(crate) fn search_key(filters: &TransactionFilters) -> QueryKey {
    QueryKey::new([
        LISTS_ROOT.to_owned(),
        "query".to_owned(),
        filters.search().trim().to_owned(),
        filters.category_query_value().unwrap_or_default(),
        filters.sort().as_query_value().unwrap_or_default(),
        filters
            .amount_range()
            .map(|range| range.as_query_value())
            .unwrap_or_default(),
        filters.page_size().to_string(),
        filters.offset().to_string(),
    ])
}

pub(crate) fn item_key(id: &TransactionId) -> QueryKey {
    QueryKey::new([ITEM_ROOT, id.as_str()])
}

/// The transaction reads and mutations, backed by a shared [QueryCache].
///
/// Reads never return an error, see [QueryState]. Mutations do, and on
/// success they invalidate the reads they affect.
#[derive(Debug)]
pub struct TransactionQueries {
    api: Arc<ApiClient>,
    lists: QueryCache<Vec<Transaction>>,
    items: QueryCache<Transaction>,
    retry: RetryPolicy,
}

impl TransactionQueries {
    /// Create the queries with empty caches.
    pub fn new(api: Arc<ApiClient>, retry: RetryPolicy) -> Self {
        Self {
            api,
            lists: QueryCache::new(),
            items: QueryCache::new(),
            retry,
        }
    }

    /// Read one page of the unfiltered transaction list.
    pub async fn list(&self, page: PageRequest) -> QueryState<Vec<Transaction>> {
        let key = list_key(page);
        let query = [
            ("limit", page.limit.to_string()),
            ("offset", page.offset.to_string()),
        ];

        self.lists
            .fetch(&key, &self.retry, || {
                self.fetch_list(endpoints::TRANSACTIONS, &query)
            })
            .await
            .inspect_err(|error| {
                tracing::error!("Failed to load transactions ({page}): {error}")
            })
            .into()
    }

    /// Read one page of the transactions matching `filters`.
    ///
    /// Returns [QueryState::Disabled] without a request when `filters` has no
    /// search text and no active filter, in which case [Self::list] backs the view.
    pub async fn search(&self, filters: &TransactionFilters) -> QueryState<Vec<Transaction>> {
        if !filters.is_filtered() {
            return QueryState::Disabled;
        }

        let key = search_key(filters);
        let query = filters.search_query_pairs();

        self.lists
            .fetch(&key, &self.retry, || {
                self.fetch_list(endpoints::TRANSACTIONS_QUERY, &query)
            })
            .await
            .inspect_err(|error| tracing::error!("Failed to search transactions: {error}"))
            .into()
    }

    /// Read a single transaction.
    ///
    /// Returns [QueryState::Disabled] without a request when there is no ID.
    pub async fn get(&self, id: Option<&TransactionId>) -> QueryState<Transaction> {
        let Some(id) = id.filter(|id| !id.is_empty()) else {
            return QueryState::Disabled;
        };

        let key = item_key(id);
        let path = format_endpoint(endpoints::TRANSACTION_V1, id.as_str());

        self.items
            .fetch(&key, &self.retry, || async {
                self.api
                    .get::<ItemResponse>(&path, &[])
                    .await
                    .map(|response| response.transaction)
            })
            .await
            .inspect_err(|error| tracing::error!("Failed to load transaction {id}: {error}"))
            .into()
    }

    /// Create a transaction and mark every cached list as stale.
    ///
    /// # Errors
    ///
    /// Returns the server's error, e.g. an [Error::Api] with the validation
    /// message, unchanged. The request is never retried.
    pub async fn create(&self, transaction: &NewTransaction) -> Result<MutationResponse, Error> {
        let response: MutationResponse = self
            .api
            .post(endpoints::TRANSACTIONS, transaction)
            .await
            .inspect_err(|error| tracing::warn!("Failed to create transaction: {error}"))?;

        self.lists.invalidate(&lists_prefix());
        tracing::info!("Created a transaction of {}", transaction.amount());

        Ok(response)
    }

    /// Apply `update` to the transaction `id`, then mark every cached list and
    /// the cached copy of the transaction as stale.
    ///
    /// # Errors
    ///
    /// Returns the server's error unchanged. The request is never retried.
    pub async fn update(
        &self,
        id: &TransactionId,
        update: &TransactionUpdate,
    ) -> Result<MutationResponse, Error> {
        let path = format_endpoint(endpoints::TRANSACTION_V1, id.as_str());
        let response: MutationResponse = self
            .api
            .put(&path, update)
            .await
            .inspect_err(|error| tracing::warn!("Failed to update transaction {id}: {error}"))?;

        self.lists.invalidate(&lists_prefix());
        self.items.invalidate(&item_key(id));
        tracing::info!("Updated transaction {id}");

        Ok(response)
    }

    /// Delete the transaction `id`, evict its cached copy and mark every cached
    /// list as stale.
    ///
    /// # Errors
    ///
    /// Returns the server's error unchanged. The request is never retried.
    pub async fn delete(&self, id: &TransactionId) -> Result<MutationResponse, Error> {
        let path = format_endpoint(endpoints::TRANSACTION, id.as_str());
        let response: MutationResponse = self
            .api
            .delete(&path)
            .await
            .inspect_err(|error| tracing::warn!("Failed to delete transaction {id}: {error}"))?;

        self.items.remove(&item_key(id));
        self.lists.invalidate(&lists_prefix());
        tracing::info!("Deleted transaction {id}");

        Ok(response)
    }

    /// Whether the read for `page` of the plain list is in flight.
    pub fn is_fetching_list(&self, page: PageRequest) -> bool {
        self.lists.is_fetching(&list_key(page))
    }

    /// Whether the filtered read for `filters` is in flight.
    pub fn is_fetching_search(&self, filters: &TransactionFilters) -> bool {
        self.lists.is_fetching(&search_key(filters))
    }

    /// Whether the read for the transaction `id` is in flight.
    pub fn is_fetching_item(&self, id: &TransactionId) -> bool {
        self.items.is_fetching(&item_key(id))
    }

    /// Drop every cached transaction, e.g. when the user logs out.
    pub fn clear_all(&self) {
        self.lists.clear();
        self.items.clear();
    }

    #[cfg(test)]
    pub(crate) fn lists(&self) -> &QueryCache<Vec<Transaction>> {
        &self.lists
    }

    #[cfg(test)]
    pub(crate) fn items(&self) -> &QueryCache<Transaction> {
        &self.items
    }

    async fn fetch_list(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<Transaction>, Error> {
        self.api
            .get::<ListResponse>(path, query)
            .await
            .map(|response| response.transactions)
    }
}
