//! Transaction management for the budgeting client.
//!
//! This module contains everything related to transactions:
//! - The `Transaction` model, its categories, and validated create/update payloads
//! - The cached reads and the mutations that invalidate them
//! - The filter/pagination state that decides which read backs a page
//! - The page view model that applies the precedence rules

mod core;
mod filters;
mod page;
mod query;

pub use core::{
    Category, MutationResponse, NewTransaction, Transaction, TransactionId, TransactionType,
    TransactionUpdate,
};
pub use filters::{
    AmountRange, DEFAULT_PAGE_SIZE, Direction, PAGE_SIZE_OPTIONS, PageRequest, SortOrder,
    TransactionFilters,
};
pub use page::{PageSource, TransactionsPage, has_more};
pub use query::TransactionQueries;
