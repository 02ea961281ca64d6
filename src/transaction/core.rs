//! Defines the core data models for transactions.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::Error;

// ============================================================================
// MODELS
// ============================================================================

/// A newtype wrapper for the opaque, server-assigned transaction IDs.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    /// Wrap an ID returned by the server.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the ID is empty, which never identifies a transaction.
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for TransactionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Whether money was earned or spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Money earned.
    Income,
    /// Money spent.
    Expense,
}

impl TransactionType {
    /// The value used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionType::Income => "income",
            TransactionType::Expense => "expense",
        }
    }
}

impl Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "income" => Ok(TransactionType::Income),
            "expense" => Ok(TransactionType::Expense),
            other => Err(format!(
                "unknown transaction type \"{other}\", expected \"income\" or \"expense\""
            )),
        }
    }
}

/// The categories the UI offers when creating or filtering transactions.
///
/// The server stores categories as free-form strings, see [Transaction::category].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Food & Dining
    Food,
    /// Transportation
    Transport,
    /// Shopping
    Shopping,
    /// Entertainment
    Entertainment,
    /// Bills & Utilities
    Bills,
    /// Healthcare
    Healthcare,
    /// Salary
    Salary,
    /// Freelance
    Freelance,
    /// Investment
    Investment,
    /// Other
    Other,
}

impl Category {
    /// Every category, in display order.
    pub const ALL: [Category; 10] = [
        Category::Food,
        Category::Transport,
        Category::Shopping,
        Category::Entertainment,
        Category::Bills,
        Category::Healthcare,
        Category::Salary,
        Category::Freelance,
        Category::Investment,
        Category::Other,
    ];

    const EXPENSE: [Category; 7] = [
        Category::Food,
        Category::Transport,
        Category::Shopping,
        Category::Entertainment,
        Category::Bills,
        Category::Healthcare,
        Category::Other,
    ];

    const INCOME: [Category; 4] = [
        Category::Salary,
        Category::Freelance,
        Category::Investment,
        Category::Other,
    ];

    /// The categories offered for `transaction_type`.
    pub fn for_type(transaction_type: TransactionType) -> &'static [Category] {
        match transaction_type {
            TransactionType::Income => &Self::INCOME,
            TransactionType::Expense => &Self::EXPENSE,
        }
    }

    /// The key sent to the server.
    pub fn key(self) -> &'static str {
        match self {
            Category::Food => "food",
            Category::Transport => "transport",
            Category::Shopping => "shopping",
            Category::Entertainment => "entertainment",
            Category::Bills => "bills",
            Category::Healthcare => "healthcare",
            Category::Salary => "salary",
            Category::Freelance => "freelance",
            Category::Investment => "investment",
            Category::Other => "other",
        }
    }

    /// The human readable name.
    pub fn label(self) -> &'static str {
        match self {
            Category::Food => "Food & Dining",
            Category::Transport => "Transportation",
            Category::Shopping => "Shopping",
            Category::Entertainment => "Entertainment",
            Category::Bills => "Bills & Utilities",
            Category::Healthcare => "Healthcare",
            Category::Salary => "Salary",
            Category::Freelance => "Freelance",
            Category::Investment => "Investment",
            Category::Other => "Other",
        }
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();

        Category::ALL
            .into_iter()
            .find(|category| category.key() == key)
            .ok_or_else(|| format!("unknown category \"{key}\""))
    }
}

/// An expense or income, as stored by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// The ID of the transaction.
    pub id: TransactionId,
    /// The amount of money spent or earned, always positive.
    pub amount: f64,
    /// Whether the money was earned or spent.
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    /// The category key, usually one of [Category].
    pub category: String,
    /// A text description of what the transaction was for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Additional notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// The ID of the user who owns the transaction.
    #[serde(default)]
    pub user_id: String,
    /// When the server created the transaction.
    #[serde(with = "crate::timestamp")]
    pub created: OffsetDateTime,
    /// When the server last updated the transaction.
    #[serde(with = "crate::timestamp")]
    pub updated: OffsetDateTime,
}

/// The validated payload for creating a transaction.
///
/// To create a new `NewTransaction`, use [NewTransaction::new], optionally
/// followed by [NewTransaction::description] and [NewTransaction::note].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewTransaction {
    amount: f64,
    #[serde(rename = "type")]
    transaction_type: TransactionType,
    category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<String>,
}

impl NewTransaction {
    /// Create the payload for a new transaction.
    ///
    /// # Errors
    ///
    /// Returns [Error::InvalidAmount] if `amount` is not a finite number greater
    /// than zero, or [Error::EmptyCategory] if `category` is blank.
    pub fn new(
        amount: f64,
        transaction_type: TransactionType,
        category: &str,
    ) -> Result<Self, Error> {
        Ok(Self {
            amount: validate_amount(amount)?,
            transaction_type,
            category: validate_category(category)?,
            description: None,
            note: None,
        })
    }

    /// Set the description. Blank descriptions are left out.
    pub fn description(mut self, description: &str) -> Self {
        self.description = non_blank(description);
        self
    }

    /// Set the note. Blank notes are left out.
    pub fn note(mut self, note: &str) -> Self {
        self.note = non_blank(note);
        self
    }

    /// The amount.
    pub fn amount(&self) -> f64 {
        self.amount
    }

    /// The category key.
    pub fn category(&self) -> &str {
        &self.category
    }
}

/// A partial update to a transaction. Fields left as `None` are not changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TransactionUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    amount: Option<f64>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    transaction_type: Option<TransactionType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<String>,
}

impl TransactionUpdate {
    /// An update that changes nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Change the amount.
    ///
    /// # Errors
    ///
    /// Returns [Error::InvalidAmount] if `amount` is not greater than zero.
    pub fn amount(mut self, amount: f64) -> Result<Self, Error> {
        self.amount = Some(validate_amount(amount)?);
        Ok(self)
    }

    /// Change whether the transaction is income or an expense.
    pub fn transaction_type(mut self, transaction_type: TransactionType) -> Self {
        self.transaction_type = Some(transaction_type);
        self
    }

    /// Change the category.
    ///
    /// # Errors
    ///
    /// Returns [Error::EmptyCategory] if `category` is blank.
    pub fn category(mut self, category: &str) -> Result<Self, Error> {
        self.category = Some(validate_category(category)?);
        Ok(self)
    }

    /// Change the description.
    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.trim().to_owned());
        self
    }

    /// Change the note.
    pub fn note(mut self, note: &str) -> Self {
        self.note = Some(note.trim().to_owned());
        self
    }

    /// Whether the update would change nothing.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// The body the server sends back for a mutation.
///
/// The shape varies between endpoints, so every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MutationResponse {
    /// A human readable status message.
    #[serde(default)]
    pub message: Option<String>,
    /// The created or updated transaction, when the server echoes it back.
    #[serde(default)]
    pub transaction: Option<Transaction>,
}

fn validate_amount(amount: f64) -> Result<f64, Error> {
    if amount.is_finite() && amount > 0.0 {
        Ok(amount)
    } else {
        Err(Error::InvalidAmount(amount))
    }
}

fn validate_category(category: &str) -> Result<String, Error> {
    let category = category.trim();

    if category.is_empty() {
        Err(Error::EmptyCategory)
    } else {
        Ok(category.to_owned())
    }
}

fn non_blank(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_owned())
}
