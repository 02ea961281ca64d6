//! Formatting amounts and dates for display.

use std::sync::OnceLock;

use numfmt::{Formatter, Precision};
use time::{OffsetDateTime, format_description::BorrowedFormatItem, macros::format_description};

use crate::transaction::TransactionType;

/// e.g. "Jan 15, 2024"
const DATE_FORMAT: &[BorrowedFormatItem] =
    format_description!("[month repr:short] [day padding:none], [year]");

/// Format `number` as dollars and cents, e.g. "$1,234.50" or "-$12.30".
pub fn format_currency(number: f64) -> String {
    static POSITIVE_FMT: OnceLock<Option<Formatter>> = OnceLock::new();
    static NEGATIVE_FMT: OnceLock<Option<Formatter>> = OnceLock::new();

    let formatter = |prefix: &str| {
        Formatter::currency(prefix)
            .ok()
            .map(|formatter| formatter.precision(Precision::Decimals(2)))
    };

    let formatted = if number < 0.0 {
        NEGATIVE_FMT
            .get_or_init(|| formatter("-$"))
            .as_ref()
            .map(|formatter| formatter.fmt_string(number.abs()))
    } else if number > 0.0 {
        POSITIVE_FMT
            .get_or_init(|| formatter("$"))
            .as_ref()
            .map(|formatter| formatter.fmt_string(number))
    } else {
        // numfmt renders zero as "0"
        return "$0.00".to_owned();
    };

    let formatted = formatted.unwrap_or_else(|| {
        let sign = if number < 0.0 { "-" } else { "" };
        format!("{sign}${:.2}", number.abs())
    });

    pad_cents(formatted)
}

/// numfmt drops trailing zeros, e.g. "$12.3" for 12.30 and "$45" for 45.00.
fn pad_cents(mut formatted: String) -> String {
    match formatted.rfind('.') {
        None => formatted.push_str(".00"),
        Some(point) if formatted.len() - point == 2 => formatted.push('0'),
        Some(_) => {}
    }

    formatted
}

/// Format a transaction amount with the sign of its type, e.g. "+$12.30" for
/// income and "-$45.00" for an expense.
pub fn format_signed_amount(amount: f64, transaction_type: TransactionType) -> String {
    let unsigned = format_currency(amount.abs());

    match transaction_type {
        TransactionType::Income => format!("+{unsigned}"),
        TransactionType::Expense => format!("-{unsigned}"),
    }
}

/// Format the date part of `timestamp`, e.g. "Jan 15, 2024".
pub fn format_date(timestamp: OffsetDateTime) -> String {
    timestamp
        .format(DATE_FORMAT)
        .unwrap_or_else(|_| timestamp.date().to_string())
}
