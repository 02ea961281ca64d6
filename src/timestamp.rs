//! Serde helpers for the timestamps the server assigns to records.
//!
//! The API sends either RFC 3339 ("2024-01-15T10:30:00Z") or a space separated
//! UTC form ("2024-01-15 10:30:00.123Z"). Both are accepted, and timestamps are
//! always written back as RFC 3339.

use serde::{Deserialize, Deserializer, Serializer, de::Error as _};
use time::{
    OffsetDateTime, PrimitiveDateTime,
    format_description::{BorrowedFormatItem, well_known::Rfc3339},
    macros::format_description,
};

/// Space separated date time with fractional seconds, e.g. "2024-01-15 10:30:00.123Z".
const SPACED_WITH_SUBSECOND: &[BorrowedFormatItem] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]Z");

/// Space separated date time without fractional seconds, e.g. "2024-01-15 10:30:00Z".
const SPACED: &[BorrowedFormatItem] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]Z");

/// Parse a server timestamp in either of the accepted formats.
pub(crate) fn parse(text: &str) -> Result<OffsetDateTime, time::error::Parse> {
    let text = text.trim();

    OffsetDateTime::parse(text, &Rfc3339).or_else(|rfc3339_error| {
        PrimitiveDateTime::parse(text, SPACED_WITH_SUBSECOND)
            .or_else(|_| PrimitiveDateTime::parse(text, SPACED))
            .map(PrimitiveDateTime::assume_utc)
            .map_err(|_| rfc3339_error)
    })
}

pub(crate) fn serialize<S: Serializer>(
    timestamp: &OffsetDateTime,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let text = timestamp
        .format(&Rfc3339)
        .map_err(serde::ser::Error::custom)?;

    serializer.serialize_str(&text)
}

pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<OffsetDateTime, D::Error> {
    let text = String::deserialize(deserializer)?;

    parse(&text).map_err(|error| D::Error::custom(format!("invalid timestamp {text:?}: {error}")))
}
