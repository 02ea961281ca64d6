//! Log setup and helpers for logging request and response bodies.

use std::borrow::Cow;

use serde_json::Value;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Bodies longer than this are truncated at `debug` and logged in full at `trace`.
pub(crate) const LOG_BODY_LENGTH_LIMIT: usize = 64;

const REDACTED: &str = "********";

/// Install the global `tracing` subscriber.
///
/// `verbosity` counts `-v` flags: 0 logs warnings and errors, 1 adds info,
/// 2 adds debug and anything above that logs everything. The `RUST_LOG`
/// environment variable takes precedence when it is set.
pub fn setup_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "budgeteur_client={default_level},budgeteur={default_level}"
        ))
    });

    let stderr_log = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbosity > 1);

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_log)
        .init();
}

/// The fields whose values never make it into a log.
const PASSWORD_FIELDS: [&str; 2] = ["password", "confirm_password"];

/// Replace the values of the `password` and `confirm_password` fields in a
/// JSON or URL encoded form body with asterisks.
pub fn redact_password(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        return redact_json(&json).to_string();
    }

    let mut redacted = body.to_owned();
    for field_name in PASSWORD_FIELDS {
        redacted = redact_form_field(&redacted, field_name).into_owned();
    }

    redacted
}

/// A copy of `value` with the password fields of every object, at any depth,
/// replaced by asterisks.
pub(crate) fn redact_json(value: &Value) -> Value {
    match value {
        Value::Object(object) => Value::Object(
            object
                .iter()
                .map(|(key, value)| {
                    let value = if PASSWORD_FIELDS.contains(&key.as_str()) {
                        Value::String(REDACTED.to_owned())
                    } else {
                        redact_json(value)
                    };

                    (key.clone(), value)
                })
                .collect(),
        ),
        Value::Array(values) => Value::Array(values.iter().map(redact_json).collect()),
        other => other.clone(),
    }
}

fn redact_form_field<'a>(form_text: &'a str, field_name: &str) -> Cow<'a, str> {
    let prefix = format!("{field_name}=");

    let redacted: Vec<Cow<str>> = form_text
        .split('&')
        .map(|pair| {
            if pair.starts_with(&prefix) {
                Cow::Owned(format!("{prefix}{REDACTED}"))
            } else {
                Cow::Borrowed(pair)
            }
        })
        .collect();

    if redacted.iter().all(|pair| matches!(pair, Cow::Borrowed(_))) {
        return Cow::Borrowed(form_text);
    }

    Cow::Owned(redacted.join("&"))
}

/// Log a body at `debug`, truncated to [LOG_BODY_LENGTH_LIMIT] bytes, and in full at `trace`.
pub(crate) fn log_body(label: &str, body: &str) {
    if body.len() > LOG_BODY_LENGTH_LIMIT {
        let mut end = LOG_BODY_LENGTH_LIMIT;
        while !body.is_char_boundary(end) {
            end -= 1;
        }

        tracing::debug!("{label}: {}...", &body[..end]);
        tracing::trace!("full {label}: {body:?}");
    } else {
        tracing::debug!("{label}: {body:?}");
    }
}
