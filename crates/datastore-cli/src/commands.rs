// Subcommand handlers.
//
// Both commands go through a `DatastoreCard` so the CLI follows the same
// edit / confirm-delete flow as the dashboard tile.

use std::future::Future;
use std::io::{BufRead, Write};
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use datastore_client::{
    CardCommand, CardEvent, DatastoreCard, Format, SubmissionOutcome, Transport, ValueSubmitter,
};
use serde_json::Value;
use tracing::info;

/// Parse `raw` under `format` and write it to datastore `name`.
pub async fn set<T: Transport>(
    submitter: &ValueSubmitter<T>,
    name: &str,
    raw: &str,
    format: &str,
) -> anyhow::Result<SubmissionOutcome> {
    let format = Format::from_tag(format);
    let value = format
        .parse_value(raw)
        .with_context(|| format!("cannot use `{raw}` as a {format} value"))?;

    let mut card = DatastoreCard::new(name, format.tag(), Value::Null, Utc::now())
        .context("invalid datastore")?;

    match card.handle(CardEvent::ValueEdited(value), Utc::now()) {
        Some(CardCommand::Submit(request)) => {
            Ok(with_deadline(submitter.config().timeout, submitter.submit(&request)).await)
        }
        other => anyhow::bail!("unexpected card command for an edit: {other:?}"),
    }
}

/// Delete datastore `name`, asking on `input` unless `assume_yes`.
///
/// Returns `None` when the user declined.
pub async fn delete<T: Transport>(
    submitter: &ValueSubmitter<T>,
    name: &str,
    assume_yes: bool,
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> anyhow::Result<Option<SubmissionOutcome>> {
    // The format only matters for edits, which this card never sees.
    let mut card =
        DatastoreCard::new(name, "string", Value::Null, Utc::now()).context("invalid datastore")?;
    card.handle(CardEvent::RequestDelete, Utc::now());

    let confirmed = assume_yes || prompt_confirm(name, input, output)?;
    let event = if confirmed {
        CardEvent::ConfirmDelete
    } else {
        CardEvent::CancelDelete
    };

    match card.handle(event, Utc::now()) {
        Some(CardCommand::Delete { name }) => {
            Ok(Some(with_deadline(submitter.config().timeout, submitter.delete(&name)).await))
        }
        _ => {
            info!(name, "delete cancelled");
            Ok(None)
        }
    }
}

/// Ask `Delete datastore `name`? [y/N]`. Only `y`/`yes` confirms.
fn prompt_confirm(
    name: &str,
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> anyhow::Result<bool> {
    write!(output, "Delete datastore `{name}`? [y/N] ")?;
    output.flush()?;

    let mut answer = String::new();
    input
        .read_line(&mut answer)
        .context("failed to read confirmation")?;
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}

/// Await `fut`, turning an expired deadline into a transport error.
pub async fn with_deadline(
    timeout: Option<Duration>,
    fut: impl Future<Output = SubmissionOutcome>,
) -> SubmissionOutcome {
    let Some(limit) = timeout else {
        return fut.await;
    };
    match tokio::time::timeout(limit, fut).await {
        Ok(outcome) => outcome,
        Err(_) => SubmissionOutcome::TransportError {
            detail: format!("request timed out after {}s", limit.as_secs()),
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
