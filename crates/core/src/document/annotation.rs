//! Sync annotations written into document notes.
//!
//! Each successful sync appends a line such as
//! `Synced to QuickBooks on 2026-03-01 [ref quickbooks:146]`. The bracketed
//! marker lets a later run recover the external id when the ledger write
//! after a provider success was lost.

use chrono::NaiveDate;

use crate::integration::Provider;
use crate::provider::ExternalRecordId;

/// Formats the annotation appended after a successful sync.
#[must_use]
pub fn sync_annotation(provider: Provider, date: NaiveDate, external_id: &ExternalRecordId) -> String {
    format!(
        "Synced to {} on {} [ref {}:{}]",
        provider.display_name(),
        date.format("%Y-%m-%d"),
        provider.as_str(),
        external_id
    )
}

/// Finds the most recent reference marker for `provider` in `notes`.
#[must_use]
pub fn find_reference(notes: &str, provider: Provider) -> Option<ExternalRecordId> {
    let prefix = format!("[ref {}:", provider.as_str());

    notes.rmatch_indices(prefix.as_str()).find_map(|(start, _)| {
        let rest = &notes[start + prefix.len()..];
        let end = rest.find(']')?;
        let id = rest[..end].trim();
        (!id.is_empty() && !id.contains(char::is_whitespace)).then(|| ExternalRecordId::new(id))
    })
}

/// Formats the consolidated per-provider outcome, e.g. `quickbooks: synced, xero: failed`.
#[must_use]
pub fn sync_summary<'a, I>(outcomes: I) -> String
where
    I: IntoIterator<Item = (Provider, &'a str)>,
{
    outcomes
        .into_iter()
        .map(|(provider, outcome)| format!("{provider}: {outcome}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Appends `line` to existing notes on a new line.
#[must_use]
pub fn append_line(notes: Option<&str>, line: &str) -> String {
    match notes.map(str::trim_end).filter(|n| !n.is_empty()) {
        Some(existing) => format!("{existing}\n{line}"),
        None => line.to_string(),
    }
}
