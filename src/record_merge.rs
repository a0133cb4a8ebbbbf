use std::collections::HashSet;

use crate::market_records::TransactionRecord;

pub const SIGNATURE_SEPARATOR: &str = "|";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Novel records, oldest first.
    pub new_records: Vec<TransactionRecord>,
    pub added: usize,
}

/// Dedup key: date, action, item and price. `game` is not part of it, so two
/// records that differ only by game collide.
pub fn record_signature(rec: &TransactionRecord) -> String {
    [
        rec.date.as_str(),
        rec.action.as_str(),
        rec.item.as_str(),
        rec.price.as_str(),
    ]
    .join(SIGNATURE_SEPARATOR)
}

pub fn signature_set<'a, I>(records: I) -> HashSet<String>
where
    I: IntoIterator<Item = &'a TransactionRecord>,
{
    records.into_iter().map(record_signature).collect()
}

/// Reconciles a newest-first batch against the store's records.
pub fn merge_incoming(
    existing: &[TransactionRecord],
    incoming_newest_first: Vec<TransactionRecord>,
) -> MergeOutcome {
    if incoming_newest_first.is_empty() {
        return MergeOutcome::default();
    }
    let mut seen = signature_set(existing);
    merge_with_signatures(&mut seen, incoming_newest_first)
}

/// Same as [`merge_incoming`], but against a prepared signature set that is
/// extended with every accepted record.
pub fn merge_with_signatures(
    seen: &mut HashSet<String>,
    incoming_newest_first: Vec<TransactionRecord>,
) -> MergeOutcome {
    let mut new_records = Vec::new();
    for rec in incoming_newest_first.into_iter().rev() {
        if seen.insert(record_signature(&rec)) {
            new_records.push(rec);
        }
    }
    let added = new_records.len();
    MergeOutcome { new_records, added }
}
