use tracing::info;

use crate::market_records::{SyncResponse, SyncTransaction, TransactionRecord};
use crate::record_merge::merge_incoming;
use crate::record_store::RecordStore;

/// Writes the merged block in one append; an empty list touches nothing.
pub fn append_new_records<S: RecordStore + ?Sized>(
    store: &mut S,
    new_records: &[TransactionRecord],
) -> Result<usize, String> {
    if new_records.is_empty() {
        return Ok(0);
    }
    store.append(new_records)
}

pub fn decode_sync_body(body: &str) -> Result<Vec<TransactionRecord>, String> {
    if body.trim().is_empty() {
        return Err("empty sync request body".to_string());
    }
    let txns: Vec<SyncTransaction> =
        serde_json::from_str(body).map_err(|e| format!("invalid sync request: {e}"))?;
    Ok(txns.into_iter().map(TransactionRecord::from).collect())
}

/// Merges a newest-first batch into `store` and reports how many rows were added.
pub fn handle_sync_batch<S: RecordStore + ?Sized>(
    store: &mut S,
    batch_newest_first: Vec<TransactionRecord>,
) -> Result<SyncResponse, String> {
    let received = batch_newest_first.len();
    if received == 0 {
        info!(received, added = 0, "sync batch empty");
        return Ok(SyncResponse::success(0));
    }

    let existing = store
        .read_all()
        .map_err(|e| format!("read store failed: {e}"))?;
    let outcome = merge_incoming(&existing, batch_newest_first);
    let written = append_new_records(store, &outcome.new_records)
        .map_err(|e| format!("append to store failed: {e}"))?;

    info!(received, existing = existing.len(), added = written, "sync batch merged");
    Ok(SyncResponse::success(written))
}

pub fn handle_sync_body<S: RecordStore + ?Sized>(
    store: &mut S,
    body: &str,
) -> Result<SyncResponse, String> {
    let batch = decode_sync_body(body)?;
    handle_sync_batch(store, batch)
}
