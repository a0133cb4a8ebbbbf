pub mod app_config;
pub mod asset_catalog;
pub mod commands;
pub mod csv_store;
pub mod history_extract;
pub mod item_enrich;
pub mod ledger_db;
pub mod market_records;
pub mod record_merge;
pub mod record_store;
pub mod sync_client;
pub mod sync_handler;

pub use app_config::{AppConfig, ConfigOverrides, StoreKind};
pub use market_records::{SyncResponse, SyncTransaction, TransactionRecord, TxnAction};
pub use record_merge::{merge_incoming, record_signature, MergeOutcome};
pub use record_store::{MemoryRecordStore, RecordStore};
pub use sync_handler::{handle_sync_batch, handle_sync_body};
