use serde::Serialize;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::app_config::{AppConfig, StoreKind};
use crate::asset_catalog::AssetCatalog;
use crate::csv_store::CsvRecordStore;
use crate::history_extract::{collect_history_pages, extract_market_rows, extract_records};
use crate::item_enrich::enrich_rows;
use crate::ledger_db::{apply_embedded_migrations, inspect_status_at_path, SqliteRecordStore};
use crate::market_records::{SyncTransaction, TransactionRecord};
use crate::record_store::RecordStore;
use crate::sync_client::SyncClient;
use crate::sync_handler::handle_sync_body;

const MAX_FAILED_PAGE_SAMPLES: usize = 20;

#[derive(Debug, Clone, Serialize)]
pub struct FailedPage {
    pub page: String,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct ScrapeSummary {
    pub pages_count: usize,
    pub rows_seen: usize,
    pub failed_pages_count: usize,
    pub failed_pages: Vec<FailedPage>,
    /// Newest first, as listed on the page.
    pub records: Vec<TransactionRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct PageBatch {
    pub rows_seen: usize,
    pub records: Vec<TransactionRecord>,
}

/// Rows → records → enriched records for one saved market history page.
pub fn build_batch_from_html(html: &str) -> Result<PageBatch, String> {
    let rows = extract_market_rows(html);
    let catalog = AssetCatalog::from_page_html(html)?;
    let extracted = extract_records(&rows);
    Ok(PageBatch {
        rows_seen: rows.len(),
        records: enrich_rows(extracted, &catalog),
    })
}

pub fn scrape_pages_at_path(source_path: &Path) -> Result<ScrapeSummary, String> {
    let pages = collect_history_pages(source_path)?;
    let mut summary = ScrapeSummary {
        pages_count: pages.len(),
        ..ScrapeSummary::default()
    };

    for page in &pages {
        let result = fs::read_to_string(page)
            .map_err(|e| format!("read page failed: {e}"))
            .and_then(|html| build_batch_from_html(&html));
        match result {
            Ok(mut batch) => {
                summary.rows_seen += batch.rows_seen;
                summary.records.append(&mut batch.records);
            }
            Err(err) => {
                warn!(page = %page.display(), "page skipped: {err}");
                summary.failed_pages_count += 1;
                if summary.failed_pages.len() < MAX_FAILED_PAGE_SAMPLES {
                    summary.failed_pages.push(FailedPage {
                        page: page.to_string_lossy().to_string(),
                        error: err,
                    });
                }
            }
        }
    }

    if summary.records.is_empty() {
        let details = summary
            .failed_pages
            .iter()
            .map(|f| format!("{}: {}", f.page, f.error))
            .collect::<Vec<_>>()
            .join("; ");
        return Err(if details.is_empty() {
            "no market history rows found; save the page with 'My Market History' open".to_string()
        } else {
            format!("no market history rows found. {details}")
        });
    }
    info!(
        pages = summary.pages_count,
        rows = summary.rows_seen,
        records = summary.records.len(),
        "scraped market history"
    );
    Ok(summary)
}

fn wire_batch(records: &[TransactionRecord]) -> Vec<SyncTransaction> {
    records.iter().map(SyncTransaction::from).collect()
}

fn scrape_summary_to_json(source_path: &Path, summary: &ScrapeSummary) -> Value {
    json!({
        "source_path": source_path.to_string_lossy().to_string(),
        "pages_count": summary.pages_count,
        "rows_seen": summary.rows_seen,
        "records_count": summary.records.len(),
        "skipped_rows_count": summary.rows_seen.saturating_sub(summary.records.len()),
        "failed_pages_count": summary.failed_pages_count,
        "failed_pages": summary.failed_pages,
    })
}

pub fn scrape_command(source_path: &Path) -> Result<Value, String> {
    let summary = scrape_pages_at_path(source_path)?;
    Ok(json!({
        "summary": scrape_summary_to_json(source_path, &summary),
        "records": wire_batch(&summary.records),
    }))
}

pub fn open_store(cfg: &AppConfig) -> Result<Box<dyn RecordStore>, String> {
    match cfg.store_kind {
        StoreKind::Sqlite => Ok(Box::new(SqliteRecordStore::open(&cfg.store_path)?)),
        StoreKind::Csv => Ok(Box::new(CsvRecordStore::new(&cfg.store_path))),
    }
}

/// Applies one sync request body to the configured store.
pub fn apply_command(cfg: &AppConfig, body: &str) -> Result<Value, String> {
    let mut store = open_store(cfg)?;
    let resp = handle_sync_body(&mut store, body)?;
    serde_json::to_value(resp).map_err(|e| format!("serialize sync response failed: {e}"))
}

pub async fn push_command(cfg: &AppConfig, source_path: &Path) -> Result<Value, String> {
    let url = cfg.require_webhook_url()?;
    let summary = scrape_pages_at_path(source_path)?;
    let client = SyncClient::new(url, cfg.request_timeout, cfg.retry.clone())
        .map_err(|e| e.to_string())?;
    let batch = wire_batch(&summary.records);
    info!(sending = batch.len(), "syncing market history");
    let resp = client
        .deliver(&batch)
        .await
        .map_err(|e| format!("sync delivery failed: {e}"))?;
    Ok(json!({
        "summary": scrape_summary_to_json(source_path, &summary),
        "sent": batch.len(),
        "response": resp,
    }))
}

pub fn status_command(cfg: &AppConfig) -> Result<Value, String> {
    match cfg.store_kind {
        StoreKind::Sqlite => {
            let status = inspect_status_at_path(&cfg.store_path)?;
            let mut value = serde_json::to_value(status)
                .map_err(|e| format!("serialize store status failed: {e}"))?;
            value["store_kind"] = json!("sqlite");
            Ok(value)
        }
        StoreKind::Csv => {
            let store = CsvRecordStore::new(&cfg.store_path);
            let records = store.read_all()?;
            Ok(json!({
                "store_kind": "csv",
                "store_path": cfg.store_path.to_string_lossy().to_string(),
                "exists": cfg.store_path.exists(),
                "ready": true,
                "record_count": records.len(),
            }))
        }
    }
}

pub fn migrate_command(cfg: &AppConfig) -> Result<Value, String> {
    if cfg.store_kind != StoreKind::Sqlite {
        return Err("migrate only applies to the sqlite store".to_string());
    }
    let result = apply_embedded_migrations(&cfg.store_path)?;
    serde_json::to_value(result).map_err(|e| format!("serialize migrate result failed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_records::TxnAction;
    use crate::sync_client::RetryPolicy;
    use std::path::PathBuf;
    use std::time::Duration;
    use uuid::Uuid;

    const PAGE: &str = r#"<html><head><script>
var g_rgAssets = {"440":{"2":{"1001":{"descriptions":[
  {"value":"Killstreaker: Fire Horns"},{"value":"Sheen: Team Shine"}]}}},"730":[]};
</script></head><body>
<div class="market_listing_row" id="history_row_4135_1001_mylisting_1">
  <div class="market_listing_listed_date_combined">Sold: 1 Jan</div>
  <span class="market_listing_item_name">Professional Killstreak Scattergun</span>
  <span class="market_listing_game_name">Team Fortress 2</span>
  <span class="market_listing_price">$25.00</span>
</div>
<div class="market_listing_row" id="history_row_4134_1002_mylisting_2">
  <div class="market_listing_listed_date_combined">Purchased: 31 Dec</div>
  <span class="market_listing_item_name">Mann Co. Supply Crate Key</span>
  <span class="market_listing_game_name">Team Fortress 2</span>
  <span class="market_listing_price">$2.49</span>
</div>
<div class="market_listing_row" id="history_row_4133_1003_mylisting_3">
  <span class="market_listing_item_name">Broken row</span>
</div>
</body></html>"#;

    fn create_temp_path(prefix: &str, ext: &str) -> PathBuf {
        let unique = format!("{prefix}_{}_{}.{}", std::process::id(), Uuid::new_v4(), ext);
        std::env::temp_dir().join(unique)
    }

    fn config_for(store_path: &Path, store_kind: StoreKind) -> AppConfig {
        AppConfig {
            webhook_url: None,
            store_path: store_path.to_path_buf(),
            store_kind,
            request_timeout: Duration::from_secs(1),
            retry: RetryPolicy::default(),
        }
    }

    #[test]
    fn page_batch_is_extracted_and_enriched() {
        let batch = build_batch_from_html(PAGE).expect("build batch");
        assert_eq!(batch.rows_seen, 3);
        assert_eq!(batch.records.len(), 2, "broken row is skipped");
        assert_eq!(
            batch.records[0].item,
            "Professional Killstreak Scattergun [Kr: Fire Horns, Sn: Team Shine]"
        );
        assert_eq!(batch.records[0].action, TxnAction::Sold);
        assert_eq!(batch.records[1].item, "Mann Co. Supply Crate Key");
    }

    #[test]
    fn asset_null_check_does_not_drop_page_rows() {
        let page = PAGE.replace(
            "<script>",
            "<script>if (g_rgAssets == null) { console.log('assets pending'); }</script><script>",
        );
        let batch = build_batch_from_html(&page).expect("build batch");
        assert_eq!(batch.records.len(), 2);
        assert_eq!(
            batch.records[0].item,
            "Professional Killstreak Scattergun [Kr: Fire Horns, Sn: Team Shine]"
        );
    }

    #[test]
    fn scraped_page_applies_idempotently_to_csv_store() {
        let page_path = create_temp_path("market_sync_page", "html");
        let store_path = create_temp_path("market_sync_apply", "csv");
        fs::write(&page_path, PAGE).expect("write page");

        let scraped = scrape_command(&page_path).expect("scrape page");
        assert_eq!(
            scraped["summary"]["skipped_rows_count"].as_u64(),
            Some(1)
        );
        let body = serde_json::to_string(&scraped["records"]).expect("request body");

        let cfg = config_for(&store_path, StoreKind::Csv);
        let first = apply_command(&cfg, &body).expect("first apply");
        let second = apply_command(&cfg, &body).expect("second apply");
        assert_eq!(first["added"].as_u64(), Some(2));
        assert_eq!(second["added"].as_u64(), Some(0));

        let rows = CsvRecordStore::new(&store_path).read_all().expect("read store");
        assert_eq!(rows[0].date, "31 Dec", "oldest row lands first");
        assert_eq!(rows[1].date, "1 Jan");

        let status = status_command(&cfg).expect("csv status");
        assert_eq!(status["record_count"].as_u64(), Some(2));

        let _ = fs::remove_file(&page_path);
        let _ = fs::remove_file(&store_path);
    }

    #[test]
    fn sqlite_status_and_migrate_commands() {
        let db_path = create_temp_path("market_sync_cmd", "db");
        let cfg = config_for(&db_path, StoreKind::Sqlite);

        let before = status_command(&cfg).expect("status before");
        assert_eq!(before["ready"].as_bool(), Some(false));
        let migrated = migrate_command(&cfg).expect("migrate");
        assert_eq!(migrated["pending_total"].as_u64(), Some(0));
        let after = status_command(&cfg).expect("status after");
        assert_eq!(after["ready"].as_bool(), Some(true));
        assert_eq!(after["store_kind"].as_str(), Some("sqlite"));

        let csv_cfg = config_for(&db_path, StoreKind::Csv);
        assert!(migrate_command(&csv_cfg).is_err());

        let _ = fs::remove_file(&db_path);
    }

    #[test]
    fn page_without_rows_is_an_error() {
        let page_path = create_temp_path("market_sync_empty_page", "html");
        fs::write(&page_path, "<html><body>Sign in</body></html>").expect("write page");
        let err = scrape_pages_at_path(&page_path).expect_err("no rows");
        assert!(err.contains("no market history rows"), "unexpected error: {err}");
        let _ = fs::remove_file(&page_path);
    }

    #[tokio::test]
    async fn push_requires_webhook_url() {
        let cfg = config_for(Path::new("unused.db"), StoreKind::Sqlite);
        let err = push_command(&cfg, Path::new("missing.html"))
            .await
            .expect_err("missing url");
        assert!(err.contains("webhook url is required"), "unexpected error: {err}");
    }
}
