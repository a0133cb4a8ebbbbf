use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::market_records::{TransactionRecord, TxnAction, UNKNOWN_GAME, UNKNOWN_ITEM};

const ROW_SELECTOR: &str = ".market_listing_row";
const COMBINED_DATE_SELECTOR: &str = ".market_listing_listed_date_combined";
const GAIN_OR_LOSS_SELECTOR: &str = ".market_listing_gainorloss";
const LISTED_DATE_SELECTOR: &str = ".market_listing_listed_date";
const GAME_NAME_SELECTOR: &str = ".market_listing_game_name";
const ITEM_NAME_SELECTOR: &str = ".market_listing_item_name";
const PRICE_SELECTOR: &str = ".market_listing_price";

const ACTION_DATE_SEPARATOR: char = ':';

/// Sub-field texts of one listing row. `None` means the element was absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarketRow {
    pub row_id: String,
    pub combined_action_date: Option<String>,
    pub gain_or_loss: Option<String>,
    pub listed_date: Option<String>,
    pub game_name: Option<String>,
    pub item_name: Option<String>,
    pub price: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedRow {
    pub row_id: String,
    pub record: TransactionRecord,
}

fn ws_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("invalid ws regex"))
}

fn row_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse(ROW_SELECTOR).expect("invalid row selector"))
}

fn field_selectors() -> &'static [Selector; 6] {
    static SELS: OnceLock<[Selector; 6]> = OnceLock::new();
    SELS.get_or_init(|| {
        [
            COMBINED_DATE_SELECTOR,
            GAIN_OR_LOSS_SELECTOR,
            LISTED_DATE_SELECTOR,
            GAME_NAME_SELECTOR,
            ITEM_NAME_SELECTOR,
            PRICE_SELECTOR,
        ]
        .map(|css| Selector::parse(css).expect("invalid market history field selector"))
    })
}

pub(crate) fn trim_text(s: &str) -> String {
    ws_re().replace_all(s.trim(), " ").trim().to_string()
}

fn first_text(row: &ElementRef, sel: &Selector) -> Option<String> {
    row.select(sel)
        .next()
        .map(|el| trim_text(&el.text().collect::<Vec<_>>().join(" ")))
}

/// Pulls every `.market_listing_row` out of a saved market history page, newest first.
pub fn extract_market_rows(html: &str) -> Vec<MarketRow> {
    let doc = Html::parse_document(html);
    let [combined, gain_or_loss, listed_date, game, item, price] = field_selectors();
    doc.select(row_selector())
        .map(|row| MarketRow {
            row_id: row.value().attr("id").unwrap_or_default().trim().to_string(),
            combined_action_date: first_text(&row, combined),
            gain_or_loss: first_text(&row, gain_or_loss),
            listed_date: first_text(&row, listed_date),
            game_name: first_text(&row, game),
            item_name: first_text(&row, item),
            price: first_text(&row, price),
        })
        .collect()
}

fn is_history_page(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.eq_ignore_ascii_case("html") || s.eq_ignore_ascii_case("htm"))
        .unwrap_or(false)
}

/// Resolves a page file or a directory of saved pages into a sorted file list.
pub fn collect_history_pages(input_path: &Path) -> Result<Vec<PathBuf>, String> {
    if !input_path.exists() {
        return Err(format!("path not found: {}", input_path.to_string_lossy()));
    }
    if input_path.is_file() {
        if !is_history_page(input_path) {
            return Err("only .html/.htm pages or directories containing them are supported".to_string());
        }
        return Ok(vec![input_path.to_path_buf()]);
    }
    if !input_path.is_dir() {
        return Err(format!(
            "unsupported path type: {}",
            input_path.to_string_lossy()
        ));
    }

    let mut files = WalkDir::new(input_path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| is_history_page(p))
        .collect::<Vec<_>>();
    files.sort();
    if files.is_empty() {
        return Err("no .html pages found to scrape".to_string());
    }
    Ok(files)
}

fn split_action_date(combined: &str) -> Option<(TxnAction, String)> {
    let (action, date) = combined.split_once(ACTION_DATE_SEPARATOR)?;
    Some((TxnAction::from_label(action), date.trim().to_string()))
}

fn infer_action_from_gain_or_loss(indicator: &str) -> TxnAction {
    if indicator.contains('+') {
        TxnAction::Sold
    } else if indicator.contains('-') {
        TxnAction::Purchased
    } else {
        TxnAction::Listed
    }
}

/// An empty `row_id` is not an error; the record is kept and later left unenriched.
pub fn extract_record(row: &MarketRow) -> Result<TransactionRecord, String> {
    let combined = row.combined_action_date.as_deref().unwrap_or("");
    let (action, date) = match split_action_date(combined) {
        Some(parts) => parts,
        None => {
            let indicator = row
                .gain_or_loss
                .as_deref()
                .ok_or_else(|| "gain/loss indicator missing".to_string())?;
            let date = row.listed_date.clone().unwrap_or_default();
            (infer_action_from_gain_or_loss(indicator), date)
        }
    };

    Ok(TransactionRecord {
        date,
        action,
        game: row
            .game_name
            .clone()
            .unwrap_or_else(|| UNKNOWN_GAME.to_string()),
        item: row
            .item_name
            .clone()
            .unwrap_or_else(|| UNKNOWN_ITEM.to_string()),
        price: row.price.clone().unwrap_or_default(),
    })
}

/// Extracts every parsable row, keeping input order. Bad rows are logged and skipped.
pub fn extract_records(rows: &[MarketRow]) -> Vec<ExtractedRow> {
    debug!(rows = rows.len(), "extracting market history rows");
    let mut out = Vec::with_capacity(rows.len());
    for (idx, row) in rows.iter().enumerate() {
        match extract_record(row) {
            Ok(record) => out.push(ExtractedRow {
                row_id: row.row_id.clone(),
                record,
            }),
            Err(err) => {
                warn!(row_index = idx, row_id = %row.row_id, "skipping market row: {err}");
            }
        }
    }
    out
}
