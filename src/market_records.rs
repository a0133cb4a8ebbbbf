use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

pub const STORE_HEADERS: [&str; 5] = ["date", "action", "game", "item", "price"];
pub const STORE_COLUMN_COUNT: usize = STORE_HEADERS.len();

pub const UNKNOWN_GAME: &str = "Unknown";
pub const UNKNOWN_ITEM: &str = "Unknown Item";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxnAction {
    Sold,
    Purchased,
    Listed,
    Unknown,
}

impl TxnAction {
    pub fn as_str(self) -> &'static str {
        match self {
            TxnAction::Sold => "Sold",
            TxnAction::Purchased => "Purchased",
            TxnAction::Listed => "Listed",
            TxnAction::Unknown => "Unknown",
        }
    }

    /// Unrecognised labels collapse to `Unknown`.
    pub fn from_label(raw: &str) -> Self {
        let label = raw.trim();
        if label.eq_ignore_ascii_case("sold") {
            TxnAction::Sold
        } else if label.eq_ignore_ascii_case("purchased") {
            TxnAction::Purchased
        } else if label.eq_ignore_ascii_case("listed") {
            TxnAction::Listed
        } else {
            TxnAction::Unknown
        }
    }
}

impl fmt::Display for TxnAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TxnAction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TxnAction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(TxnAction::from_label(&raw))
    }
}

/// One market history entry. `game` is the listing's category column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub date: String,
    pub action: TxnAction,
    pub game: String,
    pub item: String,
    pub price: String,
}

impl TransactionRecord {
    pub fn to_row(&self) -> [String; STORE_COLUMN_COUNT] {
        [
            self.date.clone(),
            self.action.as_str().to_string(),
            self.game.clone(),
            self.item.clone(),
            self.price.clone(),
        ]
    }

    pub fn from_row(cells: &[String]) -> Result<Self, String> {
        if cells.len() != STORE_COLUMN_COUNT {
            return Err(format!(
                "expected {STORE_COLUMN_COUNT} columns, found {}",
                cells.len()
            ));
        }
        Ok(Self {
            date: cells[0].clone(),
            action: TxnAction::from_label(&cells[1]),
            game: cells[2].clone(),
            item: cells[3].clone(),
            price: cells[4].clone(),
        })
    }
}

/// Wire shape of one entry in a sync request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTransaction {
    pub date: String,
    pub action: String,
    pub game: String,
    pub item: String,
    pub price: String,
}

impl From<&TransactionRecord> for SyncTransaction {
    fn from(rec: &TransactionRecord) -> Self {
        Self {
            date: rec.date.clone(),
            action: rec.action.as_str().to_string(),
            game: rec.game.clone(),
            item: rec.item.clone(),
            price: rec.price.clone(),
        }
    }
}

impl From<SyncTransaction> for TransactionRecord {
    fn from(txn: SyncTransaction) -> Self {
        Self {
            date: txn.date,
            action: TxnAction::from_label(&txn.action),
            game: txn.game,
            item: txn.item,
            price: txn.price,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResponse {
    pub result: String,
    pub added: u64,
}

impl SyncResponse {
    pub fn success(added: usize) -> Self {
        Self {
            result: "success".to_string(),
            added: u64::try_from(added).unwrap_or(u64::MAX),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result == "success"
    }
}
