use hashbrown::HashMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::QuoteError;

/// 最新成交價及相對前一交易日收盤的漲跌
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct PriceQuote {
    /// 成交價，不會小於 0
    pub price: f64,
    /// 漲跌
    pub change_absolute: f64,
    /// 漲跌幅，單位為百分比 (1.5 代表 1.5%)
    pub change_percent: f64,
}

/// 摘要表：欄位名稱 => 原始文字，欄位由來源網頁決定
pub type SummaryTable = HashMap<String, String>;

/// 單一代號一次抓取/解析的結果
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct QuoteRecord {
    pub ticker: String,
    pub last_price: PriceQuote,
    pub last_summary: SummaryTable,
}

/// 單一代號的結果，失敗時保留原因供 log 及呼叫端判斷
pub type TickerOutcome = Result<QuoteRecord, QuoteError>;

/// One or many symbols handed to the pipeline.
///
/// A bare symbol is normalised into a one element batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tickers {
    One(String),
    Many(Vec<String>),
}

impl Tickers {
    pub fn is_single(&self) -> bool {
        matches!(self, Tickers::One(_))
    }

    pub fn into_vec(self) -> Vec<String> {
        match self {
            Tickers::One(ticker) => vec![ticker],
            Tickers::Many(tickers) => tickers,
        }
    }
}

impl From<&str> for Tickers {
    fn from(ticker: &str) -> Self {
        Tickers::One(ticker.to_string())
    }
}

impl From<Vec<String>> for Tickers {
    fn from(tickers: Vec<String>) -> Self {
        Tickers::Many(tickers)
    }
}

impl From<Vec<&str>> for Tickers {
    fn from(tickers: Vec<&str>) -> Self {
        Tickers::Many(tickers.into_iter().map(String::from).collect())
    }
}

/// 一次批次查詢的結果，順序與輸入的代號一致
#[derive(Debug)]
pub struct BatchResult {
    outcomes: Vec<TickerOutcome>,
}

impl BatchResult {
    pub fn new(outcomes: Vec<TickerOutcome>) -> Self {
        BatchResult { outcomes }
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn outcomes(&self) -> &[TickerOutcome] {
        &self.outcomes
    }

    /// Successful record at `index`, `None` when that ticker failed.
    pub fn get(&self, index: usize) -> Option<&QuoteRecord> {
        self.outcomes.get(index).and_then(|o| o.as_ref().ok())
    }

    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_err()).count()
    }

    pub fn into_records(self) -> Vec<Option<QuoteRecord>> {
        self.outcomes.into_iter().map(Result::ok).collect()
    }
}

/// 失敗的欄位輸出為 `null`，維持與輸入相同的索引
impl Serialize for BatchResult {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(self.outcomes.iter().map(|o| o.as_ref().ok()))
    }
}
