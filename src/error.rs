//! 報價抓取流程的錯誤分類
//!
//! `Transport`、`HttpStatus`、`NotFound`、`Structure`、`Parse`、`EmptyTicker`、`Cancelled`
//! 只影響單一代號，會在 pipeline 的單檔邊界轉成失敗的欄位；
//! `Dispatch` 代表整批請求在分派前就失敗，會直接回傳給呼叫端。
use std::fmt;

use thiserror::Error;

/// Error raised while fetching or extracting a quote page.
#[derive(Error, Debug)]
pub enum QuoteError {
    /// Connect/read timeout, refused connection or a broken body stream.
    #[error("Transport error while requesting {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The upstream answered with something other than 200.
    #[error("Unexpected status {status} {reason} from {url}")]
    HttpStatus {
        url: String,
        status: u16,
        reason: String,
    },

    /// The upstream silently redirected to its symbol lookup page.
    #[error("Symbol not found, resolved to {url} ({status} {reason})")]
    NotFound {
        url: String,
        status: u16,
        reason: String,
    },

    /// An expected DOM node is missing; the page layout changed.
    #[error("Page structure mismatch: {0}")]
    Structure(String),

    /// Text was found but is not a well-formed number.
    #[error("Failed to parse '{text}': {reason}")]
    Parse { text: String, reason: String },

    /// A blank symbol was handed to the pipeline.
    #[error("Ticker symbol is empty")]
    EmptyTicker,

    /// The per-ticker task ended without delivering a result.
    #[error("Task for {0} ended without a result")]
    Cancelled(String),

    /// The batch could not be dispatched at all.
    #[error("Failed to dispatch batch: {0}")]
    Dispatch(String),
}

/// 錯誤發生的階段，寫 log 時用來定位問題
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Extract,
    Dispatch,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fetch => "fetch",
            Stage::Extract => "extract",
            Stage::Dispatch => "dispatch",
        };
        f.write_str(name)
    }
}

impl QuoteError {
    pub fn stage(&self) -> Stage {
        match self {
            QuoteError::Transport { .. }
            | QuoteError::HttpStatus { .. }
            | QuoteError::NotFound { .. }
            | QuoteError::EmptyTicker => Stage::Fetch,
            QuoteError::Structure(_) | QuoteError::Parse { .. } | QuoteError::Cancelled(_) => {
                Stage::Extract
            }
            QuoteError::Dispatch(_) => Stage::Dispatch,
        }
    }

    /// `true` when the failure only concerns the ticker that raised it.
    pub fn is_per_ticker(&self) -> bool {
        !matches!(self, QuoteError::Dispatch(_))
    }

    /// HTTP status reported by the upstream, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            QuoteError::HttpStatus { status, .. } | QuoteError::NotFound { status, .. } => {
                Some(*status)
            }
            QuoteError::Transport { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub(crate) fn parse(text: &str, reason: impl Into<String>) -> Self {
        QuoteError::Parse {
            text: text.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = QuoteError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_of_each_kind() {
        let not_found = QuoteError::NotFound {
            url: "https://finance.yahoo.com/lookup?s=ZZZZ".to_string(),
            status: 200,
            reason: "OK".to_string(),
        };
        assert_eq!(not_found.stage(), Stage::Fetch);
        assert_eq!(not_found.status(), Some(200));
        assert!(not_found.is_per_ticker());

        let structure = QuoteError::Structure("no #quote-header-info".to_string());
        assert_eq!(structure.stage(), Stage::Extract);
        assert_eq!(structure.status(), None);

        let parse = QuoteError::parse("N/A", "invalid float literal");
        assert_eq!(parse.stage(), Stage::Extract);
        assert_eq!(parse.to_string(), "Failed to parse 'N/A': invalid float literal");

        let dispatch = QuoteError::Dispatch("session closed".to_string());
        assert_eq!(dispatch.stage(), Stage::Dispatch);
        assert!(!dispatch.is_per_ticker());
        assert_eq!(Stage::Dispatch.to_string(), "dispatch");
    }
}
