//! # Yahoo 財經採集模組
//!
//! 從 Yahoo 財經的報價頁抓取最新成交價、漲跌與摘要表。
//!
//! - **抓取 (`Yahoo`)**：以共用的 [`Session`] 送出 GET，並判斷是否被轉址到查詢頁。
//! - **解析 (`quote`)**：純函式，以 CSS Selector 取出報價區塊與摘要表。
//!
//! 上游查無代號時不會回 404，而是回 200 並轉址到 `/lookup`，所以必須檢查最終網址。

use std::time::Instant;

use async_trait::async_trait;
use concat_string::concat_string;
use reqwest::{
    header::{self, HeaderMap, HeaderValue},
    StatusCode,
};

use crate::{
    crawler::QuotePage,
    error::{QuoteError, Result},
    util::http::{Session, LOGGER},
};

/// 報價頁解析子模組
pub mod quote;

/// 查無代號時轉址頁面路徑中的片段
const LOOKUP_SEGMENT: &str = "lookup";

/// 上游會依瀏覽器辨識回傳不同版面，以下標頭需原樣送出
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_14_6) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/74.0.3729.169 YaBrowser/19.6.0.1583 Yowser/2.5 Safari/537.36";
const ACCEPT: &str = "text/html";
const ACCEPT_LANGUAGE: &str = "en,ru;q=0.9,cs;q=0.8,la;q=0.7";
const ACCEPT_ENCODING: &str = "gzip, deflate";

/// Yahoo 財經報價頁的抓取器
pub struct Yahoo {
    base_url: String,
    session: Session,
}

impl Yahoo {
    pub fn new(base_url: &str, session: Session) -> Self {
        Yahoo {
            base_url: base_url.to_string(),
            session,
        }
    }

    fn url(&self, ticker: &str) -> String {
        concat_string!(self.base_url, ticker)
    }

    fn headers() -> HeaderMap {
        let mut headers = HeaderMap::with_capacity(4);
        headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
        headers.insert(header::ACCEPT, HeaderValue::from_static(ACCEPT));
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static(ACCEPT_LANGUAGE),
        );
        headers.insert(
            header::ACCEPT_ENCODING,
            HeaderValue::from_static(ACCEPT_ENCODING),
        );
        headers
    }
}

/// 依最終網址與狀態碼判斷回應是否為有效的報價頁
fn classify(resolved: &reqwest::Url, status: StatusCode) -> Result<()> {
    let reason = status.canonical_reason().unwrap_or_default().to_string();

    if resolved.path().contains(LOOKUP_SEGMENT) {
        return Err(QuoteError::NotFound {
            url: resolved.to_string(),
            status: status.as_u16(),
            reason,
        });
    }

    if status != StatusCode::OK {
        return Err(QuoteError::HttpStatus {
            url: resolved.to_string(),
            status: status.as_u16(),
            reason,
        });
    }

    Ok(())
}

#[async_trait]
impl QuotePage for Yahoo {
    async fn fetch(&self, ticker: &str) -> Result<String> {
        let url = self.url(ticker);
        // 已開始的批次中連線被釋放，只取消這個代號
        let client = self.session.client().map_err(|why| {
            LOGGER.warn(format!("Skip {} because {}", ticker, why));
            QuoteError::Cancelled(ticker.to_string())
        })?;
        let start = Instant::now();

        let response = client
            .get(&url)
            .headers(Self::headers())
            .send()
            .await
            .map_err(|source| QuoteError::Transport {
                url: url.clone(),
                source,
            })?;

        classify(response.url(), response.status())?;

        let text = response
            .text_with_charset("utf-8")
            .await
            .map_err(|source| QuoteError::Transport {
                url: url.clone(),
                source,
            })?;

        LOGGER.info(format!(
            "GET:{} {} bytes {} ms",
            url,
            text.len(),
            start.elapsed().as_millis()
        ));

        Ok(text)
    }

    fn is_closed(&self) -> bool {
        self.session.is_closed()
    }

    fn close(&self) -> bool {
        self.session.close()
    }
}
