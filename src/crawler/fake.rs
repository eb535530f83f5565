//! 測試用的假報價來源與頁面樣本
use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use hashbrown::HashMap;
use scopeguard::ScopeGuard;

use crate::{
    crawler::QuotePage,
    error::{QuoteError, Result},
};

/// 版面與 Yahoo 報價頁相同的最小頁面
pub(crate) fn quote_page(price: &str, change: &str) -> String {
    format!(
        r#"<!DOCTYPE html><html><head><title>quote</title></head><body>
<div id="quote-header-info">
  <div><h1>Apple Inc. (AAPL)</h1></div>
  <div><span>NasdaqGS - NasdaqGS Real Time Price</span></div>
  <div><span>{price}</span><span>{change}</span><span>At close: 4:00PM EDT</span></div>
</div>
<div id="quote-summary"><table>
  <tr><td>Previous Close</td><td>148.75</td></tr>
  <tr><td>Market Cap</td><td>2.5T</td></tr>
  <tr><td>Beta (5Y Monthly)</td><td>1.28</td><td>extra</td></tr>
</table></div>
</body></html>"#
    )
}

enum Page {
    Html(String),
    Layout,
}

/// 依代號回傳預先設定的頁面，沒設定的代號視為查無代號
#[derive(Default)]
pub(crate) struct FakePage {
    pages: HashMap<String, (Page, Duration)>,
    closed: AtomicBool,
    fetched: AtomicUsize,
    cancelled: Arc<AtomicUsize>,
}

impl FakePage {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_quote(self, ticker: &str, price: &str, change: &str) -> Self {
        self.with_quote_after(ticker, price, change, Duration::ZERO)
    }

    /// 延遲 `delay` 後才回應，用來打亂完成順序
    pub(crate) fn with_quote_after(
        mut self,
        ticker: &str,
        price: &str,
        change: &str,
        delay: Duration,
    ) -> Self {
        self.pages.insert(
            ticker.to_string(),
            (Page::Html(quote_page(price, change)), delay),
        );
        self
    }

    /// 回傳版面不符的頁面
    pub(crate) fn with_layout_change(mut self, ticker: &str) -> Self {
        self.pages
            .insert(ticker.to_string(), (Page::Layout, Duration::ZERO));
        self
    }

    pub(crate) fn fetched(&self) -> usize {
        self.fetched.load(Ordering::SeqCst)
    }

    /// 等待中途被丟棄的 fetch 次數
    pub(crate) fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuotePage for FakePage {
    async fn fetch(&self, ticker: &str) -> Result<String> {
        if self.is_closed() {
            return Err(QuoteError::Dispatch("session is closed".to_string()));
        }

        self.fetched.fetch_add(1, Ordering::SeqCst);

        match self.pages.get(ticker) {
            Some((page, delay)) => {
                let cancelled = self.cancelled.clone();
                let pending = scopeguard::guard((), move |_| {
                    cancelled.fetch_add(1, Ordering::SeqCst);
                });
                tokio::time::sleep(*delay).await;
                ScopeGuard::into_inner(pending);

                // 等待期間連線被釋放
                if self.is_closed() {
                    return Err(QuoteError::Dispatch("session is closed".to_string()));
                }

                match page {
                    Page::Html(html) => Ok(html.clone()),
                    Page::Layout => Ok("<html><body><p>new layout</p></body></html>".to_string()),
                }
            }
            None => Err(QuoteError::NotFound {
                url: format!("https://finance.yahoo.com/lookup?s={}", ticker),
                status: 200,
                reason: "OK".to_string(),
            }),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }
}
