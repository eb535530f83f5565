use async_trait::async_trait;

use crate::error::Result;

#[cfg(test)]
pub(crate) mod fake;
/// 多代號並行抓取與解析
pub mod pipeline;
/// 雅虎財經
pub mod yahoo;

/// 報價頁來源
///
/// `TickerPipeline` 只透過這個介面取得 HTML，測試時可換成假的來源。
#[async_trait]
pub trait QuotePage: Send + Sync {
    /// 取得代號的報價頁 HTML；查無代號、非 200 或連線失敗皆回傳 Err
    async fn fetch(&self, ticker: &str) -> Result<String>;

    /// 共用連線是否已釋放
    fn is_closed(&self) -> bool {
        false
    }

    /// 釋放共用連線，只有第一次呼叫會回傳 true
    fn close(&self) -> bool {
        false
    }
}
