use std::sync::Arc;

use anyhow::{anyhow, Result as AnyResult};
use futures::future::join_all;
use once_cell::sync::Lazy;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tokio::sync::oneshot;

use crate::{
    config,
    crawler::{yahoo::quote, QuotePage},
    declare::{BatchResult, PriceQuote, QuoteRecord, SummaryTable, TickerOutcome, Tickers},
    error::{QuoteError, Result},
    logging::Logger,
};

static LOGGER: Lazy<Logger> = Lazy::new(|| Logger::new("pipeline"));

/// Fans a batch of tickers out to fetch and extract, one independent task per ticker.
///
/// Network waits are multiplexed on the async runtime while HTML parsing runs
/// on a bounded `rayon` pool. A failing ticker only fails its own slot.
pub struct TickerPipeline {
    source: Arc<dyn QuotePage>,
    workers: Arc<ThreadPool>,
    max_batch_size: usize,
}

impl TickerPipeline {
    pub fn new(source: Arc<dyn QuotePage>, settings: &config::Pipeline) -> AnyResult<Self> {
        let workers = ThreadPoolBuilder::new()
            .num_threads(settings.parse_workers.max(1))
            .thread_name(|i| format!("quote-parse-{}", i))
            .build()
            .map_err(|why| anyhow!("Failed to build the parse pool: {:?}", why))?;

        Ok(TickerPipeline {
            source,
            workers: Arc::new(workers),
            max_batch_size: settings.max_batch_size.max(1),
        })
    }

    /// 查詢一批代號，結果順序與輸入一致
    ///
    /// 單一代號的任何失敗只會讓該欄位失敗；只有無法分派整批時才回傳 `Err(QuoteError::Dispatch)`。
    /// 呼叫端放棄這個 future 時，尚未完成的代號會一併取消。
    pub async fn load_batch(&self, tickers: impl Into<Tickers>) -> Result<BatchResult> {
        let tickers = tickers.into().into_vec();

        if self.source.is_closed() {
            return Err(self.dispatch_failed("the session is closed".to_string()));
        }

        if tickers.len() > self.max_batch_size {
            return Err(self.dispatch_failed(format!(
                "{} tickers exceed the batch limit of {}",
                tickers.len(),
                self.max_batch_size
            )));
        }

        let tasks = tickers.iter().map(|ticker| self.load_one(ticker));
        let outcomes = join_all(tasks).await;
        let batch = BatchResult::new(outcomes);

        LOGGER.info(format!(
            "Loaded {} tickers, {} failed",
            batch.len(),
            batch.failures()
        ));

        Ok(batch)
    }

    /// 單一代號的邊界：失敗在此寫 log 並回傳給批次
    async fn load_one(&self, ticker: &str) -> TickerOutcome {
        let outcome = match self.fetch_and_extract(ticker).await {
            // 批次進行中連線被釋放時，來源可能回報整批層級的錯誤；欄位內一律視為取消
            Err(why) if !why.is_per_ticker() => {
                LOGGER.warn(format!("Cancel {} because {:?}", ticker, why));
                Err(QuoteError::Cancelled(ticker.to_string()))
            }
            outcome => outcome,
        };

        if let Err(why) = &outcome {
            LOGGER.error(format!(
                "Failed to load {} at the {} stage (status {:?}) because {:?}",
                ticker,
                why.stage(),
                why.status(),
                why
            ));
        }

        outcome
    }

    async fn fetch_and_extract(&self, ticker: &str) -> TickerOutcome {
        if ticker.trim().is_empty() {
            return Err(QuoteError::EmptyTicker);
        }

        let html = self.source.fetch(ticker).await?;
        let (last_price, last_summary) = self.extract(ticker, html).await?;

        Ok(QuoteRecord {
            ticker: ticker.to_string(),
            last_price,
            last_summary,
        })
    }

    /// 在解析 pool 上建構 DOM，不佔用 async runtime 的線程
    async fn extract(&self, ticker: &str, html: String) -> Result<(PriceQuote, SummaryTable)> {
        let (tx, rx) = oneshot::channel();

        self.workers.spawn(move || {
            // 接收端已被取消時結果直接丟棄
            let _ = tx.send(quote::extract(&html));
        });

        rx.await
            .map_err(|_| QuoteError::Cancelled(ticker.to_string()))?
    }

    /// 釋放共用連線，只有第一次呼叫會回傳 true
    pub fn close(&self) -> bool {
        self.source.close()
    }

    fn dispatch_failed(&self, reason: String) -> QuoteError {
        LOGGER.error(format!("Failed to dispatch batch because {}", reason));
        QuoteError::Dispatch(reason)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::crawler::fake::FakePage;

    fn pipeline(page: FakePage) -> (TickerPipeline, Arc<FakePage>) {
        let page = Arc::new(page);
        let settings = config::Pipeline {
            parse_workers: 2,
            max_batch_size: 8,
        };
        let pipeline = TickerPipeline::new(page.clone(), &settings).unwrap();
        (pipeline, page)
    }

    #[tokio::test]
    async fn test_load_batch_isolates_lookup_redirect() {
        let (pipeline, _) = pipeline(
            FakePage::new()
                .with_quote("AAPL", "150.25", "+1.50 (+1.01%)")
                .with_quote("TSLA", "720.10", "-5.20 (-0.72%)"),
        );

        let batch = pipeline
            .load_batch(vec!["AAPL", "TSLA", "ZZZZINVALID"])
            .await
            .unwrap();

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.get(0).unwrap().ticker, "AAPL");
        assert_eq!(batch.get(0).unwrap().last_price.price, 150.25);
        assert_eq!(batch.get(1).unwrap().ticker, "TSLA");
        assert_eq!(batch.get(1).unwrap().last_price.change_percent, -0.72);
        assert_eq!(batch.get(1).unwrap().last_summary["Market Cap"], "2.5T");
        assert!(batch.get(2).is_none());
        assert!(matches!(
            batch.outcomes()[2],
            Err(QuoteError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_load_batch_preserves_input_order() {
        let (pipeline, _) = pipeline(
            FakePage::new()
                .with_quote_after("SLOW", "1.00", "+0.10 (+11.11%)", Duration::from_millis(200))
                .with_quote_after("MID", "2.00", "+0.20 (+11.11%)", Duration::from_millis(100))
                .with_quote("FAST", "3.00", "+0.30 (+11.11%)"),
        );

        let batch = pipeline
            .load_batch(vec!["SLOW", "MID", "FAST", "SLOW"])
            .await
            .unwrap();
        let tickers = batch
            .into_records()
            .into_iter()
            .map(|r| r.map(|r| r.ticker))
            .collect::<Vec<_>>();

        assert_eq!(
            tickers,
            vec![
                Some("SLOW".to_string()),
                Some("MID".to_string()),
                Some("FAST".to_string()),
                Some("SLOW".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_load_batch_runs_tickers_concurrently() {
        let delay = Duration::from_millis(300);
        let (pipeline, _) = pipeline(
            FakePage::new()
                .with_quote_after("A", "1.00", "+0.10 (+1.00%)", delay)
                .with_quote_after("B", "2.00", "+0.10 (+1.00%)", delay)
                .with_quote_after("C", "3.00", "+0.10 (+1.00%)", delay),
        );

        let start = std::time::Instant::now();
        let batch = pipeline.load_batch(vec!["A", "B", "C"]).await.unwrap();

        assert_eq!(batch.failures(), 0);
        assert!(start.elapsed() < delay * 3);
    }

    #[tokio::test]
    async fn test_load_batch_structure_error_fills_one_slot() {
        let (pipeline, _) = pipeline(
            FakePage::new()
                .with_layout_change("MOVED")
                .with_quote("BAD", "N/A", "+1.50 (+1.01%)")
                .with_quote("AAPL", "150.25", "+1.50 (+1.01%)"),
        );

        let batch = pipeline
            .load_batch(vec!["MOVED", "BAD", "AAPL", ""])
            .await
            .unwrap();

        assert!(matches!(batch.outcomes()[0], Err(QuoteError::Structure(_))));
        assert!(matches!(batch.outcomes()[1], Err(QuoteError::Parse { .. })));
        assert!(batch.get(2).is_some());
        assert!(matches!(batch.outcomes()[3], Err(QuoteError::EmptyTicker)));
        assert_eq!(batch.failures(), 3);
    }

    #[tokio::test]
    async fn test_load_batch_single_ticker() {
        let (pipeline, _) =
            pipeline(FakePage::new().with_quote("AAPL", "150.25", "+1.50 (+1.01%)"));

        let batch = pipeline.load_batch("AAPL").await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.get(0).unwrap().ticker, "AAPL");
    }

    #[tokio::test]
    async fn test_load_batch_all_failed_is_not_dispatch_error() {
        let (pipeline, _) = pipeline(FakePage::new());

        let batch = pipeline.load_batch(vec!["X", "Y"]).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.failures(), 2);
    }

    #[tokio::test]
    async fn test_load_batch_dispatch_errors() {
        let (pipeline, page) =
            pipeline(FakePage::new().with_quote("AAPL", "150.25", "+1.50 (+1.01%)"));

        let too_many = vec!["AAPL"; 9];
        assert!(matches!(
            pipeline.load_batch(too_many).await,
            Err(QuoteError::Dispatch(_))
        ));
        assert_eq!(page.fetched(), 0);

        assert!(pipeline.close());
        assert!(!pipeline.close());
        assert!(matches!(
            pipeline.load_batch("AAPL").await,
            Err(QuoteError::Dispatch(_))
        ));
        assert_eq!(page.fetched(), 0);
    }

    #[tokio::test]
    async fn test_dropped_batch_cancels_in_flight_tickers() {
        let (pipeline, page) = pipeline(
            FakePage::new()
                .with_quote_after("SLOW", "1.00", "+0.10 (+11.11%)", Duration::from_secs(30))
                .with_quote_after("LATE", "2.00", "+0.10 (+5.26%)", Duration::from_secs(30))
                .with_quote("FAST", "3.00", "+0.30 (+11.11%)"),
        );

        let result = tokio::time::timeout(
            Duration::from_millis(100),
            pipeline.load_batch(vec!["SLOW", "FAST", "LATE"]),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(page.fetched(), 3);
        assert_eq!(page.cancelled(), 2);
    }

    #[tokio::test]
    async fn test_session_closed_mid_batch_cancels_only_pending_slots() {
        let (pipeline, page) = pipeline(
            FakePage::new()
                .with_quote("AAPL", "150.25", "+1.50 (+1.01%)")
                .with_quote_after("SLOW", "1.00", "+0.10 (+11.11%)", Duration::from_millis(200)),
        );

        let closer = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            assert!(page.close());
        };
        let (batch, _) = tokio::join!(pipeline.load_batch(vec!["AAPL", "SLOW"]), closer);
        let batch = batch.unwrap();

        assert!(batch.get(0).is_some());
        match &batch.outcomes()[1] {
            Err(QuoteError::Cancelled(ticker)) => assert_eq!(ticker, "SLOW"),
            other => panic!("expected a cancelled slot, got {:?}", other),
        }
        assert!(batch.outcomes().iter().all(|o| match o {
            Err(why) => why.is_per_ticker(),
            Ok(_) => true,
        }));
        assert_eq!(page.cancelled(), 0);
    }
}
