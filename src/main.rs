use std::{env, sync::Arc};

use anyhow::{Context, Result};
use scopeguard::defer;
use tokio::net::TcpListener;

use crate::{
    crawler::{pipeline::TickerPipeline, yahoo::Yahoo},
    util::http::Session,
};

pub mod api;
pub mod config;
pub mod crawler;
pub mod declare;
pub mod error;
pub mod logging;
pub mod util;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let settings = config::App::load()?;

    let session = Session::new(
        settings.yahoo.connect_timeout(),
        settings.yahoo.read_timeout(),
    )?;
    let yahoo = Arc::new(Yahoo::new(&settings.yahoo.base_url, session));
    let pipeline = Arc::new(TickerPipeline::new(yahoo, &settings.pipeline)?);

    let releaser = pipeline.clone();
    defer! {
        // 無論正常結束或中途出錯，共用連線都只釋放一次
        if releaser.close() {
            logging::info_file_async("QuoteScraper session released");
        }
        // 寫檔線程必須最後收尾
        logging::shutdown();
    }

    let tickers = env::args().skip(1).collect::<Vec<_>>();
    if !tickers.is_empty() {
        return run_once(&pipeline, tickers).await;
    }

    serve(&settings.system, pipeline.clone()).await
}

/// 命令列帶代號時只查詢一次，將結果以 JSON 印出
async fn run_once(pipeline: &TickerPipeline, tickers: Vec<String>) -> Result<()> {
    let batch = pipeline.load_batch(tickers).await?;
    println!("{}", serde_json::to_string_pretty(&batch)?);

    Ok(())
}

async fn serve(system: &config::System, pipeline: Arc<TickerPipeline>) -> Result<()> {
    let addr = system.listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    let msg = format!(
        "QuoteScraper 已啟動 http://{}\r\nRust OS/Arch: {}/{}\r\n",
        addr,
        env::consts::OS,
        env::consts::ARCH
    );
    logging::info_file_async(msg.clone());
    logging::info_console(msg);

    let app = api::router(api::AppState { pipeline });
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server stopped unexpectedly")?;

    logging::info_file_async("QuoteScraper 已停止");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(why) = tokio::signal::ctrl_c().await {
        logging::error_file_async(format!("Failed to listen for ctrl_c because {:?}", why));
        // 收不到訊號時不可直接關閉服務
        std::future::pending::<()>().await;
    }
}
