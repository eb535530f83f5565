use std::{env, fmt::Display, path::PathBuf, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use config::{Config as config_config, File as config_file};
use serde::{Deserialize, Serialize};

use crate::logging;

const CONFIG_PATH: &str = "app.json";

#[derive(Serialize, Deserialize, Default, Debug, Clone)]
pub struct App {
    #[serde(default)]
    pub yahoo: Yahoo,
    #[serde(default)]
    pub pipeline: Pipeline,
    #[serde(default)]
    pub system: System,
}

const YAHOO_BASE_URL: &str = "YAHOO_BASE_URL";
const YAHOO_CONNECT_TIMEOUT_SECS: &str = "YAHOO_CONNECT_TIMEOUT_SECS";
const YAHOO_READ_TIMEOUT_SECS: &str = "YAHOO_READ_TIMEOUT_SECS";

/// 上游報價網站
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Yahoo {
    /// 報價頁網址前綴，後面直接接代號
    pub base_url: String,
    /// 建立連線的逾時秒數
    pub connect_timeout_secs: u64,
    /// 讀取回應的逾時秒數，比連線逾時長，避免把頁面產生慢誤判成網路不通
    pub read_timeout_secs: u64,
}

impl Default for Yahoo {
    fn default() -> Self {
        Yahoo {
            base_url: "https://finance.yahoo.com/quote/".to_string(),
            connect_timeout_secs: 30,
            read_timeout_secs: 120,
        }
    }
}

impl Yahoo {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

const PIPELINE_PARSE_WORKERS: &str = "PIPELINE_PARSE_WORKERS";
const PIPELINE_MAX_BATCH_SIZE: &str = "PIPELINE_MAX_BATCH_SIZE";

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Pipeline {
    /// 解析 HTML 的 worker 數量
    pub parse_workers: usize,
    /// 單次批次最多可查詢的代號數
    pub max_batch_size: usize,
}

impl Default for Pipeline {
    fn default() -> Self {
        Pipeline {
            parse_workers: num_cpus::get(),
            max_batch_size: 64,
        }
    }
}

const SYSTEM_HTTP_HOST: &str = "SYSTEM_HTTP_HOST";
const SYSTEM_HTTP_PORT: &str = "SYSTEM_HTTP_PORT";

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct System {
    pub http_host: String,
    pub http_port: u16,
}

impl Default for System {
    fn default() -> Self {
        System {
            http_host: "0.0.0.0".to_string(),
            http_port: 8080,
        }
    }
}

impl System {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }
}

impl App {
    /// 讀取 app.json（若存在），再以 env 的設定值覆蓋
    pub fn load() -> Result<Self> {
        let config_path = config_path();
        if config_path.exists() {
            let config: App = config_config::builder()
                .add_source(config_file::from(config_path.clone()))
                .build()
                .and_then(|c| c.try_deserialize())
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            return Ok(config.override_with_env());
        }

        Ok(App::default().override_with_env())
    }

    /// 將來自於 env 的設定值覆蓋掉 json 上的設定值
    fn override_with_env(mut self) -> Self {
        if let Ok(base_url) = env::var(YAHOO_BASE_URL) {
            self.yahoo.base_url = base_url;
        }

        self.yahoo.connect_timeout_secs =
            env_or(YAHOO_CONNECT_TIMEOUT_SECS, self.yahoo.connect_timeout_secs);
        self.yahoo.read_timeout_secs = env_or(YAHOO_READ_TIMEOUT_SECS, self.yahoo.read_timeout_secs);
        self.pipeline.parse_workers = env_or(PIPELINE_PARSE_WORKERS, self.pipeline.parse_workers);
        self.pipeline.max_batch_size =
            env_or(PIPELINE_MAX_BATCH_SIZE, self.pipeline.max_batch_size);

        if let Ok(host) = env::var(SYSTEM_HTTP_HOST) {
            self.system.http_host = host;
        }

        self.system.http_port = env_or(SYSTEM_HTTP_PORT, self.system.http_port);

        self
    }
}

/// 讀取 env 並轉型，格式錯誤時保留原值並寫 log
fn env_or<T>(key: &str, current: T) -> T
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => parse_or(key, &raw, current),
        Err(_) => current,
    }
}

fn parse_or<T>(key: &str, raw: &str, current: T) -> T
where
    T: FromStr,
    T::Err: Display,
{
    match raw.trim().parse::<T>() {
        Ok(value) => value,
        Err(why) => {
            logging::warn_file_async(format!(
                "Ignore {}='{}' because {}",
                key, raw, why
            ));
            current
        }
    }
}

/// 回傳設定檔的路徑
fn config_path() -> PathBuf {
    PathBuf::from(CONFIG_PATH)
}
