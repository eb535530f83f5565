use std::{sync::RwLock, time::Duration};

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use reqwest::Client;

use crate::{error::QuoteError, logging::Logger};

pub(crate) static LOGGER: Lazy<Logger> = Lazy::new(|| Logger::new("http"));

/// The shared, pooled HTTP session.
///
/// One `Session` is created at start-up and handed to every fetcher. All
/// requests go through the same `reqwest::Client`, so connections, cookies and
/// TLS state are reused across tickers. [`Session::close`] releases the pool;
/// only the first call does any work.
pub struct Session {
    client: RwLock<Option<Client>>,
}

impl Session {
    /// Builds the session with a connect timeout and a separate, longer read timeout.
    ///
    /// # Arguments
    ///
    /// * `connect_timeout`: Upper bound for establishing a connection.
    /// * `read_timeout`: Upper bound for each read while waiting for the response.
    ///
    /// # Returns
    ///
    /// * `Result<Session>`: The session, or an error if the client cannot be created.
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Result<Self> {
        // 已安裝過 provider 時會回傳 Err，可忽略
        let _ = rustls::crypto::ring::default_provider().install_default();

        let client = Client::builder()
            // ===== 壓縮 =====
            .gzip(true)
            .deflate(true)
            // ===== 超時設置 =====
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            // ===== TCP 優化 =====
            .tcp_nodelay(true)
            .tcp_keepalive(Duration::from_secs(60))
            // ===== 連接池 =====
            .pool_max_idle_per_host(20)
            .pool_idle_timeout(Duration::from_secs(90))
            // ===== Cookie 和重定向 =====
            // 查無代號時上游會轉址到 lookup 頁，必須跟隨轉址才看得到最終網址
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| anyhow!("Failed to create reqwest client: {:?}", e))?;

        Ok(Session {
            client: RwLock::new(Some(client)),
        })
    }

    /// Returns a handle on the pooled client.
    ///
    /// `reqwest::Client` is reference counted, the clone shares the pool.
    pub fn client(&self) -> Result<Client, QuoteError> {
        let guard = self
            .client
            .read()
            .map_err(|_| QuoteError::Dispatch("session lock poisoned".to_string()))?;

        guard
            .as_ref()
            .cloned()
            .ok_or_else(|| QuoteError::Dispatch("session is closed".to_string()))
    }

    pub fn is_closed(&self) -> bool {
        match self.client.read() {
            Ok(guard) => guard.is_none(),
            Err(_) => true,
        }
    }

    /// Releases the connection pool. Returns `true` only for the call that closed it.
    pub fn close(&self) -> bool {
        let mut guard = match self.client.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        match guard.take() {
            Some(client) => {
                drop(client);
                LOGGER.info("Session closed");
                true
            }
            None => false,
        }
    }
}
