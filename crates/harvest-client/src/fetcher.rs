use std::time::Duration;

use harvest_core::config::HarvestConfig;
use harvest_core::error::AppError;
use harvest_core::models::{FetchRequest, FetchResponse};
use harvest_core::traits::Fetcher;
use reqwest::Client;

/// HTTP fetcher using reqwest.
///
/// Issues GET requests with the request's query parameters appended and a
/// fixed per-request timeout. Non-2xx statuses are returned as-is; callers
/// decide whether a status is a failure.
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: Client,
    timeout_secs: u64,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self, AppError> {
        Self::from_config(&HarvestConfig::default())
    }

    pub fn from_config(config: &HarvestConfig) -> Result<Self, AppError> {
        Self::build(&config.user_agent, config.fetch_timeout)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, AppError> {
        Self::build(&HarvestConfig::default().user_agent, timeout)
    }

    fn build(user_agent: &str, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            timeout_secs: timeout.as_secs(),
        })
    }

    fn map_error(&self, e: reqwest::Error) -> AppError {
        if e.is_timeout() {
            AppError::Timeout(self.timeout_secs)
        } else if e.is_connect() {
            AppError::NetworkError(format!("Connection failed: {e}"))
        } else {
            AppError::HttpError(e.to_string())
        }
    }
}

impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, AppError> {
        let url = request.to_url()?;
        tracing::debug!(%url, "GET");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| match self.map_error(e) {
            AppError::HttpError(msg) => {
                AppError::HttpError(format!("Failed to read response body: {msg}"))
            }
            other => other,
        })?;

        Ok(FetchResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    use super::*;

    fn local_fetcher(timeout: Duration) -> ReqwestFetcher {
        let client = Client::builder()
            .no_proxy()
            .user_agent(HarvestConfig::default().user_agent)
            .timeout(timeout)
            .build()
            .unwrap();
        ReqwestFetcher {
            client,
            timeout_secs: timeout.as_secs(),
        }
    }

    /// Serve one canned response; the handle yields the raw request head.
    async fn serve_once(status_line: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let n = socket.read(&mut buf).await.unwrap();
            let head = String::from_utf8_lossy(&buf[..n]).to_string();
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            head
        });
        (format!("http://{addr}/pages/forms/"), handle)
    }

    #[test]
    fn test_builds_with_defaults() {
        assert!(ReqwestFetcher::new().is_ok());
        let fetcher = ReqwestFetcher::with_timeout(Duration::from_secs(3)).unwrap();
        assert_eq!(fetcher.timeout_secs, 3);
    }

    #[tokio::test]
    async fn test_fetch_sends_query_and_user_agent() {
        let (url, server) = serve_once("200 OK", "<table></table>").await;
        let fetcher = local_fetcher(Duration::from_secs(5));
        let request = FetchRequest::new(url)
            .with_param("page_num", "2")
            .with_param("per_page", "25");

        let response = fetcher.fetch(&request).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body, "<table></table>");
        let head = server.await.unwrap();
        assert!(head.starts_with("GET /pages/forms/?page_num=2&per_page=25 HTTP/1.1"));
        assert!(head.to_lowercase().contains("user-agent: harvest/"));
    }

    #[tokio::test]
    async fn test_non_success_status_is_returned_then_rejected_by_fetch_body() {
        let (url, server) = serve_once("404 Not Found", "missing").await;
        let fetcher = local_fetcher(Duration::from_secs(5));
        let request = FetchRequest::new(url);

        let err = fetcher.fetch_body(&request).await.unwrap_err();

        assert!(err.is_transport());
        assert!(err.to_string().contains("HTTP 404"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let fetcher = local_fetcher(Duration::from_secs(5));
        let err = fetcher
            .fetch(&FetchRequest::new(format!("http://{addr}/")))
            .await
            .unwrap_err();

        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_slow_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;
            drop(socket);
        });

        let fetcher = local_fetcher(Duration::from_millis(200));
        let err = fetcher
            .fetch(&FetchRequest::new(format!("http://{addr}/")))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Timeout(_)));
        server.abort();
    }

    #[tokio::test]
    async fn test_invalid_url_fails_before_sending() {
        let fetcher = local_fetcher(Duration::from_secs(1));
        let err = fetcher.fetch(&FetchRequest::new("not a url")).await.unwrap_err();
        assert!(err.to_string().contains("Invalid URL"));
    }
}
