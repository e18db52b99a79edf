use std::future::Future;

use anyhow::{Context, Result};
use async_trait::async_trait;
use http::{Request, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::config::RetryConfig;
use crate::error::Error;

/// Generic HTTP client.
///
/// A trait is used here so to facilitate native HTTP/TLS when compiled for mobile applications.
#[async_trait]
pub trait AsyncHttpClient {
    async fn execute(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>>;
}

pub(crate) fn base_request() -> http::request::Builder {
    Request::builder().header("Accept", "application/json")
}

/// Execute a request, reporting failures to obtain any response as [Error::Transport].
pub(crate) async fn send<H: AsyncHttpClient + ?Sized>(
    http_client: &H,
    request: Request<Vec<u8>>,
) -> crate::Result<Response<Vec<u8>>> {
    let uri = request.uri().clone();
    http_client
        .execute(request)
        .await
        .with_context(|| format!("request to {uri} failed"))
        .map_err(Error::Transport)
}

/// GET a JSON document.
///
/// Server errors are reported as [Error::Transport] so that discovery may be retried,
/// client errors and malformed documents are not.
pub(crate) async fn get_json<H, T>(http_client: &H, url: &Url, what: &str) -> crate::Result<T>
where
    H: AsyncHttpClient + ?Sized,
    T: DeserializeOwned,
{
    let request = base_request()
        .method("GET")
        .uri(url.as_str())
        .body(vec![])
        .with_context(|| format!("failed to build {what} request"))?;

    debug!(%url, "fetching {what}");
    let response = send(http_client, request).await?;
    let status = response.status();

    if status.is_server_error() {
        return Err(Error::Transport(anyhow::anyhow!(
            "{what} request at {url} was unsuccessful (status: {status})"
        )));
    }
    if !status.is_success() {
        return Err(anyhow::anyhow!(
            "{what} request at {url} was unsuccessful (status: {status}): {}",
            String::from_utf8_lossy(response.body())
        )
        .into());
    }

    serde_json::from_slice(response.body())
        .with_context(|| format!("failed to parse {what} from {url} (status: {status})"))
        .map_err(Into::into)
}

/// Run `attempt` until it succeeds, fails with a non transient error, or the
/// attempt budget is spent. The last error is returned on exhaustion.
pub(crate) async fn with_retries<T, F, Fut>(
    retry: &RetryConfig,
    step: &str,
    mut attempt: F,
) -> crate::Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = crate::Result<T>>,
{
    let max_attempts = retry.max_attempts.max(1);
    let mut current = 1;

    loop {
        match attempt(current).await {
            Err(e) if e.is_transient() && current < max_attempts => {
                warn!(step, attempt = current, max_attempts, "{e}, retrying");
                tokio::time::sleep(retry.backoff()).await;
                current += 1;
            }
            result => return result,
        }
    }
}

#[derive(Debug)]
pub struct ReqwestClient(reqwest::Client);

impl AsRef<reqwest::Client> for ReqwestClient {
    fn as_ref(&self) -> &reqwest::Client {
        &self.0
    }
}

impl ReqwestClient {
    pub fn new() -> Result<Self> {
        reqwest::Client::builder()
            .use_rustls_tls()
            .build()
            .context("unable to build http_client")
            .map(Self)
    }
}

#[async_trait]
impl AsyncHttpClient for ReqwestClient {
    async fn execute(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
        let response = self
            .0
            .execute(request.try_into().context("unable to convert request")?)
            .await
            .context("http request failed")?;

        let mut builder = Response::builder()
            .status(response.status())
            .version(response.version());

        builder
            .headers_mut()
            .context("unable to set headers")?
            .extend(response.headers().clone());

        builder
            .body(
                response
                    .bytes()
                    .await
                    .context("failed to extract response body")?
                    .to_vec(),
            )
            .context("unable to construct response")
    }
}
