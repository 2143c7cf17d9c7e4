//! HTTP access used by repository services and the fetch cascade.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use pak_schema::Credential;
use reqwest::{Client, RequestBuilder};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::FetchError;
use crate::config::NetworkConfig;

/// Minimal HTTP surface the fetch layer needs.
#[async_trait]
pub trait Transport: Send + Sync {
    /// GET `url` and decode the body as JSON.
    async fn get_json(
        &self,
        url: &str,
        credential: Option<&Credential>,
    ) -> Result<serde_json::Value, FetchError>;

    /// GET `url` and stream the body into `dest`.
    async fn download(
        &self,
        url: &str,
        dest: &Path,
        credential: Option<&Credential>,
    ) -> Result<(), FetchError>;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &NetworkConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client })
    }

    fn request(&self, url: &str, credential: Option<&Credential>) -> RequestBuilder {
        let builder = self.client.get(url);
        match credential {
            Some(Credential::Token(token)) => builder.bearer_auth(token),
            Some(Credential::Basic { username, password }) => {
                builder.basic_auth(username, Some(password))
            }
            None => builder,
        }
    }
}

fn check_status(url: &str, resp: reqwest::Response) -> Result<reqwest::Response, FetchError> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        Err(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_json(
        &self,
        url: &str,
        credential: Option<&Credential>,
    ) -> Result<serde_json::Value, FetchError> {
        debug!("GET {url}");
        let resp = self
            .request(url, credential)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        let resp = check_status(url, resp)?;
        Ok(resp.json().await?)
    }

    async fn download(
        &self,
        url: &str,
        dest: &Path,
        credential: Option<&Credential>,
    ) -> Result<(), FetchError> {
        debug!("Downloading {url} -> {}", dest.display());
        let resp = self.request(url, credential).send().await?;
        let resp = check_status(url, resp)?;

        let mut file = File::create(dest).await?;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn transport() -> HttpTransport {
        HttpTransport::new(&NetworkConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_get_json_sends_token() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/repos/acme/tool")
            .match_header("authorization", "Bearer s3cret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"name":"tool"}"#)
            .create_async()
            .await;

        let cred = Credential::Token("s3cret".to_string());
        let value = transport()
            .get_json(&format!("{}/repos/acme/tool", server.url()), Some(&cred))
            .await
            .unwrap();
        assert_eq!(value["name"], "tool");
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let err = transport()
            .get_json(&format!("{}/missing", server.url()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_download_writes_body() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/a.zip")
            .with_status(200)
            .with_body("PK-bytes")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a.zip");
        transport()
            .download(&format!("{}/a.zip", server.url()), &dest, None)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"PK-bytes");
    }
}
