//! Network fetcher backed by reqwest.

use color_eyre::{eyre::eyre, Result};
use reqwest::header::HeaderMap;
use reqwest::Method;
use std::time::Duration;

use crate::cache::{Fetcher, Request, Response};
use crate::config::HttpConfig;

/// Live HTTP fetcher used for install and cache misses.
#[derive(Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
}

impl HttpFetcher {
  pub fn new(config: &HttpConfig) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .user_agent(config.user_agent.as_str())
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

impl Fetcher for HttpFetcher {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let method = Method::from_bytes(request.method.as_bytes())
      .map_err(|e| eyre!("Invalid method {}: {}", request.method, e))?;

    let mut builder = self.client.request(method, request.url.clone());
    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }

    let response = builder
      .send()
      .await
      .map_err(|e| eyre!("Request to {} failed: {}", request.url, e))?;

    let status = response.status();
    let url = response.url().to_string();
    let headers = header_pairs(response.headers());

    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body from {}: {}", request.url, e))?;

    Ok(Response {
      url,
      status: status.as_u16(),
      status_text: status.canonical_reason().unwrap_or_default().to_string(),
      headers,
      body: body.to_vec(),
    })
  }
}

/// Header list in wire order. Non-ASCII values are kept, decoded lossily.
fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
  headers
    .iter()
    .map(|(name, value)| {
      (
        name.as_str().to_string(),
        String::from_utf8_lossy(value.as_bytes()).into_owned(),
      )
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use reqwest::header::HeaderValue;
  use url::Url;

  #[tokio::test]
  async fn invalid_method_is_rejected_before_sending() {
    let fetcher = HttpFetcher::new(&HttpConfig::default()).unwrap();
    let request = Request::new("BAD METHOD", Url::parse("http://localhost:1/").unwrap());

    let err = fetcher.fetch(&request).await.unwrap_err();
    assert!(err.to_string().contains("Invalid method"));
  }

  #[test]
  fn header_values_outside_visible_ascii_are_kept() {
    let mut headers = HeaderMap::new();
    headers.insert("content-type", HeaderValue::from_static("text/css"));
    headers.insert(
      "content-disposition",
      HeaderValue::from_bytes("inline; filename=\"café.css\"".as_bytes()).unwrap(),
    );

    let pairs = header_pairs(&headers);
    assert_eq!(pairs.len(), 2);
    assert!(pairs.contains(&("content-type".to_string(), "text/css".to_string())));
    assert!(pairs.contains(&(
      "content-disposition".to_string(),
      "inline; filename=\"café.css\"".to_string()
    )));
  }
}
