//! Core traits and types for the offline cache.

use chrono::{DateTime, Utc};
use color_eyre::Result;
use std::future::Future;
use url::Url;

/// An outgoing request as seen by the fetch handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  /// Upper-case HTTP method
  pub method: String,
  pub url: Url,
  pub headers: Vec<(String, String)>,
}

impl Request {
  pub fn new(method: &str, url: Url) -> Self {
    Self {
      method: method.to_ascii_uppercase(),
      url,
      headers: Vec::new(),
    }
  }

  pub fn get(url: Url) -> Self {
    Self::new("GET", url)
  }

  /// Cache key for this request, or None if the method is never cached.
  pub fn cache_key(&self) -> Option<CacheKey> {
    if self.method != "GET" {
      return None;
    }

    let mut url = self.url.clone();
    url.set_fragment(None);

    Some(CacheKey {
      method: self.method.clone(),
      url: url.to_string(),
    })
  }
}

/// A captured response: status, headers and the full body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  /// Final URL after redirects
  pub url: String,
  pub status: u16,
  pub status_text: String,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Response {
  /// True for 2xx statuses.
  pub fn is_ok(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

/// Request identity used as the store key (method + URL without fragment).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
  pub method: String,
  pub url: String,
}

impl std::fmt::Display for CacheKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} {}", self.method, self.url)
  }
}

/// The live network primitive behind cache misses and install.
///
/// Non-2xx responses are returned as `Ok`; only transport failures are errors.
pub trait Fetcher: Send + Sync {
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send;
}

/// Result of a fetch event, including the response and where it came from.
#[derive(Debug, Clone)]
pub struct Served {
  pub response: Response,
  pub source: Source,
  /// When the response was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl Served {
  pub fn from_network(response: Response) -> Self {
    Self {
      response,
      source: Source::Network,
      cached_at: None,
    }
  }

  pub fn from_cache(response: Response, cached_at: DateTime<Utc>) -> Self {
    Self {
      response,
      source: Source::Cache,
      cached_at: Some(cached_at),
    }
  }
}

/// Indicates where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
  /// Stored during install
  Cache,
  /// Live fetch after a cache miss
  Network,
}

impl std::fmt::Display for Source {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Cache => write!(f, "cache"),
      Self::Network => write!(f, "network"),
    }
  }
}
