//! The offline cache shim: install and fetch event handlers.

use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

use super::storage::CacheStore;
use super::traits::{CacheKey, Fetcher, Request, Response, Served};

/// Immutable cache configuration: store name, origin and asset list.
#[derive(Debug, Clone)]
pub struct CacheConfig {
  pub name: String,
  /// Base URL that relative assets resolve against
  pub origin: Url,
  /// Assets pre-populated on install, in order
  pub assets: Vec<String>,
}

impl CacheConfig {
  /// Resolve the asset list to GET requests.
  pub fn asset_requests(&self) -> Result<Vec<Request>> {
    self
      .assets
      .iter()
      .map(|asset| {
        self
          .origin
          .join(asset)
          .map(Request::get)
          .map_err(|e| eyre!("Invalid asset URL '{}': {}", asset, e))
      })
      .collect()
  }
}

/// Cache-first shim over a cache store and a network fetcher.
///
/// Install pre-populates the named cache with every asset or nothing.
/// Fetch serves stored responses forever and never writes on a miss.
pub struct OfflineCache<S: CacheStore, F: Fetcher> {
  config: CacheConfig,
  store: Arc<S>,
  fetcher: Arc<F>,
}

impl<S: CacheStore, F: Fetcher> OfflineCache<S, F> {
  pub fn new(config: CacheConfig, store: S, fetcher: F) -> Self {
    Self {
      config,
      store: Arc::new(store),
      fetcher: Arc::new(fetcher),
    }
  }

  pub fn config(&self) -> &CacheConfig {
    &self.config
  }

  /// Handle the install event.
  ///
  /// Every asset is fetched concurrently. A transport error or a non-2xx
  /// status on any of them fails the whole batch and nothing is stored.
  pub async fn on_install(&self) -> Result<()> {
    let name = &self.config.name;
    self.store.open(name)?;

    let requests = self.config.asset_requests()?;

    let mut seen = HashSet::new();
    let mut keyed = Vec::with_capacity(requests.len());
    for request in requests {
      let key = request
        .cache_key()
        .ok_or_else(|| eyre!("Asset {} is not cacheable", request.url))?;
      if !seen.insert(key.clone()) {
        return Err(eyre!("Duplicate asset in install list: {}", key));
      }
      keyed.push((key, request));
    }

    info!(cache = %name, assets = keyed.len(), "installing");

    let entries = try_join_all(
      keyed
        .iter()
        .map(|(key, request)| self.fetch_asset(key, request)),
    )
    .await?;

    self.store.put_all(name, &entries)?;

    info!(cache = %name, stored = entries.len(), "install complete");
    Ok(())
  }

  /// Fetch one asset for install, rejecting non-2xx responses.
  async fn fetch_asset(&self, key: &CacheKey, request: &Request) -> Result<(CacheKey, Response)> {
    let response = self
      .fetcher
      .fetch(request)
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", request.url, e))?;

    if !response.is_ok() {
      return Err(eyre!(
        "Failed to fetch {}: status {} {}",
        request.url,
        response.status,
        response.status_text
      ));
    }

    debug!(url = %request.url, bytes = response.body.len(), "fetched asset");
    Ok((key.clone(), response))
  }

  /// Handle a fetch event.
  ///
  /// Returns the stored response on a hit with no network call. On a miss
  /// the live response is returned unmodified and is not stored.
  pub async fn on_fetch(&self, request: &Request) -> Result<Served> {
    if let Some(key) = request.cache_key() {
      if let Some(cached) = self.store.lookup(&self.config.name, &key)? {
        debug!(%key, "cache hit");
        return Ok(Served::from_cache(cached.response, cached.cached_at));
      }
      debug!(%key, "cache miss");
    }

    let response = self.fetcher.fetch(request).await?;
    Ok(Served::from_network(response))
  }

  /// Keys currently held in the named cache.
  pub fn cached_keys(&self) -> Result<Vec<CacheKey>> {
    self.store.keys(&self.config.name)
  }
}
