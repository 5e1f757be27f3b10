mod cache;
mod config;
mod db;
mod net;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::io::Write;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

use cache::{OfflineCache, Request, SqliteStore};
use net::HttpFetcher;

#[derive(Parser, Debug)]
#[command(name = "precache")]
#[command(about = "Pre-populating offline asset cache with cache-first fetch")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/precache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Cache database path (overrides storage.path)
  #[arg(long)]
  db: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Fetch every configured asset and store it in the named cache
  Install,
  /// Serve a request from the cache, falling back to the network
  Fetch {
    /// Absolute URL, or a path relative to the configured origin
    url: String,

    /// HTTP method
    #[arg(short, long, default_value = "GET")]
    method: String,

    /// Request header as "Name: value" (repeatable)
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    headers: Vec<(String, String)>,

    /// Write the body here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
  /// List the keys held in the named cache
  List,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  // Log to stderr so stdout carries only response bodies
  let (writer, _guard) = tracing_appender::non_blocking(std::io::stderr());
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(writer)
    .init();

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  let store = match args.db.as_ref().or(config.storage.path.as_ref()) {
    Some(path) => SqliteStore::open_at(path)?,
    None => SqliteStore::open_default()?,
  };
  let fetcher = HttpFetcher::new(&config.http)?;
  let shim = OfflineCache::new(config.cache_config(), store, fetcher);

  match args.command {
    Command::Install => shim.on_install().await?,
    Command::Fetch {
      url,
      method,
      headers,
      output,
    } => {
      let url = resolve(&shim.config().origin, &url)?;
      let request = Request {
        headers,
        ..Request::new(&method, url)
      };
      let served = shim.on_fetch(&request).await?;

      info!(
        status = served.response.status,
        source = %served.source,
        cached_at = ?served.cached_at,
        bytes = served.response.body.len(),
        "{} {}",
        served.response.status,
        served.response.status_text
      );

      match output {
        Some(path) => std::fs::write(&path, &served.response.body)
          .map_err(|e| eyre!("Failed to write {}: {}", path.display(), e))?,
        None => std::io::stdout().write_all(&served.response.body)?,
      }
    }
    Command::List => {
      for key in shim.cached_keys()? {
        println!("{}", key);
      }
    }
  }

  Ok(())
}

/// Resolve a CLI URL argument against the configured origin.
fn resolve(origin: &Url, raw: &str) -> Result<Url> {
  origin
    .join(raw)
    .map_err(|e| eyre!("Invalid URL '{}': {}", raw, e))
}

/// Parse a "Name: value" header argument.
fn parse_header(raw: &str) -> Result<(String, String), String> {
  let (name, value) = raw
    .split_once(':')
    .ok_or_else(|| format!("expected \"Name: value\", got '{}'", raw))?;

  let name = name.trim();
  if name.is_empty() {
    return Err(format!("missing header name in '{}'", raw));
  }

  Ok((name.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn resolves_relative_and_absolute_urls() {
    let origin = Url::parse("http://localhost:8050").unwrap();
    assert_eq!(
      resolve(&origin, "/other.html").unwrap().as_str(),
      "http://localhost:8050/other.html"
    );
    assert_eq!(
      resolve(&origin, "https://cdn.tailwindcss.com").unwrap().as_str(),
      "https://cdn.tailwindcss.com/"
    );
  }

  #[test]
  fn parses_fetch_subcommand() {
    let args = Args::try_parse_from(["precache", "fetch", "/index.html", "-m", "post"]).unwrap();
    match args.command {
      Command::Fetch {
        url,
        method,
        headers,
        output,
      } => {
        assert_eq!(url, "/index.html");
        assert_eq!(method, "post");
        assert!(headers.is_empty());
        assert!(output.is_none());
      }
      other => panic!("unexpected command: {:?}", other),
    }
  }

  #[test]
  fn parses_repeated_header_options() {
    let args = Args::try_parse_from([
      "precache",
      "fetch",
      "/api/data",
      "-H",
      "Accept: application/json",
      "--header",
      "X-Trace-Id:abc:123",
    ])
    .unwrap();
    match args.command {
      Command::Fetch { headers, .. } => assert_eq!(
        headers,
        vec![
          ("Accept".to_string(), "application/json".to_string()),
          ("X-Trace-Id".to_string(), "abc:123".to_string()),
        ]
      ),
      other => panic!("unexpected command: {:?}", other),
    }
  }

  #[test]
  fn rejects_malformed_header() {
    assert!(parse_header("no-colon").is_err());
    assert!(parse_header(": value").is_err());
    assert!(Args::try_parse_from(["precache", "fetch", "/", "-H", "bad"]).is_err());
  }
}
