// src/store/http.rs

//! Store access over HTTP
//!
//! Directory listings are nginx-style JSON autoindex documents:
//!
//! ```json
//! [{"name": "ROOT", "type": "directory", "mtime": "..."}]
//! ```
//!
//! A missing path (HTTP 404) is an empty listing. Transport failures are
//! retried with a linear backoff; a listing that still cannot be fetched is
//! logged and reported as empty, so callers only ever see absence.

use super::{DirEntry, DirectoryLister};
use crate::config::ConnectionSettings;
use crate::error::{Error, Result};
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Base retry delay in milliseconds
const RETRY_DELAY_MS: u64 = 1000;

/// Lists and reads a store served over HTTP(S)
pub struct HttpLister {
    client: Client,
    base_url: String,
    retries: u32,
    throttle: Duration,
    retry_delay: Duration,
}

impl HttpLister {
    pub fn new(base_url: &str, settings: &ConnectionSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout())
            .danger_accept_invalid_certs(!settings.ssl_verify)
            .build()
            .map_err(|e| Error::DownloadError(format!("Failed to create HTTP client: {e}")))?;

        if !settings.ssl_verify {
            warn!("TLS certificate verification disabled for {}", base_url);
        }

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retries: settings.retries.max(1),
            throttle: settings.throttle(),
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
        })
    }

    /// Shorten the delay between attempts
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// GET `url`, retrying transport errors and server errors
    ///
    /// Returns `Ok(None)` on 404.
    fn get(&self, url: &str) -> Result<Option<Response>> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            if !self.throttle.is_zero() {
                std::thread::sleep(self.throttle);
            }

            let failure = match self.client.get(url).send() {
                Ok(response) if response.status() == StatusCode::NOT_FOUND => return Ok(None),
                Ok(response) if response.status().is_success() => return Ok(Some(response)),
                Ok(response) if !response.status().is_server_error() => {
                    return Err(Error::DownloadError(format!(
                        "HTTP {} from {}",
                        response.status(),
                        url
                    )));
                }
                Ok(response) => format!("HTTP {}", response.status()),
                Err(e) => e.to_string(),
            };

            if attempt >= self.retries {
                return Err(Error::DownloadError(format!(
                    "Failed to fetch {url} after {attempt} attempts: {failure}"
                )));
            }
            warn!("Fetch attempt {} of {} failed: {}, retrying...", attempt, url, failure);
            std::thread::sleep(self.retry_delay * attempt);
        }
    }

    fn fetch_listing(&self, path: &str) -> Result<Vec<DirEntry>> {
        let url = format!("{}/", self.url(path));
        let Some(response) = self.get(&url)? else {
            debug!("{} not found", url);
            return Ok(Vec::new());
        };
        let body = response
            .text()
            .map_err(|e| Error::DownloadError(format!("Failed to read listing {url}: {e}")))?;
        parse_listing(&body).map_err(|e| Error::ParseError(format!("Listing {url}: {e}")))
    }
}

/// Parse a JSON autoindex document
pub fn parse_listing(body: &str) -> serde_json::Result<Vec<DirEntry>> {
    serde_json::from_str(body)
}

impl DirectoryLister for HttpLister {
    fn list(&self, path: &str) -> Vec<DirEntry> {
        match self.fetch_listing(path) {
            Ok(entries) => {
                debug!("Listed {} ({} entries)", path, entries.len());
                entries
            }
            Err(e) => {
                error!("Cannot list {}: {}", path, e);
                Vec::new()
            }
        }
    }

    fn read(&self, path: &str) -> Result<String> {
        let url = self.url(path);
        let response = self
            .get(&url)?
            .ok_or_else(|| Error::NotFoundError(format!("{url} does not exist")))?;
        response
            .text()
            .map_err(|e| Error::DownloadError(format!("Failed to read {url}: {e}")))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::sync::{Arc, Mutex};
    use std::thread;

    /// Minimal HTTP/1.1 server answering from a fixed route table
    fn serve(routes: Vec<(&'static str, u16, &'static str)>, requests: usize) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);

        thread::spawn(move || {
            for stream in listener.incoming().take(requests) {
                let mut stream = stream.unwrap();
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut request_line = String::new();
                reader.read_line(&mut request_line).unwrap();
                loop {
                    let mut header = String::new();
                    reader.read_line(&mut header).unwrap();
                    if header == "\r\n" || header.is_empty() {
                        break;
                    }
                }
                let path = request_line.split_whitespace().nth(1).unwrap_or("").to_string();
                log.lock().unwrap().push(path.clone());
                let (status, body) = routes
                    .iter()
                    .find(|(p, _, _)| *p == path)
                    .map(|(_, s, b)| (*s, *b))
                    .unwrap_or((404, "not found"));
                let reply = format!(
                    "HTTP/1.1 {status} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                stream.write_all(reply.as_bytes()).unwrap();
            }
        });

        (format!("http://{addr}"), seen)
    }

    fn settings() -> ConnectionSettings {
        ConnectionSettings {
            timeout: 5,
            retries: 2,
            ..ConnectionSettings::default()
        }
    }

    #[test]
    fn test_url_join() {
        let lister = HttpLister::new("https://store.example.org/", &settings()).unwrap();
        assert_eq!(lister.url("/TARS/el9/"), "https://store.example.org/TARS/el9");
        assert_eq!(lister.url("TARS/el9/ROOT/x.tar.gz"), "https://store.example.org/TARS/el9/ROOT/x.tar.gz");
    }

    #[test]
    fn test_parse_listing() {
        let entries = parse_listing(r#"[{"name":"zlib","type":"directory"},{"name":"a","type":"file"}]"#).unwrap();
        assert_eq!(entries, vec![DirEntry::directory("zlib"), DirEntry::file("a")]);
        assert!(parse_listing("<html>").is_err());
    }

    #[test]
    fn test_list_read_and_missing() {
        let (base, seen) = serve(
            vec![
                ("/TARS/el9/", 200, r#"[{"name":"zlib","type":"directory"}]"#),
                ("/TARS/el9/zlib/zlib-v1-1.el9.tar.gz", 200, "../store/zl/zlib.tar.gz"),
            ],
            3,
        );
        let lister = HttpLister::new(&base, &settings()).unwrap();

        assert_eq!(lister.list("TARS/el9"), vec![DirEntry::directory("zlib")]);
        assert_eq!(
            lister.read("TARS/el9/zlib/zlib-v1-1.el9.tar.gz").unwrap(),
            "../store/zl/zlib.tar.gz"
        );
        assert!(lister.list("TARS/missing").is_empty());
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_server_error_is_retried_then_empty() {
        let (base, seen) = serve(vec![("/TARS/el9/", 503, "busy")], 2);
        let lister = HttpLister::new(&base, &settings())
            .unwrap()
            .with_retry_delay(Duration::from_millis(10));
        assert!(lister.list("TARS/el9").is_empty());
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_read_missing_is_not_found() {
        let (base, _) = serve(Vec::new(), 1);
        let lister = HttpLister::new(&base, &settings()).unwrap();
        assert!(matches!(lister.read("TARS/x"), Err(Error::NotFoundError(_))));
    }
}
