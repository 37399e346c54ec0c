//! `web.read` — fetch a page over HTTP(S) with SSRF guards.
//!
//! Only http and https URLs are accepted; localhost, loopback, private
//! IPv4 ranges, and IPv6 unique-local addresses are refused outright.
//! Responses follow at most three redirects and are capped at 1 MiB.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use ratchet_core::{Capability, Envelope, ErrorCode};
use reqwest::Url;
use serde_json::{Map, Value, json};

pub const MAX_BODY_BYTES: usize = 1024 * 1024;
const FETCH_TIMEOUT: Duration = Duration::from_secs(4);
const MAX_REDIRECTS: usize = 3;

pub struct WebRead {
    client: reqwest::Client,
}

impl WebRead {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }
}

impl Default for WebRead {
    fn default() -> Self {
        Self::new()
    }
}

fn host_is_blocked(host: &str) -> bool {
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    // Url keeps brackets around IPv6 hosts
    let bare = host.trim_matches(|c| c == '[' || c == ']');
    match bare.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => ip.is_loopback() || ip.is_private(),
        Ok(IpAddr::V6(ip)) => ip.is_loopback() || (ip.segments()[0] & 0xfe00) == 0xfc00,
        Err(_) => false,
    }
}

/// Validate a URL against the scheme and host policy.
fn check_url(raw: &str) -> Result<Url, Envelope> {
    let url = Url::parse(raw)
        .map_err(|e| Envelope::error(ErrorCode::BadArgs, format!("invalid url: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Envelope::error(ErrorCode::BadArgs, "unsupported_scheme"));
    }
    if host_is_blocked(url.host_str().unwrap_or("")) {
        return Err(Envelope::error(ErrorCode::Forbidden, "blocked_host"));
    }
    Ok(url)
}

#[async_trait]
impl Capability for WebRead {
    async fn invoke(&self, args: Map<String, Value>) -> Envelope {
        let Some(raw) = args.get("url").and_then(Value::as_str) else {
            return Envelope::error(ErrorCode::MissingArgs, "url");
        };
        let url = match check_url(raw) {
            Ok(u) => u,
            Err(env) => return env,
        };

        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                return Envelope::error(ErrorCode::Timeout, e.to_string());
            }
            Err(e) => return Envelope::error(ErrorCode::ToolError, e.to_string()),
        };

        if !response.status().is_success() {
            return Envelope::error(
                ErrorCode::ToolError,
                format!("status {}", response.status().as_u16()),
            );
        }

        let title = response
            .headers()
            .get("x-title")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let body = match response.bytes().await {
            Ok(b) => b,
            Err(e) => return Envelope::error(ErrorCode::ToolError, e.to_string()),
        };
        if body.len() > MAX_BODY_BYTES {
            return Envelope::error(ErrorCode::ToolError, "too_large");
        }

        let text = String::from_utf8_lossy(&body);
        Envelope::ok(json!({
            "title": title,
            "text": ratchet_security::sanitize(
                &text,
                ratchet_security::DEFAULT_CHAR_LIMIT,
                ratchet_security::DEFAULT_TOKEN_LIMIT,
            ),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(url: &str) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("url".into(), Value::from(url));
        map
    }

    #[tokio::test]
    async fn missing_url_argument() {
        let env = WebRead::new().invoke(Map::new()).await;
        assert_eq!(env.outcome(), "missing_args");
    }

    #[tokio::test]
    async fn rejects_non_http_schemes() {
        let env = WebRead::new().invoke(args("ftp://files.example.com/x")).await;
        assert_eq!(env.outcome(), "bad_args");
        let env = WebRead::new().invoke(args("file:///etc/passwd")).await;
        assert_eq!(env.outcome(), "bad_args");
    }

    #[tokio::test]
    async fn rejects_unparseable_urls() {
        let env = WebRead::new().invoke(args("not a url")).await;
        assert_eq!(env.outcome(), "bad_args");
    }

    #[tokio::test]
    async fn blocks_localhost_and_private_ranges() {
        for url in [
            "http://localhost/admin",
            "http://127.0.0.1:8080/",
            "http://10.0.0.5/internal",
            "http://192.168.1.1/router",
            "http://172.16.0.1/",
            "http://[::1]/",
            "http://[fc00::1]/",
        ] {
            let env = WebRead::new().invoke(args(url)).await;
            assert_eq!(env.outcome(), "forbidden", "expected {url} to be blocked");
        }
    }

    #[test]
    fn public_hosts_pass_the_guard() {
        assert!(!host_is_blocked("example.com"));
        assert!(!host_is_blocked("93.184.216.34"));
    }
}
