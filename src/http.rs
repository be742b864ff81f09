use anyhow::Context as _;
use reqwest::header::CONTENT_TYPE;
use url::Url;

use crate::config::HttpConfig;

#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::blocking::Client,
    retries: usize,
}

#[derive(Debug, Clone)]
pub struct Fetched {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl Fetched {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().starts_with("image"))
    }
}

impl HttpClient {
    pub fn new(config: &HttpConfig) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            retries: config.retries,
        })
    }

    pub fn client(&self) -> &reqwest::blocking::Client {
        &self.client
    }

    /// GET with a bounded retry on transport errors and 5xx responses.
    /// Non-success statuses are returned, not turned into errors.
    pub fn get(&self, url: &Url) -> anyhow::Result<Fetched> {
        self.get_with(url, None)
    }

    fn get_with(&self, url: &Url, bearer: Option<&str>) -> anyhow::Result<Fetched> {
        let attempts = self.retries.saturating_add(1);
        let mut last_err = None;

        for attempt in 0..attempts {
            match self.get_once(url, bearer) {
                Ok(fetched) if fetched.status >= 500 && attempt + 1 < attempts => {
                    tracing::debug!(
                        url = %url,
                        status = fetched.status,
                        attempt = attempt + 1,
                        attempts,
                        "server error; retrying"
                    );
                }
                Ok(fetched) => return Ok(fetched),
                Err(err) => {
                    tracing::debug!(
                        url = %url,
                        attempt = attempt + 1,
                        attempts,
                        err = %format!("{err:#}"),
                        "request failed"
                    );
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("GET {url}: no attempts made")))
    }

    pub fn get_json<T: serde::de::DeserializeOwned>(&self, url: &Url) -> anyhow::Result<T> {
        decode_json(url, self.get(url)?)
    }

    pub fn get_json_bearer<T: serde::de::DeserializeOwned>(
        &self,
        url: &Url,
        token: &str,
    ) -> anyhow::Result<T> {
        decode_json(url, self.get_with(url, Some(token))?)
    }

    fn get_once(&self, url: &Url, bearer: Option<&str>) -> anyhow::Result<Fetched> {
        let mut request = self.client.get(url.clone());
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        let response = request.send().with_context(|| format!("GET {url}"))?;
        fetched_from(url, response)
    }
}

pub(crate) fn fetched_from(
    url: &Url,
    response: reqwest::blocking::Response,
) -> anyhow::Result<Fetched> {
    let status = response.status().as_u16();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let body = response
        .bytes()
        .with_context(|| format!("read body: {url}"))?
        .to_vec();

    Ok(Fetched {
        status,
        content_type,
        body,
    })
}

pub(crate) fn decode_json<T: serde::de::DeserializeOwned>(
    url: &Url,
    fetched: Fetched,
) -> anyhow::Result<T> {
    if !fetched.is_success() {
        anyhow::bail!("{url}: status {}", fetched.status);
    }
    serde_json::from_slice(&fetched.body).with_context(|| format!("parse json from {url}"))
}

pub fn parse_remote_url(raw: &str) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let url = Url::parse(raw).ok()?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Some(url),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_remote_url_rejects_non_http_and_blank_inputs() {
        for raw in ["", "   ", "not a url", "ftp://example.com/a.jpg", "file:///tmp/a.jpg"] {
            assert!(parse_remote_url(raw).is_none(), "raw={raw:?}");
        }
        assert!(parse_remote_url(" https://covers.example.com/b/id/1-L.jpg ").is_some());
    }

    #[test]
    fn fetched_image_check_is_case_insensitive() {
        let fetched = Fetched {
            status: 200,
            content_type: Some("Image/JPEG".to_owned()),
            body: Vec::new(),
        };
        assert!(fetched.is_success());
        assert!(fetched.is_image());
    }
}
