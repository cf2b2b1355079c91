use crate::error::ScrapeError;
use log::debug;
use std::collections::HashMap;
use std::time::Duration;

/// Anything that can hand back the HTML of a site-relative path.
pub trait PageSource {
    fn fetch(&self, path: &str) -> Result<String, ScrapeError>;
}

impl<T: PageSource + ?Sized> PageSource for &T {
    fn fetch(&self, path: &str) -> Result<String, ScrapeError> {
        (**self).fetch(path)
    }
}

/// Blocking HTTP fetches against the configured base URL. No retries.
#[derive(Debug, Clone)]
pub struct HttpSource {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl HttpSource {
    pub fn new(base_url: &str, user_agent: &str, timeout: Duration) -> Result<Self, ScrapeError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            base_url: base_url.to_string(),
            client,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl PageSource for HttpSource {
    fn fetch(&self, path: &str) -> Result<String, ScrapeError> {
        let url = self.url(path);
        debug!("GET {url}");
        let resp = self.client.get(&url).send()?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ScrapeError::Status {
                url,
                status: status.as_u16(),
            });
        }
        Ok(resp.text()?)
    }
}

/// Canned pages keyed by path, for tests and offline replays.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    pages: HashMap<String, String>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, path: impl Into<String>, html: impl Into<String>) -> Self {
        self.pages.insert(path.into(), html.into());
        self
    }
}

impl PageSource for StaticSource {
    fn fetch(&self, path: &str) -> Result<String, ScrapeError> {
        self.pages.get(path).cloned().ok_or_else(|| ScrapeError::Status {
            url: path.to_string(),
            status: 404,
        })
    }
}

pub fn profile_path(user: &str) -> String {
    format!("profile?user={user}")
}

pub fn race_path(user: &str, race_id: i64) -> String {
    format!("result?id=|tr:{user}|{race_id}")
}

pub fn history_path(user: &str, n: usize, start_date: Option<&str>) -> String {
    let mut query = vec![format!("user={user}"), format!("n={n}")];
    if let Some(date) = start_date {
        query.push(format!("startDate={date}"));
    }
    format!("race_history?{}", query.join("&"))
}
