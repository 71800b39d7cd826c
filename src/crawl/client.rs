//! Source-site crawl client
//!
//! Form login with a cookie-carried session, a finished-match listing over
//! a day window, and per-match transcript downloads. Everything behind the
//! `MatchSource` trait so the pipeline can run against a stub.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Marker in the landing page that proves the login succeeded
const WELCOME_MARKER: &str = "Welcome";

static EXPORT_HREF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"href="(/bg/export/(\d+))""#).expect("export href regex"));
static USER_HREF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"href="/bg/user/(\d+)""#).expect("user href regex"));

/// One finished match in the listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchLink {
    /// The site's match id, also the analyzed-matches key
    pub match_id: String,
    /// Site-relative transcript URL (`/bg/export/<matchId>`)
    pub url: String,
}

/// The boundary the crawl pipeline consumes
#[async_trait]
pub trait MatchSource: Send + Sync {
    /// Authenticate and return the site-side numeric user id discovered on
    /// the landing page.
    async fn login(&self, user: &str, password: &str) -> Result<Option<String>>;

    /// List finished matches of `user_id` within the last `days` days.
    async fn list_finished(&self, user_id: &str, days: u32) -> Result<Vec<MatchLink>>;

    /// Download one transcript.
    async fn download(&self, url: &str) -> Result<String>;
}

/// HTTP client against the real site
pub struct SiteClient {
    http: reqwest::Client,
    base: String,
}

impl SiteClient {
    pub fn new(base: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|e| Error::Site(format!("client build failed: {}", e)))?;
        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
        })
    }

    fn absolute(&self, url: &str) -> String {
        if url.starts_with("http") {
            url.to_string()
        } else {
            format!("{}{}", self.base, url)
        }
    }
}

#[async_trait]
impl MatchSource for SiteClient {
    async fn login(&self, user: &str, password: &str) -> Result<Option<String>> {
        let login_url = format!("{}/bg/login", self.base);
        let response = self
            .http
            .post(&login_url)
            .form(&[("login", user), ("password", password), ("save", "1")])
            .send()
            .await
            .map_err(|e| Error::Site(format!("login request failed: {}", e)))?;

        let body = response
            .text()
            .await
            .map_err(|e| Error::Site(format!("login response unreadable: {}", e)))?;

        if !body.contains(WELCOME_MARKER) {
            return Err(Error::Site("login rejected by the site".to_string()));
        }

        let user_id = USER_HREF
            .captures(&body)
            .map(|caps| caps[1].to_string());
        info!(user, found_user_id = user_id.is_some(), "site login succeeded");
        Ok(user_id)
    }

    async fn list_finished(&self, user_id: &str, days: u32) -> Result<Vec<MatchLink>> {
        let listing_url = format!("{}/bg/user/{}?days={}&finished=1", self.base, user_id, days);
        let body = self
            .http
            .get(&listing_url)
            .send()
            .await
            .map_err(|e| Error::Site(format!("listing request failed: {}", e)))?
            .text()
            .await
            .map_err(|e| Error::Site(format!("listing response unreadable: {}", e)))?;

        let links = scrape_export_links(&body);
        debug!(user_id, days, count = links.len(), "finished matches listed");
        Ok(links)
    }

    async fn download(&self, url: &str) -> Result<String> {
        let url = self.absolute(url);
        self.http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Site(format!("download failed: {}", e)))?
            .text()
            .await
            .map_err(|e| Error::Site(format!("transcript unreadable: {}", e)))
    }
}

/// Pull `/bg/export/<matchId>` hrefs out of a listing page, in page order,
/// dropping repeats.
pub fn scrape_export_links(html: &str) -> Vec<MatchLink> {
    let mut links: Vec<MatchLink> = Vec::new();
    for caps in EXPORT_HREF.captures_iter(html) {
        let link = MatchLink {
            match_id: caps[2].to_string(),
            url: caps[1].to_string(),
        };
        if !links.contains(&link) {
            links.push(link);
        }
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrapes_export_hrefs_in_page_order() {
        let html = r#"
            <tr><td><a href="/bg/export/4711">Export</a></td></tr>
            <tr><td><a href="/bg/game/999">Game</a></td></tr>
            <tr><td><a href="/bg/export/1234">Export</a></td></tr>
            <tr><td><a href="/bg/export/4711">Export again</a></td></tr>
        "#;
        let links = scrape_export_links(html);
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].match_id, "4711");
        assert_eq!(links[0].url, "/bg/export/4711");
        assert_eq!(links[1].match_id, "1234");
    }

    #[test]
    fn ignores_pages_without_export_links() {
        assert!(scrape_export_links("<html><body>empty</body></html>").is_empty());
    }

    #[test]
    fn user_href_regex_finds_the_profile_id() {
        let html = r#"Welcome back! <a href="/bg/user/31537">your page</a>"#;
        let caps = USER_HREF.captures(html).unwrap();
        assert_eq!(&caps[1], "31537");
    }
}
