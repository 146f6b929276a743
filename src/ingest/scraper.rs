//! Storefront page scraping.

use std::time::Duration;

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};
use url::Url;

use crate::core::config::ScrapingConfig;
use crate::core::errors::{AgentError, AgentResult};
use crate::corpus::document::{Document, DocumentAttributes, DocumentKind};

const DEFAULT_TITLE: &str = "BigBikeBlitz";

/// Blocks shorter than this are navigation chrome rather than content.
const MIN_BLOCK_CHARS: usize = 50;

const MAIN_SELECTORS: [&str; 8] = [
    "main",
    "[role='main']",
    ".main-content",
    ".content",
    "#content",
    "article",
    ".product-details",
    ".product-info",
];

const PRICE_SELECTORS: [&str; 5] = [".price", ".product-price", "[data-price]", ".cost", ".amount"];
const BRAND_SELECTORS: [&str; 4] = [".brand", ".product-brand", "[data-brand]", ".manufacturer"];
const MODEL_SELECTORS: [&str; 4] = [".model", ".product-model", "[data-model]", ".product-name"];

/// Fetches storefront pages and turns them into corpus documents.
pub struct PageScraper {
    client: reqwest::Client,
    config: ScrapingConfig,
}

impl PageScraper {
    /// Create a scraper.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ScrapingConfig) -> AgentResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Configured storefront page URLs.
    #[must_use]
    pub fn page_urls(&self) -> Vec<String> {
        self.config.page_urls()
    }

    /// Fetch `url` and extract a document.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid, the request fails, the server
    /// answers with a non-success status, or the page is too large.
    pub async fn scrape(&self, url: &str) -> AgentResult<Document> {
        info!("Scraping: {url}");
        let html = self.fetch_text(url).await?;
        let document = extract_document(&html, url);
        debug!(url, chars = document.content.len(), "Extracted page");
        Ok(document)
    }

    /// Page URLs listed by the storefront sitemap, same host only.
    ///
    /// Returns an empty list when discovery is disabled.
    ///
    /// # Errors
    /// Returns an error if the sitemap cannot be fetched.
    pub async fn sitemap_urls(&self) -> AgentResult<Vec<String>> {
        let Some(sitemap) = self.config.sitemap_url() else {
            return Ok(Vec::new());
        };
        let xml = self.fetch_text(&sitemap).await?;
        let mut urls = extract_sitemap_urls(&xml, &self.config.website_base_url);
        urls.truncate(self.config.max_sitemap_urls);
        debug!(sitemap, pages = urls.len(), "Read sitemap");
        Ok(urls)
    }

    async fn fetch_text(&self, url: &str) -> AgentResult<String> {
        Url::parse(url)?;
        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, self.config.random_user_agent())
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::UpstreamStatus(status.as_u16()));
        }
        if let Some(len) = response.content_length() {
            if usize::try_from(len).unwrap_or(usize::MAX) > self.config.max_content_length {
                return Err(AgentError::Extraction(format!("content too large: {len} bytes")));
            }
        }

        let body = response.text().await?;
        if body.len() > self.config.max_content_length {
            return Err(AgentError::Extraction(format!(
                "content too large: {} bytes",
                body.len()
            )));
        }
        Ok(body)
    }
}

/// `<loc>` entries of a sitemap that live on the same host as `base_url`, deduplicated
/// in document order.
#[must_use]
pub fn extract_sitemap_urls(xml: &str, base_url: &str) -> Vec<String> {
    let Ok(base) = Url::parse(base_url) else {
        return Vec::new();
    };
    let Ok(selector) = Selector::parse("loc") else {
        return Vec::new();
    };

    let mut urls: Vec<String> = Vec::new();
    for loc in Html::parse_document(xml).select(&selector) {
        let text = collapse_whitespace(&loc.text().collect::<String>());
        let same_host = Url::parse(&text)
            .is_ok_and(|url| url.host_str() == base.host_str() && url.port() == base.port());
        if same_host && !urls.contains(&text) {
            urls.push(text);
        }
    }
    urls
}

/// Build a document from raw HTML.
#[must_use]
pub fn extract_document(html: &str, url: &str) -> Document {
    let page = Html::parse_document(html);
    let kind = DocumentKind::from_url(url);

    let mut attributes = DocumentAttributes {
        description: meta_content(&page, "description"),
        keywords: meta_content(&page, "keywords"),
        author: meta_content(&page, "author"),
        ..DocumentAttributes::default()
    };
    if kind == DocumentKind::Product {
        attributes.price = first_text(&page, &PRICE_SELECTORS);
        attributes.brand = first_text(&page, &BRAND_SELECTORS);
        attributes.model = first_text(&page, &MODEL_SELECTORS);
    }

    Document::page(url, extract_title(&page), extract_main_text(&page))
        .with_kind(kind)
        .with_attributes(attributes)
}

fn extract_title(page: &Html) -> String {
    Selector::parse("title")
        .ok()
        .and_then(|selector| {
            page.select(&selector)
                .next()
                .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        })
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| DEFAULT_TITLE.to_string())
}

fn meta_content(page: &Html, name: &str) -> Option<String> {
    let selector = Selector::parse("meta[name]").ok()?;
    page.select(&selector)
        .filter(|el| {
            el.value()
                .attr("name")
                .is_some_and(|n| n.eq_ignore_ascii_case(name))
        })
        .find_map(|el| el.value().attr("content"))
        .map(str::trim)
        .filter(|content| !content.is_empty())
        .map(ToString::to_string)
}

fn first_text(page: &Html, selectors: &[&str]) -> Option<String> {
    selectors.iter().find_map(|raw| {
        let selector = Selector::parse(raw).ok()?;
        let element = page.select(&selector).next()?;
        let text = collapse_whitespace(&visible_text(element));
        (!text.is_empty()).then_some(text)
    })
}

fn extract_main_text(page: &Html) -> String {
    let mut blocks: Vec<String> = Vec::new();
    for raw in MAIN_SELECTORS {
        let Ok(selector) = Selector::parse(raw) else {
            continue;
        };
        for element in page.select(&selector) {
            let text = collapse_whitespace(&visible_text(element));
            if text.chars().count() > MIN_BLOCK_CHARS && !blocks.contains(&text) {
                blocks.push(text);
            }
        }
    }

    if blocks.is_empty() {
        let body = Selector::parse("body")
            .ok()
            .and_then(|selector| page.select(&selector).next().map(visible_text));
        if let Some(text) = body {
            blocks.push(collapse_whitespace(&text));
        }
    }

    collapse_whitespace(&blocks.join(" "))
}

/// Text of an element without script and style contents.
fn visible_text(element: ElementRef<'_>) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for node in element.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| matches!(el.name(), "script" | "style" | "noscript"))
        });
        let trimmed = text.trim();
        if !hidden && !trimmed.is_empty() {
            parts.push(trimmed);
        }
    }
    parts.join(" ")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRODUCT_PAGE: &str = r#"
        <html>
          <head>
            <title> Yamaha R1 | BigBikeBlitz </title>
            <meta name="Description" content="Track-bred superbike">
            <meta name="keywords" content="yamaha, r1, superbike">
            <script>var tracking = "should not appear";</script>
          </head>
          <body>
            <nav>Home Shop Cart</nav>
            <main>
              <h1 class="product-name">YZF-R1</h1>
              <span class="brand">Yamaha</span>
              <span class="price">$17,999</span>
              <p>The R1 carries a crossplane   crankshaft engine derived from MotoGP
                 and a full electronics suite.</p>
              <style>.price { color: red; }</style>
            </main>
          </body>
        </html>"#;

    #[test]
    fn test_extracts_product_page() {
        let doc = extract_document(PRODUCT_PAGE, "http://localhost:5173/product/7");

        assert_eq!(doc.kind, DocumentKind::Product);
        assert_eq!(doc.title, "Yamaha R1 | BigBikeBlitz");
        assert!(doc.content.contains("crossplane crankshaft engine"));
        assert!(!doc.content.contains("should not appear"));
        assert!(!doc.content.contains("color: red"));
        assert!(!doc.content.contains("Cart"));
        assert_eq!(doc.attributes.price.as_deref(), Some("$17,999"));
        assert_eq!(doc.attributes.brand.as_deref(), Some("Yamaha"));
        assert_eq!(doc.attributes.model.as_deref(), Some("YZF-R1"));
        assert_eq!(doc.attributes.description.as_deref(), Some("Track-bred superbike"));
        assert_eq!(doc.attributes.keywords.as_deref(), Some("yamaha, r1, superbike"));
    }

    #[test]
    fn test_short_page_falls_back_to_body() {
        let html = "<html><body><p>Call us</p><p>Mon-Fri</p></body></html>";
        let doc = extract_document(html, "http://localhost:5173/contact");

        assert_eq!(doc.kind, DocumentKind::Contact);
        assert_eq!(doc.title, DEFAULT_TITLE);
        assert_eq!(doc.content, "Call us Mon-Fri");
        assert!(doc.attributes.price.is_none());
    }

    #[tokio::test]
    async fn test_scrape_rejects_invalid_url() {
        let Ok(scraper) = PageScraper::new(&ScrapingConfig::default()) else {
            panic!("client");
        };
        assert!(matches!(scraper.scrape("not a url").await, Err(AgentError::Url(_))));
    }

    #[test]
    fn test_sitemap_keeps_same_host_pages_once() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
              <url><loc> http://localhost:5173/product/1 </loc></url>
              <url><loc>http://localhost:5173/financing</loc></url>
              <url><loc>http://localhost:5173/product/1</loc></url>
              <url><loc>https://cdn.example.com/banner</loc></url>
              <url><loc>not a url</loc></url>
            </urlset>"#;

        let urls = extract_sitemap_urls(xml, "http://localhost:5173");
        assert_eq!(
            urls,
            vec![
                "http://localhost:5173/product/1".to_string(),
                "http://localhost:5173/financing".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_sitemap_disabled_lists_nothing() {
        let config = ScrapingConfig {
            sitemap_path: None,
            ..ScrapingConfig::default()
        };
        let Ok(scraper) = PageScraper::new(&config) else {
            panic!("client");
        };
        assert!(matches!(scraper.sitemap_urls().await, Ok(urls) if urls.is_empty()));
    }
}
