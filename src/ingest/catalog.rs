//! Product catalog served by the shop backend.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::core::config::ScrapingConfig;
use crate::core::errors::{AgentError, AgentResult};
use crate::corpus::document::{Document, DocumentAttributes, DocumentKind};

/// A bike as listed by `GET /api/bikes/all`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Bike {
    /// Backend identifier.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Price in dollars.
    pub price: Option<f64>,
    /// Image URL.
    pub image: Option<String>,
    /// Manufacturer.
    pub brand: Option<String>,
    /// Bike type, e.g. `Sport`.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Model year.
    pub year: Option<String>,
    /// Engine capacity.
    pub capacity: Option<String>,
    /// Drive mode.
    pub drive_mode: Option<String>,
    /// Technology highlights.
    pub technology: Option<String>,
    /// Free-form description.
    pub description: Option<String>,
}

impl Bike {
    /// Product document for this bike under `website_base_url`.
    #[must_use]
    pub fn to_document(&self, website_base_url: &str) -> Document {
        let url = format!("{}/product/{}", website_base_url.trim_end_matches('/'), self.id);
        let brand = self.brand.clone().unwrap_or_default();
        let kind = self.kind.clone().unwrap_or_default();
        let price = self.price.map(|p| format!("${p}"));

        let mut content = format!(
            "Brand: {brand}, Type: {kind}, Price: {}, Description: {}",
            price.as_deref().unwrap_or("N/A"),
            self.description.as_deref().unwrap_or_default()
        );
        for (label, value) in [
            ("Engine", &self.capacity),
            ("Drive mode", &self.drive_mode),
            ("Technology", &self.technology),
        ] {
            if let Some(value) = value.as_deref().filter(|v| !v.trim().is_empty()) {
                content.push_str(&format!(", {label}: {value}"));
            }
        }

        Document::page(url, format!("Product: {}", self.name), content)
            .with_kind(DocumentKind::Product)
            .with_attributes(DocumentAttributes {
                brand: self.brand.clone(),
                model: Some(self.name.clone()),
                category: self.kind.clone(),
                price,
                engine_size: self.capacity.clone(),
                year: self.year.clone(),
                description: self.description.clone(),
                ..DocumentAttributes::default()
            })
    }
}

/// Client for the shop backend's bike listing.
pub struct ProductCatalog {
    client: reqwest::Client,
    backend_api_url: String,
    website_base_url: String,
}

impl ProductCatalog {
    /// Create a catalog client.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ScrapingConfig) -> AgentResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            backend_api_url: config.backend_api_url.trim_end_matches('/').to_string(),
            website_base_url: config.website_base_url.clone(),
        })
    }

    /// Fetch every listed bike.
    ///
    /// # Errors
    /// Returns an error if the request fails or the payload is not a bike list.
    pub async fn fetch_bikes(&self) -> AgentResult<Vec<Bike>> {
        let url = format!("{}/api/bikes/all", self.backend_api_url);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!("Backend API returned status {status}");
            return Err(AgentError::UpstreamStatus(status.as_u16()));
        }
        let bikes: Vec<Bike> = response.json().await?;
        debug!(count = bikes.len(), "Fetched bikes from backend");
        Ok(bikes)
    }

    /// Fetch every listed bike as a product document.
    ///
    /// # Errors
    /// Returns an error if the bikes cannot be fetched.
    pub async fn fetch_documents(&self) -> AgentResult<Vec<Document>> {
        Ok(self
            .fetch_bikes()
            .await?
            .iter()
            .map(|bike| bike.to_document(&self.website_base_url))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bike_payload_maps_to_product_document() {
        let payload = r#"[{
            "id": 12,
            "name": "Ninja ZX-10R",
            "price": 17399.0,
            "brand": "Kawasaki",
            "type": "Sport",
            "year": "2024",
            "capacity": "998cc",
            "driveMode": "Chain",
            "description": "WorldSBK homologation special"
        }]"#;
        let bikes: Vec<Bike> = serde_json::from_str(payload).unwrap_or_default();
        assert_eq!(bikes.len(), 1);

        let doc = bikes[0].to_document("http://localhost:5173/");
        assert_eq!(doc.url, "http://localhost:5173/product/12");
        assert_eq!(doc.title, "Product: Ninja ZX-10R");
        assert_eq!(doc.kind, DocumentKind::Product);
        assert!(doc.content.starts_with(
            "Brand: Kawasaki, Type: Sport, Price: $17399, Description: WorldSBK homologation special"
        ));
        assert!(doc.content.contains("Engine: 998cc"));
        assert_eq!(doc.attributes.category.as_deref(), Some("Sport"));
        assert_eq!(doc.attributes.price.as_deref(), Some("$17399"));
    }

    #[test]
    fn test_sparse_bike_still_maps() {
        let bike: Bike = serde_json::from_str(r#"{"id": 3, "name": "Scout"}"#).unwrap_or_default();
        let doc = bike.to_document("https://bigbikeblitz.com");
        assert_eq!(doc.url, "https://bigbikeblitz.com/product/3");
        assert!(doc.content.contains("Price: N/A"));
        assert!(doc.attributes.brand.is_none());
    }
}
