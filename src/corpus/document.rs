//! Corpus document model.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of a corpus document.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// Generic storefront page.
    #[default]
    Page,
    /// Product listing.
    Product,
    /// Category listing.
    Category,
    /// About page.
    About,
    /// Contact page.
    Contact,
    /// Help or FAQ page.
    Help,
    /// Anything else.
    #[serde(other)]
    Other,
}

impl DocumentKind {
    /// All kinds, in reporting order.
    pub const ALL: [Self; 7] = [
        Self::Page,
        Self::Product,
        Self::Category,
        Self::About,
        Self::Contact,
        Self::Help,
        Self::Other,
    ];

    /// Stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Page => "page",
            Self::Product => "product",
            Self::Category => "category",
            Self::About => "about",
            Self::Contact => "contact",
            Self::Help => "help",
            Self::Other => "other",
        }
    }

    /// Guess the kind of a storefront page from its URL path.
    #[must_use]
    pub fn from_url(url: &str) -> Self {
        let lower = url.to_lowercase();
        if lower.contains("/product") || lower.contains("/bike") {
            Self::Product
        } else if lower.contains("/categor") {
            Self::Category
        } else if lower.contains("/about") {
            Self::About
        } else if lower.contains("/contact") {
            Self::Contact
        } else if lower.contains("/help") || lower.contains("/faq") {
            Self::Help
        } else {
            Self::Page
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentKind {
    type Err = std::convert::Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value.trim().to_ascii_lowercase().as_str() {
            "page" => Self::Page,
            "product" => Self::Product,
            "category" => Self::Category,
            "about" => Self::About,
            "contact" => Self::Contact,
            "help" => Self::Help,
            _ => Self::Other,
        })
    }
}

/// Typed attributes attached to a document. All optional.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentAttributes {
    /// Manufacturer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    /// Model name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Category label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Display price, e.g. `$17,995`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    /// Engine displacement, e.g. `999cc`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_size: Option<String>,
    /// Power output, e.g. `205 HP`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub horsepower: Option<String>,
    /// Model year.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    /// Meta description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Meta keywords.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
    /// Meta author.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

impl DocumentAttributes {
    /// Present attribute values, in declaration order.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        [
            &self.brand,
            &self.model,
            &self.category,
            &self.price,
            &self.engine_size,
            &self.horsepower,
            &self.year,
            &self.description,
            &self.keywords,
            &self.author,
        ]
        .into_iter()
        .filter_map(|value| value.as_deref())
    }

    /// Whether no attribute is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values().next().is_none()
    }
}

/// A searchable corpus entry keyed by its source URL.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Source URL, unique within a corpus.
    pub url: String,
    /// Title.
    #[serde(default)]
    pub title: String,
    /// Body text.
    #[serde(default)]
    pub content: String,
    /// Document kind.
    #[serde(default, rename = "type")]
    pub kind: DocumentKind,
    /// Kind-specific attributes.
    #[serde(default, flatten)]
    pub attributes: DocumentAttributes,
    /// First time the URL was ingested.
    #[serde(default = "Utc::now")]
    pub scraped_at: DateTime<Utc>,
    /// Last time the content changed.
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Build a page document.
    #[must_use]
    pub fn page(url: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            url: url.into(),
            title: title.into(),
            content: content.into(),
            kind: DocumentKind::Page,
            attributes: DocumentAttributes::default(),
            scraped_at: now,
            updated_at: now,
        }
    }

    /// Set the kind.
    #[must_use]
    pub const fn with_kind(mut self, kind: DocumentKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the attributes.
    #[must_use]
    pub fn with_attributes(mut self, attributes: DocumentAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Text searched by the substring strategy and embedded by the semantic one.
    #[must_use]
    pub fn searchable_text(&self) -> String {
        let mut text = String::with_capacity(self.title.len() + self.content.len() + 64);
        text.push_str(&self.title);
        text.push('\n');
        text.push_str(&self.content);
        for value in self.attributes.values() {
            text.push('\n');
            text.push_str(value);
        }
        text
    }

    /// Whether `other` differs in anything but timestamps.
    #[must_use]
    pub fn differs_materially(&self, other: &Self) -> bool {
        self.title.trim() != other.title.trim()
            || self.content.trim() != other.content.trim()
            || self.kind != other.kind
            || self.attributes != other.attributes
    }
}

/// A document matched by a query.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SearchResult {
    /// Matched document.
    pub document: Document,
    /// Similarity in `[0, 1]` for the semantic strategy; `None` for substring matches.
    pub score: Option<f64>,
}

impl SearchResult {
    /// Wrap an unscored match.
    #[must_use]
    pub const fn unscored(document: Document) -> Self {
        Self {
            document,
            score: None,
        }
    }
}

/// Citation of a document used as context for a reply.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    /// Document title.
    pub title: String,
    /// Document URL.
    pub url: String,
}

impl From<&Document> for SourceRef {
    fn from(document: &Document) -> Self {
        Self {
            title: document.title.clone(),
            url: document.url.clone(),
        }
    }
}

/// Result of an upsert.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    /// A new URL was stored.
    Added,
    /// An existing URL changed materially and was replaced in place.
    Updated,
    /// An existing URL was unchanged.
    Unchanged,
}

impl UpsertOutcome {
    /// Stable string form used in the corpus action log.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
        }
    }
}

/// Corpus statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CorpusStats {
    /// Total documents.
    pub total_documents: usize,
    /// Counts keyed by kind.
    pub by_type: BTreeMap<String, usize>,
    /// Active retrieval strategy.
    pub strategy: String,
}
