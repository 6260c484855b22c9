//! Recipe fetcher for the Mealie recipe manager API.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::config::Settings;
use crate::error::{RagError, Result};
use crate::recipe::Recipe;

/// Source of recipes for ingestion and lookups.
#[async_trait]
pub trait RecipeSource: Send + Sync {
    /// Fetches every recipe, fully materialized.
    async fn fetch_all(&self) -> Result<Vec<Recipe>>;

    /// Fetches a single recipe by slug or id; a miss is [`RagError::NotFound`].
    async fn fetch_recipe(&self, slug_or_id: &str) -> Result<Recipe>;
}

/// HTTP client for the Mealie `/api/recipes` endpoints.
#[derive(Clone)]
pub struct MealieClient {
    client: Client,
    api_url: Url,
    page_size: usize,
}

impl MealieClient {
    /// Builds a client for `api_url` (e.g. `http://localhost:9000/api/recipes`).
    pub fn new(
        api_url: &str,
        token: Option<&str>,
        page_size: usize,
        timeout: std::time::Duration,
    ) -> Result<Self> {
        let mut api_url = Url::parse(api_url)
            .map_err(|err| RagError::Configuration(format!("invalid Mealie API URL: {err}")))?;
        if api_url.cannot_be_a_base() {
            return Err(RagError::Configuration(format!(
                "Mealie API URL {api_url} cannot carry a path"
            )));
        }
        if let Ok(mut segments) = api_url.path_segments_mut() {
            segments.pop_if_empty();
        }

        let mut headers = HeaderMap::new();
        if let Some(token) = token.map(str::trim).filter(|token| !token.is_empty()) {
            let auth = format!("Bearer {token}");
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&auth)
                    .map_err(|_| RagError::Configuration("invalid Mealie token".into()))?,
            );
        }
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|err| {
                RagError::Configuration(format!("failed to build Mealie HTTP client: {err}"))
            })?;
        Ok(Self {
            client,
            api_url,
            page_size: page_size.max(1),
        })
    }

    /// Builds a client from the shared settings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(
            &settings.mealie_api_url,
            settings.mealie_token.as_deref(),
            settings.mealie_page_size,
            settings.http_timeout(),
        )
    }

    /// Walks the paginated listing one page number at a time.
    ///
    /// `next` is only read as a "more pages" flag; Mealie reports it relative
    /// to its API root, so it is never resolved as a URL.
    pub async fn list_summaries(&self) -> Result<Vec<RecipeSummary>> {
        let mut summaries = Vec::new();
        let mut page_no = 1;
        loop {
            let page = self.get_page(self.page_url(page_no)).await?;
            debug!(
                page = page_no,
                items = page.items.len(),
                total_pages = page.total_pages,
                "fetched recipe page"
            );
            let last = page.items.is_empty()
                || page.next.is_none()
                || page.total_pages.is_some_and(|total| page_no >= total);
            summaries.extend(page.items);
            if last || page.total.is_some_and(|total| summaries.len() >= total) {
                break;
            }
            page_no += 1;
        }
        Ok(summaries)
    }

    fn page_url(&self, page: usize) -> Url {
        let mut url = self.api_url.clone();
        let per_page = self.page_size.to_string();
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            // Mealie reads `perPage`; simpler stubs read `per_page`.
            .append_pair("perPage", &per_page)
            .append_pair("per_page", &per_page);
        url
    }

    async fn get_page(&self, url: Url) -> Result<RecipePage> {
        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|err| RagError::recipe_source(format!("failed to call {url}: {err}")))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(RagError::recipe_source(format!(
                "Mealie listing returned {status}: {body}"
            )));
        }
        resp.json()
            .await
            .map_err(|err| RagError::recipe_source(format!("failed to parse recipe page: {err}")))
    }

    fn detail_url(&self, slug_or_id: &str) -> Url {
        let mut url = self.api_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(slug_or_id);
        }
        url
    }
}

#[async_trait]
impl RecipeSource for MealieClient {
    async fn fetch_all(&self) -> Result<Vec<Recipe>> {
        let summaries = self.list_summaries().await?;
        info!(count = summaries.len(), "fetching full recipes");
        let mut recipes = Vec::with_capacity(summaries.len());
        for summary in &summaries {
            let key = if summary.slug.is_empty() {
                summary.id.as_deref().unwrap_or_default()
            } else {
                summary.slug.as_str()
            };
            recipes.push(self.fetch_recipe(key).await?);
        }
        info!(count = recipes.len(), "fetched recipes from Mealie");
        Ok(recipes)
    }

    async fn fetch_recipe(&self, slug_or_id: &str) -> Result<Recipe> {
        if slug_or_id.trim().is_empty() {
            return Err(RagError::NotFound(slug_or_id.to_string()));
        }
        let url = self.detail_url(slug_or_id);
        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|err| RagError::recipe_source(format!("failed to call {url}: {err}")))?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(RagError::NotFound(slug_or_id.to_string()));
        }
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(RagError::recipe_source(format!(
                "Mealie returned {status} for {slug_or_id}: {body}"
            )));
        }
        let detail: MealieRecipe = resp.json().await.map_err(|err| {
            RagError::recipe_source(format!("failed to parse recipe {slug_or_id}: {err}"))
        })?;
        Ok(detail.into_recipe())
    }
}

/// One page of the recipe listing.
#[derive(Debug, Deserialize)]
pub struct RecipePage {
    /// Recipe summaries on this page.
    #[serde(default)]
    pub items: Vec<RecipeSummary>,
    /// Total number of recipes.
    #[serde(default)]
    pub total: Option<usize>,
    /// Current page number.
    #[serde(default)]
    pub page: Option<usize>,
    /// Page size echoed by the server.
    #[serde(default, alias = "perPage")]
    pub per_page: Option<usize>,
    /// Number of pages at the current page size.
    #[serde(default, alias = "totalPages")]
    pub total_pages: Option<usize>,
    /// Link to the next page, absent on the last one.
    #[serde(default)]
    pub next: Option<String>,
    /// Link to the previous page.
    #[serde(default)]
    pub previous: Option<String>,
}

/// Listing entry; only identifies the recipe to fetch in full.
#[derive(Debug, Clone, Deserialize)]
pub struct RecipeSummary {
    /// Mealie identifier.
    #[serde(default)]
    pub id: Option<String>,
    /// URL slug.
    #[serde(default)]
    pub slug: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MealieRecipe {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    slug: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    rating: Option<f32>,
    #[serde(default)]
    recipe_category: Option<Vec<NamedRef>>,
    #[serde(default)]
    tags: Option<Vec<NamedRef>>,
    #[serde(default)]
    recipe_ingredient: Option<Vec<IngredientEntry>>,
    #[serde(default)]
    recipe_instructions: Option<Vec<InstructionEntry>>,
}

impl MealieRecipe {
    fn into_recipe(self) -> Recipe {
        let id = self.id.unwrap_or_else(|| self.slug.clone());
        Recipe {
            id,
            slug: self.slug,
            name: self.name,
            description: self
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            category: names(self.recipe_category),
            tags: names(self.tags),
            rating: self.rating,
            ingredients: self
                .recipe_ingredient
                .unwrap_or_default()
                .into_iter()
                .filter_map(IngredientEntry::into_line)
                .collect(),
            instructions: self
                .recipe_instructions
                .unwrap_or_default()
                .into_iter()
                .filter_map(InstructionEntry::into_line)
                .collect(),
        }
    }
}

fn names(refs: Option<Vec<NamedRef>>) -> Vec<String> {
    refs.unwrap_or_default()
        .into_iter()
        .map(NamedRef::into_name)
        .filter(|name| !name.is_empty())
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NamedRef {
    Plain(String),
    Object { name: String },
}

impl NamedRef {
    fn into_name(self) -> String {
        match self {
            Self::Plain(name) | Self::Object { name } => name.trim().to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IngredientEntry {
    Plain(String),
    Structured {
        #[serde(default)]
        display: Option<String>,
        #[serde(default, rename = "originalText")]
        original_text: Option<String>,
        #[serde(default)]
        note: Option<String>,
    },
}

impl IngredientEntry {
    fn into_line(self) -> Option<String> {
        let line = match self {
            Self::Plain(text) => Some(text),
            Self::Structured {
                display,
                original_text,
                note,
            } => [display, original_text, note]
                .into_iter()
                .flatten()
                .find(|text| !text.trim().is_empty()),
        }?;
        let line = line.trim();
        (!line.is_empty()).then(|| line.to_string())
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InstructionEntry {
    Plain(String),
    Step {
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        text: String,
    },
}

impl InstructionEntry {
    fn into_line(self) -> Option<String> {
        let line = match self {
            Self::Plain(text) => text.trim().to_string(),
            Self::Step { title, text } => match title.as_deref().map(str::trim) {
                Some(title) if !title.is_empty() => format!("{title}: {}", text.trim()),
                _ => text.trim().to_string(),
            },
        };
        (!line.is_empty()).then_some(line)
    }
}
