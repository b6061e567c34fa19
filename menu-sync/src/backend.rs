//! REST boundary.
//!
//! [`MenuBackend`] is the contract the sync engine needs; [`HttpBackend`]
//! implements it over HTTP with reqwest.
//!
//! | Operation    | Method | Path           | Body                    |
//! |--------------|--------|----------------|-------------------------|
//! | list         | GET    | `{base}`       | none                    |
//! | create       | POST   | `{base}`       | JSON item or multipart  |
//! | update       | PUT    | `{base}/{id}`  | JSON item or multipart  |
//! | delete       | DELETE | `{base}/{id}`  | none                    |
//! | bulk replace | POST   | bulk URL       | JSON array of items     |

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, Url};
use serde_json::Value;

use crate::config::SyncConfig;
use crate::error::BackendError;
use crate::model::{ItemId, MenuItem};

/// Result of a bulk replace.
#[derive(Debug, Clone, PartialEq)]
pub enum BulkOutcome {
    /// The server answered with its canonical collection.
    Canonical(Vec<MenuItem>),
    /// The server accepted the upload without returning a collection.
    Accepted,
}

/// Remote menu storage.
#[async_trait]
pub trait MenuBackend: Send + Sync {
    async fn list(&self) -> Result<Vec<MenuItem>, BackendError>;

    /// Persist a new item; returns the canonical record with its id.
    async fn create(&self, item: &MenuItem) -> Result<MenuItem, BackendError>;

    async fn update(&self, id: &ItemId, item: &MenuItem) -> Result<MenuItem, BackendError>;

    async fn delete(&self, id: &ItemId) -> Result<(), BackendError>;

    async fn bulk_replace(&self, items: &[MenuItem]) -> Result<BulkOutcome, BackendError>;
}

/// reqwest-backed [`MenuBackend`].
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
    bulk_url: Url,
    token: Option<String>,
}

impl HttpBackend {
    pub fn new(config: &SyncConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .user_agent("menu-sync")
            .build()
            .map_err(|e| transport("client", e))?;
        Ok(Self {
            client,
            base_url: parse_url(&config.base_url)?,
            bulk_url: parse_url(&config.bulk_url)?,
            token: config.token.clone(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn item_url(&self, id: &ItemId) -> Result<Url, BackendError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| BackendError::Transport {
                operation: "url",
                message: format!("{} cannot carry an item path", self.base_url),
            })?
            .pop_if_empty()
            .push(&id.to_string());
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.token {
            Some(ref token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// JSON body, or multipart when the item carries a new image.
    fn with_item_body(
        &self,
        request: RequestBuilder,
        item: &MenuItem,
    ) -> Result<RequestBuilder, BackendError> {
        if item.image_file.is_some() {
            Ok(request.multipart(multipart_form(item)?))
        } else {
            Ok(request.json(item))
        }
    }

    async fn send(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<Response, BackendError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| transport(operation, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status {
                operation,
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    async fn read_item(operation: &'static str, response: Response) -> Result<MenuItem, BackendError> {
        response
            .json::<MenuItem>()
            .await
            .map_err(|e| decode(operation, e))
    }
}

#[async_trait]
impl MenuBackend for HttpBackend {
    async fn list(&self) -> Result<Vec<MenuItem>, BackendError> {
        let response = self.send("list", self.client.get(self.base_url.clone())).await?;
        let body: Value = response.json().await.map_err(|e| decode("list", e))?;

        if !body.is_array() {
            log::warn!("List response was not an array; treating as empty");
            return Ok(Vec::new());
        }
        serde_json::from_value(body).map_err(|e| decode("list", e))
    }

    async fn create(&self, item: &MenuItem) -> Result<MenuItem, BackendError> {
        let request = self.with_item_body(self.client.post(self.base_url.clone()), item)?;
        let response = self.send("create", request).await?;
        let saved = Self::read_item("create", response).await?;
        if saved.id.is_none() {
            return Err(BackendError::MissingId);
        }
        Ok(saved)
    }

    async fn update(&self, id: &ItemId, item: &MenuItem) -> Result<MenuItem, BackendError> {
        let request = self.with_item_body(self.client.put(self.item_url(id)?), item)?;
        let response = self.send("update", request).await?;
        Self::read_item("update", response).await
    }

    async fn delete(&self, id: &ItemId) -> Result<(), BackendError> {
        self.send("delete", self.client.delete(self.item_url(id)?))
            .await
            .map(|_| ())
    }

    async fn bulk_replace(&self, items: &[MenuItem]) -> Result<BulkOutcome, BackendError> {
        let request = self.client.post(self.bulk_url.clone()).json(items);
        let response = self.send("bulk replace", request).await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| transport("bulk replace", e))?;

        // Anything other than an array means "accepted as sent".
        match serde_json::from_slice::<Value>(&body) {
            Ok(value @ Value::Array(_)) => serde_json::from_value(value)
                .map(BulkOutcome::Canonical)
                .map_err(|e| decode("bulk replace", e)),
            _ => Ok(BulkOutcome::Accepted),
        }
    }
}

/// Multipart fields: `name, price, category, available, description,
/// prepTimeMin, tags, image`.
fn multipart_form(item: &MenuItem) -> Result<Form, BackendError> {
    let mut form = Form::new()
        .text("name", item.name.clone())
        .text("price", item.price.unwrap_or(0.0).to_string())
        .text("category", item.category.clone().unwrap_or_default())
        .text("available", if item.available { "true" } else { "false" })
        .text("description", item.description.clone().unwrap_or_default())
        .text("prepTimeMin", item.prep_time_min.to_string())
        .text("tags", item.tags_joined());

    if let Some(ref image) = item.image_file {
        let part = Part::bytes(image.bytes.clone())
            .file_name(image.file_name.clone())
            .mime_str(&image.mime_type)
            .map_err(|e| transport("multipart", e))?;
        form = form.part("image", part);
    }
    Ok(form)
}

fn parse_url(raw: &str) -> Result<Url, BackendError> {
    Url::parse(raw).map_err(|e| BackendError::Transport {
        operation: "url",
        message: format!("{raw}: {e}"),
    })
}

fn transport(operation: &'static str, e: impl std::fmt::Display) -> BackendError {
    BackendError::Transport {
        operation,
        message: e.to_string(),
    }
}

fn decode(operation: &'static str, e: impl std::fmt::Display) -> BackendError {
    BackendError::Decode {
        operation,
        message: e.to_string(),
    }
}
