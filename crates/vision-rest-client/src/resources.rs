//! Typed Vision resource operations.
//!
//! Thin wrappers over [`VisionClient::request`] for the endpoints the asset
//! tooling uses: assets, tags, event rules, asset types and tag messages.

use super::client::{ClientError, VisionClient};
use super::xml::{empty_element, inject_attribute, list_matching_elements, root_attribute};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::fmt;

/// Characters escaped when an id is used as a path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'/')
    .add(b'\\');

/// Server-assigned asset identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetId(pub String);

/// Server-side tag identifier (`tagid`), distinct from the printed serial number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TagId(pub String);

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Body posted to `/assets/{id}/tag` to bind a tag.
#[must_use]
pub fn bind_body(tag: &TagId) -> String {
    empty_element("tag", &[("_method", "PUT"), ("id", tag.0.as_str())])
}

/// Body posted to `/tags/search`.
#[must_use]
pub fn search_body(serial: &str) -> String {
    empty_element("search", &[("text", serial)])
}

/// Serial numbers of tags not bound to any asset.
///
/// # Errors
///
/// Returns error if the listing is not well-formed XML.
pub fn free_tag_serials(tags_xml: &str) -> Result<Vec<String>, ClientError> {
    let free = list_matching_elements(tags_xml, "tag", |tag| !tag.has_attribute("assetId"))?;
    Ok(free
        .iter()
        .filter_map(|tag| tag.attribute("serialnumber"))
        .map(str::to_string)
        .collect())
}

impl VisionClient {
    /// Create an asset from `template`, named `name`.
    ///
    /// The name goes into the `value` attribute of the template's first
    /// `property` element.
    ///
    /// # Errors
    ///
    /// Returns error if the template or response cannot be parsed, or on
    /// network or API errors.
    pub async fn create_asset(&self, template: &str, name: &str) -> Result<AssetId, ClientError> {
        let body = inject_attribute(template, "property", "value", name)?;
        let response = self.post("/assets", &body).await?;
        let id = AssetId(root_attribute(&response, "id")?);
        tracing::info!(name, asset_id = %id, "Created asset");
        Ok(id)
    }

    /// List all assets.
    ///
    /// # Errors
    ///
    /// Returns error on network or API errors.
    pub async fn list_assets(&self) -> Result<String, ClientError> {
        self.get("/assets").await
    }

    /// List all tags.
    ///
    /// # Errors
    ///
    /// Returns error on network or API errors.
    pub async fn list_tags(&self) -> Result<String, ClientError> {
        self.get("/tags").await
    }

    /// Serial numbers of all tags without an asset.
    ///
    /// # Errors
    ///
    /// Returns error if the listing cannot be parsed, or on network or API
    /// errors.
    pub async fn list_free_tags(&self) -> Result<Vec<String>, ClientError> {
        let tags = self.list_tags().await?;
        let free = free_tag_serials(&tags)?;
        tracing::info!(count = free.len(), "Listed free tags");
        Ok(free)
    }

    /// Look up a tag by serial number.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Parse`] if the search found no tag, or on
    /// network or API errors.
    pub async fn search_tag(&self, serial: &str) -> Result<TagId, ClientError> {
        let response = self.post("/tags/search", &search_body(serial)).await?;
        let tag = TagId(crate::xml::extract_attribute(&response, "tag", "tagid")?);
        tracing::info!(serial, tag_id = %tag, "Found tag");
        Ok(tag)
    }

    /// Bind `tag` to `asset`.
    ///
    /// # Errors
    ///
    /// Returns error on network or API errors.
    pub async fn bind_tag(&self, asset: &AssetId, tag: &TagId) -> Result<String, ClientError> {
        let path = format!("/assets/{}/tag", utf8_percent_encode(&asset.0, PATH_SEGMENT));
        let response = self.post(&path, &bind_body(tag)).await?;
        tracing::info!(asset_id = %asset, tag_id = %tag, "Bound tag");
        Ok(response)
    }

    /// List all event rules.
    ///
    /// # Errors
    ///
    /// Returns error on network or API errors.
    pub async fn list_event_rules(&self) -> Result<String, ClientError> {
        self.get("/eventRules").await
    }

    /// Create an event rule from an XML definition.
    ///
    /// # Errors
    ///
    /// Returns error on network or API errors.
    pub async fn create_event_rule(&self, rule: &str) -> Result<String, ClientError> {
        self.post("/eventRules", rule).await
    }

    /// Create an asset type from an XML definition.
    ///
    /// # Errors
    ///
    /// Returns error on network or API errors.
    pub async fn create_asset_type(&self, asset_type: &str) -> Result<String, ClientError> {
        self.post("/assetTypes", asset_type).await
    }

    /// Post an arbitrary message (event search, tag message, test email).
    ///
    /// # Errors
    ///
    /// Returns error on network or API errors.
    pub async fn send_message(&self, path: &str, message: &str) -> Result<String, ClientError> {
        self.post(path, message).await
    }
}
