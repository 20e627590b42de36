//! # Vision REST Client
//!
//! Session-based HTTP/XML client for the Vision asset-tracking API.
//!
//! ## Protocol
//!
//! - **Login**: POST an XML credentials document; the first `Set-Cookie`
//!   header (up to its first `;`) is the session token
//! - **Authenticated calls**: every request carries `Cookie`, and
//!   `Content-Type: application/xml`
//! - **Method override**: the server only accepts GET and POST, so PUT and
//!   DELETE are sent as POST with `X-Vision-REST-Method`
//!
//! Responses are XML; [`xml`] pulls single attributes out of them
//! (the `id` of a created asset, the `tagid` of a found tag).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod resources;
pub mod session;
pub mod workflow;
pub mod xml;

pub use client::{ClientError, Verb, VisionClient, VisionClientConfig, METHOD_OVERRIDE_HEADER};
pub use resources::{AssetId, TagId};
pub use session::Session;
pub use workflow::{Step, TemplateSource, Workflow, WorkflowContext, WorkflowError};
pub use xml::{
    extract_attribute, inject_attribute, list_matching_elements, root_attribute, Element,
    XmlError,
};
