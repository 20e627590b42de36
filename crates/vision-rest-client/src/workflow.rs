//! Named step sequences run against a Vision server.
//!
//! A [`Workflow`] is an ordered list of [`Step`]s, usually deserialized from
//! JSON configuration. Values produced by one step (the new asset id, a tag
//! id, the free tag list) are carried to later steps in a
//! [`WorkflowContext`]. The run stops at the first failing step.

use super::client::{ClientError, VisionClient};
use super::resources::{AssetId, TagId};
use serde::Deserialize;
use std::collections::HashMap;

/// Supplies request bodies by template name.
pub trait TemplateSource {
    /// Return the template called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Template`] if the template is unavailable.
    fn template(&self, name: &str) -> Result<String, WorkflowError>;
}

impl TemplateSource for HashMap<String, String> {
    fn template(&self, name: &str) -> Result<String, WorkflowError> {
        self.get(name)
            .cloned()
            .ok_or_else(|| WorkflowError::Template(format!("unknown template {name:?}")))
    }
}

fn default_login_path() -> String {
    "/login".to_string()
}

/// One workflow step.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    /// Post the credentials template to the login endpoint.
    Login {
        /// Template holding the credentials document
        credentials: String,
        /// Login endpoint
        #[serde(default = "default_login_path")]
        path: String,
    },
    /// Create an asset from a template and remember its id.
    CreateAsset {
        /// Asset template
        template: String,
        /// Name stamped onto the template
        name: String,
    },
    /// Fetch the serial numbers of unbound tags.
    ListFreeTags,
    /// Look up a tag id by serial number and remember it.
    SearchTag {
        /// Tag serial number
        serial: String,
    },
    /// Bind a tag to an asset. Missing ids come from earlier steps.
    BindTag {
        /// Asset id; defaults to the asset created earlier
        #[serde(default)]
        asset_id: Option<String>,
        /// Tag id; defaults to the tag found earlier
        #[serde(default)]
        tag_id: Option<String>,
    },
    /// Bind a free tag, by serial number, to the asset created earlier.
    BindFreeTag {
        /// Tag serial number
        serial: String,
    },
    /// Fetch all assets.
    ListAssets,
    /// Fetch all event rules.
    ListRules,
    /// Create an event rule from a template.
    CreateRule {
        /// Rule template
        template: String,
    },
    /// Create an asset type from a template.
    CreateAssetType {
        /// Asset type template
        template: String,
    },
    /// Post a template to an arbitrary endpoint.
    SendMessage {
        /// Endpoint path, may include a query string
        path: String,
        /// Message template
        template: String,
    },
}

impl Step {
    /// Short step name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Login { .. } => "login",
            Self::CreateAsset { .. } => "create_asset",
            Self::ListFreeTags => "list_free_tags",
            Self::SearchTag { .. } => "search_tag",
            Self::BindTag { .. } => "bind_tag",
            Self::BindFreeTag { .. } => "bind_free_tag",
            Self::ListAssets => "list_assets",
            Self::ListRules => "list_rules",
            Self::CreateRule { .. } => "create_rule",
            Self::CreateAssetType { .. } => "create_asset_type",
            Self::SendMessage { .. } => "send_message",
        }
    }
}

/// Values passed between steps of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkflowContext {
    /// Asset created by the last `create_asset`
    pub asset_id: Option<AssetId>,
    /// Tag found by the last `search_tag`
    pub tag_id: Option<TagId>,
    /// Serial numbers from the last `list_free_tags`; `None` until one ran
    pub free_tags: Option<Vec<String>>,
    /// Raw response body of the last step that returned one
    pub last_response: Option<String>,
}

/// An ordered list of steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Workflow {
    /// Steps in execution order
    pub steps: Vec<Step>,
}

impl Workflow {
    /// Create a workflow from steps.
    #[must_use]
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    /// Run every step in order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Step`] naming the failed step.
    pub async fn run(
        &self,
        client: &mut VisionClient,
        templates: &dyn TemplateSource,
    ) -> Result<WorkflowContext, WorkflowError> {
        let mut ctx = WorkflowContext::default();

        for (index, step) in self.steps.iter().enumerate() {
            tracing::info!(index, step = step.name(), "Running step");
            run_step(step, client, templates, &mut ctx)
                .await
                .map_err(|source| {
                    tracing::error!(index, step = step.name(), error = %source, "Step failed");
                    WorkflowError::Step {
                        index,
                        step: step.name(),
                        source: Box::new(source),
                    }
                })?;
        }

        Ok(ctx)
    }
}

async fn run_step(
    step: &Step,
    client: &mut VisionClient,
    templates: &dyn TemplateSource,
    ctx: &mut WorkflowContext,
) -> Result<(), WorkflowError> {
    match step {
        Step::Login { credentials, path } => {
            let body = templates.template(credentials)?;
            client.login(path, &body).await?;
        }
        Step::CreateAsset { template, name } => {
            let body = templates.template(template)?;
            // Cleared first so a failure never leaves the previous id behind.
            ctx.asset_id = None;
            ctx.asset_id = Some(client.create_asset(&body, name).await?);
        }
        Step::ListFreeTags => {
            ctx.free_tags = None;
            ctx.free_tags = Some(client.list_free_tags().await?);
        }
        Step::SearchTag { serial } => {
            ctx.tag_id = None;
            ctx.tag_id = Some(client.search_tag(serial).await?);
        }
        Step::BindTag { asset_id, tag_id } => {
            let asset = asset_id
                .clone()
                .map(AssetId)
                .or_else(|| ctx.asset_id.clone())
                .ok_or(WorkflowError::MissingValue("asset_id"))?;
            let tag = tag_id
                .clone()
                .map(TagId)
                .or_else(|| ctx.tag_id.clone())
                .ok_or(WorkflowError::MissingValue("tag_id"))?;
            ctx.last_response = Some(client.bind_tag(&asset, &tag).await?);
        }
        Step::BindFreeTag { serial } => {
            let asset = ctx
                .asset_id
                .clone()
                .ok_or(WorkflowError::MissingValue("asset_id"))?;
            let free_tags = ctx
                .free_tags
                .as_ref()
                .ok_or(WorkflowError::MissingValue("free_tags"))?;
            if !free_tags.iter().any(|free| free == serial) {
                return Err(WorkflowError::TagNotFree(serial.clone()));
            }
            ctx.tag_id = None;
            let tag = client.search_tag(serial).await?;
            ctx.tag_id = Some(tag.clone());
            ctx.last_response = Some(client.bind_tag(&asset, &tag).await?);
        }
        Step::ListAssets => {
            ctx.last_response = Some(client.list_assets().await?);
        }
        Step::ListRules => {
            ctx.last_response = Some(client.list_event_rules().await?);
        }
        Step::CreateRule { template } => {
            let body = templates.template(template)?;
            ctx.last_response = Some(client.create_event_rule(&body).await?);
        }
        Step::CreateAssetType { template } => {
            let body = templates.template(template)?;
            ctx.last_response = Some(client.create_asset_type(&body).await?);
        }
        Step::SendMessage { path, template } => {
            let body = templates.template(template)?;
            ctx.last_response = Some(client.send_message(path, &body).await?);
        }
    }
    Ok(())
}

/// Errors that can occur while running a workflow.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// Client call failed
    #[error(transparent)]
    Client(#[from] ClientError),
    /// Template could not be loaded
    #[error("template error: {0}")]
    Template(String),
    /// A step needs a value no earlier step produced
    #[error("no {0} available from an earlier step")]
    MissingValue(&'static str),
    /// Serial number is not among the free tags
    #[error("tag {0} is not free")]
    TagNotFree(String),
    /// A step failed; wraps the cause
    #[error("step {index} ({step}) failed: {source}")]
    Step {
        /// Zero-based step position
        index: usize,
        /// Step name
        step: &'static str,
        /// Underlying error
        source: Box<WorkflowError>,
    },
}
