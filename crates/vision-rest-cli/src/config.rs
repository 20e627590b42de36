//! Runner configuration.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;
use vision_rest_client::{VisionClientConfig, Workflow};

/// Runner configuration.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Vision server base URL
    pub server_url: String,

    /// Per-request timeout
    pub timeout: Duration,

    /// `Referer` header for authenticated calls
    pub referer: Option<String>,

    /// Directory holding request templates
    pub template_dir: PathBuf,

    /// Workflow to run when none is given on the command line
    pub workflow: Option<Workflow>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:7070".to_string(),
            timeout: Duration::from_secs(30),
            referer: None,
            template_dir: PathBuf::from("./templates"),
            workflow: None,
        }
    }
}

impl RunnerConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `VISION_SERVER_URL`: Vision server base URL
    /// - `VISION_TIMEOUT_SECS`: request timeout in seconds
    /// - `VISION_REFERER`: `Referer` header value, or `console` for the web console's
    /// - `VISION_TEMPLATE_DIR`: directory holding request templates
    /// - `VISION_WORKFLOW`: workflow steps as inline JSON
    /// - `VISION_WORKFLOW_PATH`: path to a JSON workflow file
    ///
    /// # Errors
    ///
    /// Returns error if a variable holds an invalid value.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(url) = lookup("VISION_SERVER_URL") {
            config.server_url = url;
        }
        let parsed = Url::parse(&config.server_url)
            .with_context(|| format!("Invalid VISION_SERVER_URL {:?}", config.server_url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            bail!("VISION_SERVER_URL must be http or https");
        }

        if let Some(secs) = lookup("VISION_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().context("Invalid VISION_TIMEOUT_SECS")?;
            config.timeout = Duration::from_secs(secs);
        }

        if let Some(referer) = lookup("VISION_REFERER") {
            config.referer = Some(referer);
        }

        if let Some(dir) = lookup("VISION_TEMPLATE_DIR") {
            config.template_dir = PathBuf::from(dir);
        }

        if let Some(json) = lookup("VISION_WORKFLOW") {
            config.workflow =
                Some(serde_json::from_str(&json).context("Invalid VISION_WORKFLOW JSON")?);
        } else if let Some(path) = lookup("VISION_WORKFLOW_PATH") {
            config.workflow = Some(load_workflow(Path::new(&path))?);
        }

        Ok(config)
    }

    /// Client configuration derived from this runner configuration.
    pub fn client_config(&self) -> VisionClientConfig {
        let config = VisionClientConfig {
            base_url: self.server_url.clone(),
            timeout: self.timeout,
            ..Default::default()
        };
        match self.referer.as_deref() {
            Some("console") => config.with_console_referer(),
            Some(referer) => VisionClientConfig {
                referer: Some(referer.to_string()),
                ..config
            },
            None => config,
        }
    }
}

/// Read a JSON workflow file.
pub fn load_workflow(path: &Path) -> Result<Workflow> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read workflow {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Invalid workflow {}", path.display()))
}
