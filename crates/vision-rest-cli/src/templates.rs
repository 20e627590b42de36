//! Request templates read from a directory.

use std::path::PathBuf;
use vision_rest_client::{TemplateSource, WorkflowError};

/// Template source backed by a directory. A template `name` is read from
/// `<dir>/<name>`, falling back to `<dir>/<name>.xml`.
#[derive(Debug, Clone)]
pub struct DirTemplates {
    dir: PathBuf,
}

impl DirTemplates {
    /// Serve templates from `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl TemplateSource for DirTemplates {
    fn template(&self, name: &str) -> Result<String, WorkflowError> {
        let exact = self.dir.join(name);
        let path = if exact.is_file() {
            exact
        } else {
            self.dir.join(format!("{name}.xml"))
        };

        tracing::debug!(name, path = %path.display(), "Loading template");

        std::fs::read_to_string(&path)
            .map_err(|e| WorkflowError::Template(format!("{}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_name_then_xml_suffix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("post.txt"), "<login/>").unwrap();
        std::fs::write(dir.path().join("assets.xml"), "<asset/>").unwrap();

        let templates = DirTemplates::new(dir.path());
        assert_eq!(templates.template("post.txt").unwrap(), "<login/>");
        assert_eq!(templates.template("assets").unwrap(), "<asset/>");
        assert_eq!(templates.template("assets.xml").unwrap(), "<asset/>");
    }

    #[test]
    fn demo_asset_template_takes_a_name() {
        let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/templates");
        let templates = DirTemplates::new(dir);
        let asset = templates.template("asset").unwrap();

        let named =
            vision_rest_client::inject_attribute(&asset, "property", "value", "kasset").unwrap();
        assert!(!named.starts_with("<?xml"));
        assert_eq!(
            vision_rest_client::extract_attribute(&named, "property", "value").unwrap(),
            "kasset"
        );
    }

    #[test]
    fn missing_template() {
        let dir = tempfile::tempdir().unwrap();
        let templates = DirTemplates::new(dir.path());
        assert!(matches!(
            templates.template("rule"),
            Err(WorkflowError::Template(_))
        ));
    }
}
