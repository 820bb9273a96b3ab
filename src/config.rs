use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use regex::Regex;

use super::template::Substitutions;
use super::{Error, ErrorKind, Result};

/// Image repository for the inventory service
pub const INSTALLER_IMAGE_REPO: &str = "quay.io/ocpmetal/bm-inventory";
/// Image repository for the ui (also the containerized renderer)
pub const UI_IMAGE_REPO: &str = "quay.io/ocpmetal/ocp-metal-ui";
/// Evar holding a full image reference when no deploy tag is given
pub const SERVICE_IMAGE_EVAR: &str = "SERVICE";

/// Platform the manifests are deployed to
///
/// Only decides how externally reachable hostnames are resolved,
/// and whether an ingress is rendered for the ui.
#[derive(Clone, Debug, PartialEq)]
pub enum Target {
    Minikube,
    /// Openshift with an ingress controller
    OcIngress,
    Other(String),
}

impl FromStr for Target {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "minikube" => Target::Minikube,
            "oc-ingress" => Target::OcIngress,
            "" => bail!("target cannot be empty"),
            other => Target::Other(other.into()),
        })
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Target::Minikube => write!(f, "minikube"),
            Target::OcIngress => write!(f, "oc-ingress"),
            Target::Other(s) => write!(f, "{}", s),
        }
    }
}

/// Where templates are read from and rendered manifests written to
#[derive(Clone, Debug, PartialEq)]
pub struct Layout {
    /// Root of the templates (`./deploy`)
    pub source: PathBuf,
    /// Root of the rendered manifests (`./build`)
    pub build: PathBuf,
}

impl Default for Layout {
    fn default() -> Self {
        Layout {
            source: Path::new(".").join("deploy"),
            build: Path::new(".").join("build"),
        }
    }
}

impl Layout {
    /// Layout rooted at an explicit directory
    pub fn rooted<P: AsRef<Path>>(root: P) -> Self {
        Layout {
            source: root.as_ref().join("deploy"),
            build: root.as_ref().join("build"),
        }
    }

    pub fn src(&self, rel: &str) -> PathBuf {
        self.source.join(rel)
    }

    pub fn dst(&self, rel: &str) -> PathBuf {
        self.build.join(rel)
    }
}

/// Per invocation configuration
///
/// Assembled once in main from arguments and the environment, then passed down.
#[derive(Clone, Debug)]
pub struct Config {
    /// Namespace substituted into every template
    pub namespace: String,
    /// Image tag; empty means use `service_image`
    pub deploy_tag: String,
    /// Faster monitor intervals and local images
    pub subsystem_test: bool,
    pub target: Option<Target>,
    pub domain: Option<String>,
    /// Whether the namespace step does anything
    pub deploy_namespace: bool,
    /// Render but do not apply
    pub dry_run: bool,
    /// Full image reference from `$SERVICE`
    pub service_image: Option<String>,
    pub layout: Layout,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            namespace: "assisted-installer".into(),
            deploy_tag: "latest".into(),
            subsystem_test: false,
            target: None,
            domain: None,
            deploy_namespace: true,
            dry_run: false,
            service_image: None,
            layout: Layout::default(),
        }
    }
}

impl Config {
    /// Sanity check values that end up in kubernetes objects
    pub fn verify(&self) -> Result<()> {
        let dns_re = Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$")?;
        if self.namespace.len() > 63 || !dns_re.is_match(&self.namespace) {
            bail!("namespace '{}' is not a valid kubernetes namespace", self.namespace);
        }
        if self.deploy_tag.contains(char::is_whitespace) || self.deploy_tag.contains(':') {
            bail!("deploy tag '{}' is not a valid image tag", self.deploy_tag);
        }
        if let Some(d) = &self.domain {
            if d.is_empty() {
                bail!("domain cannot be empty when given");
            }
        }
        Ok(())
    }

    /// Image for the inventory service
    pub fn installer_image(&self) -> Result<String> {
        if !self.deploy_tag.is_empty() {
            return Ok(format!("{}:{}", INSTALLER_IMAGE_REPO, self.deploy_tag));
        }
        match &self.service_image {
            Some(img) if !img.is_empty() => Ok(img.clone()),
            _ => bail!(ErrorKind::MissingImage(SERVICE_IMAGE_EVAR.into())),
        }
    }

    /// Image for the ui when a tag is pinned
    pub fn ui_image(&self) -> Option<String> {
        if self.deploy_tag.is_empty() {
            None
        } else {
            Some(format!("{}:{}", UI_IMAGE_REPO, self.deploy_tag))
        }
    }

    pub fn wants_ingress(&self) -> bool {
        self.target == Some(Target::OcIngress)
    }

    /// Substitutions every template gets
    pub fn base_substitutions(&self) -> Substitutions {
        Substitutions::new().with("NAMESPACE", &self.namespace)
    }
}
