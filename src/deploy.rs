use std::path::{Path, PathBuf};

use super::config::{Config, UI_IMAGE_REPO};
use super::docker::ImageRenderer;
use super::kubectl::Cluster;
use super::patch::{self, env_entry, FieldOverride};
use super::template::{self, Substitutions};
use super::Result;

/// Object store endpoint baked into the scality configmap
pub const SCALITY_URL: &str = "http://cloudserver-front:8000";
/// Service the ui ingress points at
pub const UI_SERVICE: &str = "assisted-installer-ui";
pub const TEST_CLUSTER_MONITOR_INTERVAL: &str = "1s";
pub const TEST_HOST_MONITOR_INTERVAL: &str = "1s";

/// The container every inventory override targets
const INSTALLER_CONTAINER: &str = "spec.template.spec.containers[0]";

/// Hand a rendered manifest to the cluster unless this is a dry run
fn ship(conf: &Config, cluster: &dyn Cluster, dst: &Path) -> Result<()> {
    if conf.dry_run {
        info!("Rendered {} (dry run - not applying)", dst.display());
        return Ok(());
    }
    info!("Deploying {}", dst.display());
    cluster.apply(dst)
}

/// Render a text template and apply it
pub fn text(conf: &Config, cluster: &dyn Cluster, src: &Path, dst: &Path, subs: &Substitutions) -> Result<()> {
    template::render_text(src, dst, subs)?;
    ship(conf, cluster, dst)
}

/// The namespace everything else lives in
///
/// Returns `None` when namespace deployment is switched off.
pub fn namespace(conf: &Config, cluster: &dyn Cluster) -> Result<Option<PathBuf>> {
    if !conf.deploy_namespace {
        info!("Not deploying namespace");
        return Ok(None);
    }
    let src = conf.layout.src("namespace/namespace.yaml");
    let dst = conf.layout.dst("namespace.yaml");
    text(conf, cluster, &src, &dst, &conf.base_substitutions())?;
    Ok(Some(dst))
}

/// Default role for the service account
pub fn role(conf: &Config, cluster: &dyn Cluster) -> Result<PathBuf> {
    let src = conf.layout.src("roles/default_role.yaml");
    let dst = conf.layout.dst("default_role.yaml");
    text(conf, cluster, &src, &dst, &conf.base_substitutions())?;
    Ok(dst)
}

/// Configmap pointing the inventory at the scality object store
pub fn scality(conf: &Config, cluster: &dyn Cluster) -> Result<PathBuf> {
    let src = conf.layout.src("s3/scality-configmap.yaml");
    let dst = conf.layout.dst("scality-configmap.yaml");
    let subs = conf.base_substitutions().with("URL", SCALITY_URL);
    text(conf, cluster, &src, &dst, &subs)?;
    Ok(dst)
}

/// Field overrides for the inventory deployment
///
/// Image from the deploy tag (or `$SERVICE`), and in subsystem test mode:
/// fast monitor intervals plus locally loaded images.
pub fn installer_overrides(conf: &Config) -> Result<Vec<FieldOverride>> {
    let field = |f: &str| format!("{}.{}", INSTALLER_CONTAINER, f);
    let mut res = vec![FieldOverride::set(&field("image"), conf.installer_image()?)?];
    if conf.subsystem_test {
        res.push(FieldOverride::append(&field("env"), vec![
            env_entry("CLUSTER_MONITOR_INTERVAL", TEST_CLUSTER_MONITOR_INTERVAL),
            env_entry("HOST_MONITOR_INTERVAL", TEST_HOST_MONITOR_INTERVAL),
        ])?);
        res.push(FieldOverride::set(&field("imagePullPolicy"), "Never")?);
    } else {
        res.push(FieldOverride::set(&field("imagePullPolicy"), "Always")?);
    }
    Ok(res)
}

/// The inventory service deployment
pub fn installer(conf: &Config, cluster: &dyn Cluster) -> Result<PathBuf> {
    let src = conf.layout.src("bm-inventory.yaml");
    let dst = conf.layout.dst("bm-inventory.yaml");
    let overrides = installer_overrides(conf)?;
    patch::render_structured(&src, &dst, &conf.base_substitutions(), &overrides)?;
    ship(conf, cluster, &dst)?;
    Ok(dst)
}

/// Command run inside the ui image to produce its manifests
pub fn ui_render_cmd(conf: &Config) -> Vec<String> {
    let mut cmd = vec![
        "/deploy/deploy_config.sh".into(),
        "-n".into(),
        conf.namespace.clone(),
    ];
    if let Some(img) = conf.ui_image() {
        cmd.push("-i".into());
        cmd.push(img);
    }
    cmd
}

/// The ui, plus an ingress for it on openshift
///
/// The ui manifests come out of the ui image itself and are then
/// treated as a template. Returns every manifest rendered.
pub fn ui(conf: &Config, cluster: &dyn Cluster, renderer: &dyn ImageRenderer) -> Result<Vec<PathBuf>> {
    let dst = conf.layout.dst("deploy_ui.yaml");
    let generated = renderer.render(&format!("{}:latest", UI_IMAGE_REPO), ui_render_cmd(conf))?;
    template::write_rendered(&dst, &generated)?;
    text(conf, cluster, &dst, &dst, &conf.base_substitutions())?;
    let mut res = vec![dst];

    if conf.wants_ingress() {
        let src = conf.layout.src("ui/ui_ingress.yaml");
        let dst = conf.layout.dst("ui_ingress.yaml");
        let host = cluster.service_host(UI_SERVICE,
            conf.target.as_ref(), conf.domain.as_deref(), &conf.namespace)?;
        let subs = conf.base_substitutions().with("HOSTNAME", &host);
        text(conf, cluster, &src, &dst, &subs)?;
        res.push(dst);
    }
    Ok(res)
}
