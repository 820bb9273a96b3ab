use std::path::Path;
use std::process::Command;

use regex::Regex;
use serde_json;

use super::config::Target;
use super::{ErrorKind, Result};

/// Cluster side effects of a deploy
///
/// Implemented by `Kubectl`; the deploy steps only ever see this trait.
pub trait Cluster {
    /// Apply a rendered manifest file
    fn apply(&self, pth: &Path) -> Result<()>;

    /// Externally reachable hostname of a service
    ///
    /// Resolution depends on the target: `minikube service --url` for minikube (or no
    /// target), `<svc>.<domain>` for oc-ingress, and the service's load balancer
    /// status for anything else. The ui step only asks on oc-ingress; the other
    /// branches are there for callers deploying to other platforms.
    fn service_host(&self, svc: &str, target: Option<&Target>, domain: Option<&str>, ns: &str) -> Result<String>;
}

fn kout(args: Vec<String>) -> Result<String> {
    tool_out("kubectl", args)
}

fn mout(args: Vec<String>) -> Result<String> {
    tool_out("minikube", args)
}

/// Run a cli tool to completion and return its stdout
pub(crate) fn tool_out(tool: &str, args: Vec<String>) -> Result<String> {
    debug!("{} {}", tool, args.join(" "));
    let s = Command::new(tool).args(&args).output().map_err(|e| {
        error!("Failed to run {}. Is {} installed?", tool, tool);
        e
    })?;
    let out: String = String::from_utf8_lossy(&s.stdout).into();
    let err: String = String::from_utf8_lossy(&s.stderr).trim().into();
    if !err.is_empty() {
        warn!("{} {} stderr: {}", tool, args.join(" "), err);
    }
    if !s.status.success() {
        bail!(ErrorKind::SubprocessFailure(tool.into(), s.status.code().unwrap_or(1001)));
    }
    Ok(out)
}

/// Host part of a url as printed by `minikube service --url`
pub fn host_from_url(url: &str) -> Option<String> {
    let url_re = Regex::new(r"^[a-z][a-z0-9+.-]*://([^:/\s]+)").ok()?;
    url_re.captures(url.trim()).map(|c| c[1].to_string())
}

// Subset of a kubernetes Service
#[derive(Deserialize, Default)]
struct Service {
    #[serde(default)]
    status: ServiceStatus,
}
#[derive(Deserialize, Default)]
#[allow(non_snake_case)]
struct ServiceStatus {
    #[serde(default)]
    loadBalancer: LoadBalancerStatus,
}
#[derive(Deserialize, Default)]
struct LoadBalancerStatus {
    #[serde(default)]
    ingress: Vec<LoadBalancerIngress>,
}
#[derive(Deserialize)]
struct LoadBalancerIngress {
    hostname: Option<String>,
    ip: Option<String>,
}

/// First load balancer hostname (or ip) from `kubectl get service -o json`
pub fn host_from_service_json(json: &str) -> Result<Option<String>> {
    let svc: Service = serde_json::from_str(json)?;
    let host = svc.status.loadBalancer.ingress.into_iter()
        .filter_map(|i| i.hostname.or(i.ip))
        .find(|h| !h.is_empty());
    Ok(host)
}

// Subset of an openshift IngressController
#[derive(Deserialize, Default)]
struct IngressController {
    #[serde(default)]
    status: IngressControllerStatus,
}
#[derive(Deserialize, Default)]
struct IngressControllerStatus {
    domain: Option<String>,
}

/// Apps domain from `kubectl get ingresscontroller -o json`
pub fn domain_from_ingresscontroller_json(json: &str) -> Result<Option<String>> {
    let ic: IngressController = serde_json::from_str(json)?;
    Ok(ic.status.domain.filter(|d| !d.is_empty()))
}

/// `kubectl` (and `minikube`) backed cluster
#[derive(Clone, Debug, Default)]
pub struct Kubectl;

impl Kubectl {
    /// Default apps domain of an openshift cluster
    pub fn ingress_domain(&self) -> Result<String> {
        let args = vec![
            "get".into(),
            "ingresscontroller".into(),
            "default".into(),
            "-n=openshift-ingress-operator".into(),
            "-ojson".into(),
        ];
        match domain_from_ingresscontroller_json(&kout(args)?)? {
            Some(d) => Ok(d),
            None => bail!("default ingresscontroller has no domain in its status"),
        }
    }

    fn minikube_host(&self, svc: &str, ns: &str) -> Result<Option<String>> {
        let args = vec![
            "service".into(),
            "--url".into(),
            svc.into(),
            "-n".into(),
            ns.into(),
        ];
        let out = mout(args)?;
        Ok(out.lines().filter_map(host_from_url).next())
    }

    fn loadbalancer_host(&self, svc: &str, ns: &str) -> Result<Option<String>> {
        let args = vec![
            "get".into(),
            "service".into(),
            svc.into(),
            format!("-n={}", ns),
            "-ojson".into(),
        ];
        host_from_service_json(&kout(args)?)
    }
}

impl Cluster for Kubectl {
    fn apply(&self, pth: &Path) -> Result<()> {
        let applyargs = vec![
            "apply".into(),
            "-f".into(),
            pth.display().to_string(),
        ];
        let out = kout(applyargs)?;
        print!("{}", out); // always print kube output from this
        if out.contains("unchanged") {
            debug!("{} unchanged", pth.display());
        }
        Ok(())
    }

    fn service_host(&self, svc: &str, target: Option<&Target>, domain: Option<&str>, ns: &str) -> Result<String> {
        let host = match target {
            None | Some(Target::Minikube) => self.minikube_host(svc, ns)?,
            Some(Target::OcIngress) => {
                let d = match domain {
                    Some(d) => d.to_string(),
                    None => self.ingress_domain()?,
                };
                Some(format!("{}.{}", svc, d))
            }
            Some(Target::Other(_)) => self.loadbalancer_host(svc, ns)?,
        };
        match host {
            Some(h) => {
                debug!("Resolved {} to {}", svc, h);
                Ok(h)
            }
            None => bail!(ErrorKind::UnresolvedHost(svc.into())),
        }
    }
}
