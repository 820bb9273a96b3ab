#![allow(dead_code)]

use std::{cell::RefCell, path::{Path, PathBuf}, sync::Once};

use deploycat::{Cluster, Config, ErrorKind, ImageRenderer, Layout, Result, Target};

static START: Once = Once::new();

/// Initialise logging once for the whole test binary
pub fn setup() {
    START.call_once(|| {
        let _ = loggerv::init_with_verbosity(1);
        println!("Initializing tests - using fixtures in {}", fixtures().display());
    });
}

/// Directory holding the `deploy` template tree
pub fn fixtures() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures")
}

pub fn fixture(rel: &str) -> PathBuf {
    fixtures().join("deploy").join(rel)
}

/// Config reading fixtures and rendering into `build`
pub fn config(build: &Path) -> Config {
    Config {
        layout: Layout {
            source: Layout::rooted(fixtures()).source,
            build: build.to_path_buf(),
        },
        ..Default::default()
    }
}

/// Cluster that records what it was asked to do
#[derive(Default)]
pub struct FakeCluster {
    pub applied: RefCell<Vec<PathBuf>>,
    pub lookups: RefCell<Vec<(String, Option<Target>, Option<String>, String)>>,
    /// Every apply fails like a non-zero `kubectl apply`
    pub fail_apply: bool,
}

impl FakeCluster {
    pub fn failing() -> Self {
        FakeCluster { fail_apply: true, ..Default::default() }
    }
}

impl Cluster for FakeCluster {
    fn apply(&self, pth: &Path) -> Result<()> {
        assert!(pth.is_file(), "applied manifest must exist");
        if self.fail_apply {
            return Err(ErrorKind::SubprocessFailure("kubectl".into(), 1).into());
        }
        self.applied.borrow_mut().push(pth.to_path_buf());
        Ok(())
    }

    fn service_host(&self, svc: &str, target: Option<&Target>, domain: Option<&str>, ns: &str) -> Result<String> {
        self.lookups.borrow_mut().push((svc.into(), target.cloned(), domain.map(String::from), ns.into()));
        Ok(format!("{}.{}", svc, domain.unwrap_or("apps.fake.test")))
    }
}

/// Renderer returning canned output
pub struct FakeRenderer {
    pub output: String,
    pub calls: RefCell<Vec<(String, Vec<String>)>>,
    pub fail: bool,
}

impl FakeRenderer {
    pub fn new(output: &str) -> Self {
        FakeRenderer { output: output.into(), calls: RefCell::new(vec![]), fail: false }
    }

    /// Renderer whose container exits non-zero
    pub fn failing() -> Self {
        FakeRenderer { fail: true, ..FakeRenderer::new("") }
    }
}

impl ImageRenderer for FakeRenderer {
    fn render(&self, image: &str, cmd: Vec<String>) -> Result<String> {
        self.calls.borrow_mut().push((image.into(), cmd));
        if self.fail {
            return Err(ErrorKind::SubprocessFailure("docker".into(), 125).into());
        }
        Ok(self.output.clone())
    }
}
