use super::kubectl::tool_out;
use super::Result;

/// Produces manifest text by running a tool shipped inside an image
pub trait ImageRenderer {
    /// Run `cmd` in a fresh container of `image` and return its stdout
    fn render(&self, image: &str, cmd: Vec<String>) -> Result<String>;
}

/// Arguments for a one shot `docker run`
pub fn run_args(image: &str, cmd: Vec<String>) -> Vec<String> {
    let mut args = vec!["run".into(), "--rm".into(), image.into()];
    args.extend(cmd);
    args
}

/// The local `docker` cli
#[derive(Clone, Debug, Default)]
pub struct Docker;

impl ImageRenderer for Docker {
    fn render(&self, image: &str, cmd: Vec<String>) -> Result<String> {
        tool_out("docker", run_args(image, cmd))
    }
}
