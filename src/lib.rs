#![recursion_limit = "1024"]
#![allow(renamed_and_removed_lints)]

#[macro_use]
extern crate serde_derive;
extern crate serde;
extern crate serde_json;
extern crate serde_yaml;

#[macro_use]
extern crate log;

extern crate regex;

#[macro_use]
extern crate error_chain;
error_chain! {
    types {
        Error, ErrorKind, ResultExt, Result;
    }
    links {}
    foreign_links {
        Fmt(::std::fmt::Error);
        Io(::std::io::Error);
        Int(::std::num::ParseIntError);
        SerdeY(serde_yaml::Error);
        SerdeJ(serde_json::Error);
        Regex(regex::Error);
    }
    errors {
        ReadFailure(path: String) {
            description("could not read template")
            display("could not read template from '{}'", &path)
        }
        WriteFailure(path: String) {
            description("could not write rendered manifest")
            display("could not write rendered manifest to '{}'", &path)
        }
        SchemaError(path: String, reason: String) {
            description("structured document does not match the expected schema")
            display("schema error at '{}': {}", &path, &reason)
        }
        InvalidFieldPath(raw: String) {
            description("field path could not be parsed")
            display("invalid field path '{}'", &raw)
        }
        InvalidSubstitution(raw: String) {
            description("substitution is not of the form NAME=VALUE")
            display("invalid substitution '{}' - expected NAME=VALUE", &raw)
        }
        SubprocessFailure(tool: String, code: i32) {
            description("subprocess returned a non-zero exit status")
            display("subprocess failure from {}: {}", &tool, code)
        }
        MissingImage(var: String) {
            description("no image available for the deployment")
            display("deploy tag is empty and {} is not set", &var)
        }
        UnresolvedHost(svc: String) {
            description("external hostname could not be resolved")
            display("could not resolve an external hostname for '{}'", &svc)
        }
    }
}

/// Explicit configuration passed to the deploy steps
pub mod config;
pub use config::{Config, Layout, Target};

/// Placeholder substitution on raw text
pub mod template;
pub use template::Substitutions;

/// Field overrides on structured yaml documents
pub mod patch;
pub use patch::{FieldOverride, FieldPath};

/// A small CLI kubernetes interface
pub mod kubectl;
pub use kubectl::{Cluster, Kubectl};

/// A small CLI docker interface
pub mod docker;
pub use docker::{Docker, ImageRenderer};

/// The individual deploy steps
pub mod deploy;

/// Smart initialiser
///
/// Allows deploycat calls to work from anywhere if we know where the deploy tree is.
pub fn init() -> Result<()> {
    use std::env;
    use std::path::Path;

    if let Ok(rdir) = env::var("DEPLOYCAT_ROOT_DIR") {
        let pth = Path::new(&rdir);
        if !pth.is_dir() {
            bail!("DEPLOYCAT_ROOT_DIR must exist");
        }
        env::set_current_dir(pth)?;
    }
    Ok(())
}
