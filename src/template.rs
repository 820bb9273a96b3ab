use std::collections::{btree_map, BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::iter::FromIterator;
use std::io::prelude::*;
use std::ops::{Deref, DerefMut};
use std::path::Path;

use regex::{Captures, Regex};

use super::{ErrorKind, Result, ResultExt};

/// Prefix shared by every placeholder token in a template
pub const TOKEN_PREFIX: &str = "REPLACE_";

/// Placeholder names to replacement values
///
/// Keys are bare names; the token found in templates is the name prefixed
/// with `REPLACE_`, so the key `NAMESPACE` replaces `REPLACE_NAMESPACE`.
///
/// ```yaml
/// metadata:
///   name: scality
///   namespace: REPLACE_NAMESPACE
/// data:
///   endpoint: REPLACE_URL
/// ```
#[derive(Clone, Default, Debug, PartialEq)]
pub struct Substitutions(BTreeMap<String, String>);

/// Token used in templates for a placeholder name
pub fn token(name: &str) -> String {
    format!("{}{}", TOKEN_PREFIX, name)
}

impl Substitutions {
    pub fn new() -> Self {
        Substitutions::default()
    }

    /// Builder style insert
    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Parse a `NAME=VALUE` pair as given on the command line
    ///
    /// Only the first `=` splits, so values may contain `=`.
    pub fn parse_pair(raw: &str) -> Result<(String, String)> {
        let name_re = Regex::new(r"^[A-Z0-9_]+$")?;
        let mut split = raw.splitn(2, '=');
        match (split.next(), split.next()) {
            (Some(name), Some(value)) if name_re.is_match(name) => Ok((name.into(), value.into())),
            _ => bail!(ErrorKind::InvalidSubstitution(raw.into())),
        }
    }

    /// Pairs of names whose tokens contain one another
    ///
    /// These are ambiguous in a template; the longer token wins on replacement.
    pub fn overlapping(&self) -> Vec<(String, String)> {
        let mut res = vec![];
        for a in self.0.keys() {
            for b in self.0.keys() {
                if a != b && token(b).contains(&token(a)) {
                    res.push((a.clone(), b.clone()));
                }
            }
        }
        res
    }
}

impl Deref for Substitutions {
    type Target = BTreeMap<String, String>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Substitutions {
    fn deref_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.0
    }
}

impl<'a> IntoIterator for &'a Substitutions {
    type Item = (&'a String, &'a String);
    type IntoIter = btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<(String, String)> for Substitutions {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Substitutions(BTreeMap::from_iter(iter))
    }
}

/// Replace every placeholder token in `text` with its value
///
/// Single left to right pass: the longest token matching at a position wins
/// and replaced values are never scanned again, so key order is irrelevant.
pub fn substitute(text: &str, subs: &Substitutions) -> Result<String> {
    if subs.is_empty() {
        return Ok(text.to_string());
    }
    let mut tokens = subs.keys().map(|k| token(k)).collect::<Vec<_>>();
    tokens.sort_by(|a, b| b.len().cmp(&a.len()));
    let alternation = tokens.iter().map(|t| regex::escape(t)).collect::<Vec<_>>().join("|");
    let re = Regex::new(&alternation)?;

    let res = re.replace_all(text, |caps: &Captures| {
        let tok = &caps[0];
        match subs.get(&tok[TOKEN_PREFIX.len()..]) {
            Some(v) => v.clone(),
            None => tok.to_string(),
        }
    });
    Ok(res.into_owned())
}

/// Placeholder tokens still present in `text`
pub fn residual_placeholders(text: &str) -> Result<Vec<String>> {
    let re = Regex::new(r"REPLACE_[A-Z0-9_]+")?;
    let found = re.find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect::<BTreeSet<_>>();
    Ok(found.into_iter().collect())
}

/// Read a template into a string
pub fn read_template(src: &Path) -> Result<String> {
    let mut f = File::open(src).chain_err(|| ErrorKind::ReadFailure(src.display().to_string()))?;
    let mut data = String::new();
    f.read_to_string(&mut data)
        .chain_err(|| ErrorKind::ReadFailure(src.display().to_string()))?;
    Ok(data)
}

/// Write rendered data to `dst` verbatim, creating parent directories
pub fn write_rendered(dst: &Path, data: &str) -> Result<()> {
    let fail = || ErrorKind::WriteFailure(dst.display().to_string());
    if let Some(parent) = dst.parent() {
        if !parent.as_os_str().is_empty() && !parent.is_dir() {
            fs::create_dir_all(parent).chain_err(fail)?;
        }
    }
    let mut f = File::create(dst).chain_err(fail)?;
    f.write_all(data.as_bytes()).chain_err(fail)?;
    debug!("Wrote {}: \n{}", dst.display(), data);
    Ok(())
}

/// Warn about tokens nobody supplied a value for
pub(crate) fn warn_residuals(text: &str, dst: &Path) -> Result<()> {
    let residual = residual_placeholders(text)?;
    if !residual.is_empty() {
        warn!("{} still contains placeholders: {}", dst.display(), residual.join(", "));
    }
    Ok(())
}

pub(crate) fn warn_overlaps(subs: &Substitutions) {
    for (short, long) in subs.overlapping() {
        warn!("Placeholder {} is contained in {} - the longer token takes precedence",
            token(&short), token(&long));
    }
}

/// Render a text template from `src` into `dst`
///
/// All content outside of the placeholder tokens is preserved byte for byte.
pub fn render_text(src: &Path, dst: &Path, subs: &Substitutions) -> Result<()> {
    debug!("Rendering {} into {}", src.display(), dst.display());
    warn_overlaps(subs);
    let data = read_template(src)?;
    let rendered = substitute(&data, subs)?;
    warn_residuals(&rendered, dst)?;
    write_rendered(dst, &rendered)
}

#[cfg(test)]
mod tests {
    use super::{residual_placeholders, substitute, Substitutions};

    fn scality_subs() -> Substitutions {
        Substitutions::new()
            .with("NAMESPACE", "assisted-installer")
            .with("URL", "http://cloudserver-front:8000")
    }

    #[test]
    fn replaces_every_occurrence() {
        let tpl = "metadata:\n  namespace: REPLACE_NAMESPACE\n  labels:\n    ns: REPLACE_NAMESPACE\ndata:\n  endpoint: REPLACE_URL\n";
        let res = substitute(tpl, &scality_subs()).unwrap();
        assert_eq!(res, "metadata:\n  namespace: assisted-installer\n  labels:\n    ns: assisted-installer\ndata:\n  endpoint: http://cloudserver-front:8000\n");
        assert!(residual_placeholders(&res).unwrap().is_empty());
    }

    #[test]
    fn identity_without_placeholders() {
        let tpl = "kind: Namespace\r\nmetadata:\n  name: plain  \n\n";
        assert_eq!(substitute(tpl, &scality_subs()).unwrap(), tpl);
        assert_eq!(substitute(tpl, &Substitutions::new()).unwrap(), tpl);
    }

    #[test]
    fn rendering_is_idempotent() {
        let tpl = "ns: REPLACE_NAMESPACE\nurl: REPLACE_URL";
        let once = substitute(tpl, &scality_subs()).unwrap();
        let twice = substitute(&once, &scality_subs()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn unknown_placeholders_are_left_alone() {
        let tpl = "ns: REPLACE_NAMESPACE\nhost: REPLACE_HOSTNAME";
        let res = substitute(tpl, &Substitutions::new().with("NAMESPACE", "ai")).unwrap();
        assert_eq!(res, "ns: ai\nhost: REPLACE_HOSTNAME");
        assert_eq!(residual_placeholders(&res).unwrap(), vec!["REPLACE_HOSTNAME".to_string()]);
    }

    #[test]
    fn longest_token_wins_regardless_of_order() {
        let subs = Substitutions::new().with("URL", "short").with("URL_BASE", "long");
        let res = substitute("a: REPLACE_URL_BASE\nb: REPLACE_URL", &subs).unwrap();
        assert_eq!(res, "a: long\nb: short");
        assert_eq!(subs.overlapping(), vec![("URL".to_string(), "URL_BASE".to_string())]);
    }

    #[test]
    fn values_are_not_rescanned() {
        let subs = Substitutions::new().with("NAMESPACE", "REPLACE_URL").with("URL", "x");
        let res = substitute("REPLACE_NAMESPACE REPLACE_URL", &subs).unwrap();
        assert_eq!(res, "REPLACE_URL x");
    }

    #[test]
    fn parse_pairs() {
        let (k, v) = Substitutions::parse_pair("URL=http://a:80/?x=1").unwrap();
        assert_eq!(k, "URL");
        assert_eq!(v, "http://a:80/?x=1");
        let (k, v) = Substitutions::parse_pair("EMPTY=").unwrap();
        assert_eq!((k.as_str(), v.as_str()), ("EMPTY", ""));
        assert!(Substitutions::parse_pair("NOVALUE").is_err());
        assert!(Substitutions::parse_pair("=value").is_err());
        assert!(Substitutions::parse_pair("lower=value").is_err());
    }
}
