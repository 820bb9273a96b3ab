use std::fmt;
use std::path::Path;
use std::str::FromStr;

use regex::Regex;
use serde_yaml::{self, Value};

use super::template::{self, Substitutions};
use super::{Error, ErrorKind, Result};

/// One step into a structured document
#[derive(Clone, Debug, PartialEq)]
pub enum Segment {
    /// Key in a mapping
    Key(String),
    /// Position in a sequence
    Index(usize),
}

/// A path into a yaml document
///
/// Written as dotted keys with bracketed indices, e.g.
/// `spec.template.spec.containers[0].image`.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldPath(Vec<Segment>);

impl FieldPath {
    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    /// Printable form of the first `n` segments (for error messages)
    fn prefix(&self, n: usize) -> String {
        if n == 0 {
            return "<root>".into();
        }
        FieldPath(self.0[..n].to_vec()).to_string()
    }
}

impl FromStr for FieldPath {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        let part_re = Regex::new(r"^([^\[\]]*)((?:\[\d+\])*)$")?;
        let idx_re = Regex::new(r"\[(\d+)\]")?;
        let mut segs = vec![];
        for part in raw.split('.') {
            let caps = match part_re.captures(part) {
                Some(c) => c,
                None => bail!(ErrorKind::InvalidFieldPath(raw.into())),
            };
            let key = &caps[1];
            let indices = &caps[2];
            if key.is_empty() && (indices.is_empty() || !segs.is_empty()) {
                bail!(ErrorKind::InvalidFieldPath(raw.into()));
            }
            if !key.is_empty() {
                segs.push(Segment::Key(key.into()));
            }
            for idx in idx_re.captures_iter(indices) {
                segs.push(Segment::Index(idx[1].parse()?));
            }
        }
        Ok(FieldPath(segs))
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, s) in self.0.iter().enumerate() {
            match s {
                Segment::Key(k) if i == 0 => write!(f, "{}", k)?,
                Segment::Key(k) => write!(f, ".{}", k)?,
                Segment::Index(n) => write!(f, "[{}]", n)?,
            }
        }
        Ok(())
    }
}

/// What to do at the end of a `FieldPath`
#[derive(Clone, Debug, PartialEq)]
pub enum Operation {
    /// Create or replace the value
    Set(Value),
    /// Extend a sequence, creating it if absent
    Append(Vec<Value>),
}

/// A single override applied to a parsed document
#[derive(Clone, Debug, PartialEq)]
pub struct FieldOverride {
    pub path: FieldPath,
    pub op: Operation,
}

impl FieldOverride {
    pub fn set<V: Into<Value>>(path: &str, value: V) -> Result<Self> {
        Ok(FieldOverride { path: path.parse()?, op: Operation::Set(value.into()) })
    }

    pub fn append(path: &str, values: Vec<Value>) -> Result<Self> {
        Ok(FieldOverride { path: path.parse()?, op: Operation::Append(values) })
    }
}

/// Name/value pair as used in a container's `env` list
pub fn env_entry(name: &str, value: &str) -> Value {
    let mut m = serde_yaml::Mapping::new();
    m.insert(Value::String("name".into()), Value::String(name.into()));
    m.insert(Value::String("value".into()), Value::String(value.into()));
    Value::Mapping(m)
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a bool",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
    }
}

fn schema_error(path: String, reason: String) -> Error {
    ErrorKind::SchemaError(path, reason).into()
}

/// Walk to an existing node
fn navigate<'a>(doc: &'a mut Value, path: &FieldPath, depth: usize) -> Result<&'a mut Value> {
    let mut cur = doc;
    for (i, seg) in path.segments()[..depth].iter().enumerate() {
        let here = path.prefix(i + 1);
        let next = match (seg, cur) {
            (Segment::Key(k), Value::Mapping(m)) => m.get_mut(&Value::String(k.clone())),
            (Segment::Index(n), Value::Sequence(s)) => s.get_mut(*n),
            (Segment::Key(_), other) => {
                return Err(schema_error(here, format!("expected a mapping, found {}", kind(other))));
            }
            (Segment::Index(_), other) => {
                return Err(schema_error(here, format!("expected a sequence, found {}", kind(other))));
            }
        };
        cur = match next {
            Some(v) => v,
            None => return Err(schema_error(here, "missing".into())),
        };
    }
    Ok(cur)
}

fn apply_one(doc: &mut Value, o: &FieldOverride) -> Result<()> {
    let depth = o.path.segments().len();
    let full = o.path.to_string();
    let parent = navigate(doc, &o.path, depth - 1)?;
    let last = &o.path.segments()[depth - 1];
    trace!("Applying {:?} at {}", o.op, full);

    match (&o.op, last, parent) {
        (Operation::Set(v), Segment::Key(k), Value::Mapping(m)) => {
            let key = Value::String(k.clone());
            // replace in place so the key keeps its position
            if let Some(existing) = m.get_mut(&key) {
                *existing = v.clone();
            } else {
                m.insert(key, v.clone());
            }
        }
        (Operation::Set(v), Segment::Index(n), Value::Sequence(s)) => {
            match s.get_mut(*n) {
                Some(existing) => *existing = v.clone(),
                None => bail!(schema_error(full, format!("index {} out of bounds", n))),
            }
        }
        (Operation::Append(vs), Segment::Key(k), Value::Mapping(m)) => {
            let key = Value::String(k.clone());
            match m.get_mut(&key) {
                Some(Value::Sequence(s)) => s.extend(vs.iter().cloned()),
                Some(slot) if slot.is_null() => *slot = Value::Sequence(vs.clone()),
                Some(other) => bail!(schema_error(full, format!("expected a sequence, found {}", kind(other)))),
                None => {
                    m.insert(key, Value::Sequence(vs.clone()));
                }
            }
        }
        (Operation::Append(vs), Segment::Index(n), Value::Sequence(s)) => {
            match s.get_mut(*n) {
                Some(Value::Sequence(inner)) => inner.extend(vs.iter().cloned()),
                Some(other) => bail!(schema_error(full, format!("expected a sequence, found {}", kind(other)))),
                None => bail!(schema_error(full, format!("index {} out of bounds", n))),
            }
        }
        (_, Segment::Key(_), other) => {
            let here = o.path.prefix(depth - 1);
            bail!(schema_error(here, format!("expected a mapping, found {}", kind(other))))
        }
        (_, Segment::Index(_), other) => {
            let here = o.path.prefix(depth - 1);
            bail!(schema_error(here, format!("expected a sequence, found {}", kind(other))))
        }
    }
    Ok(())
}

fn key_segment(k: &Value) -> Segment {
    match k.as_str() {
        Some(s) => Segment::Key(s.into()),
        None => Segment::Key(format!("{:?}", k)),
    }
}

/// First node where `after` no longer matches `before`
///
/// Some strings (e.g. `"0o17"`) are emitted unquoted and read back as other types.
fn divergence(before: &Value, after: &Value, at: &[Segment]) -> Option<(Vec<Segment>, String)> {
    let below = |seg: Segment| {
        let mut next = at.to_vec();
        next.push(seg);
        next
    };
    match (before, after) {
        (Value::Mapping(a), Value::Mapping(b)) if a.len() == b.len() => {
            a.iter().find_map(|(k, v)| {
                let next = below(key_segment(k));
                match b.get(k) {
                    Some(w) => divergence(v, w, &next),
                    None => Some((next, "key does not survive being written back".into())),
                }
            })
        }
        (Value::Sequence(a), Value::Sequence(b)) if a.len() == b.len() => {
            a.iter().zip(b.iter()).enumerate()
                .find_map(|(i, (v, w))| divergence(v, w, &below(Segment::Index(i))))
        }
        (a, b) if a == b => None,
        (a, b) => Some((at.to_vec(), format!("{} would be written back as {}", kind(a), kind(b)))),
    }
}

/// Apply overrides to a parsed document in order
pub fn apply_overrides(doc: &mut Value, overrides: &[FieldOverride]) -> Result<()> {
    for o in overrides {
        apply_one(doc, o)?;
    }
    Ok(())
}

/// Render a structured template from `src` into `dst`
///
/// Placeholders are substituted on the raw text first, so tokens anywhere in the
/// document are handled. The result is then parsed, overridden, and serialized.
/// Key order and value types of untouched fields survive the round trip; a
/// value that would be read back differently is a `SchemaError` instead.
pub fn render_structured(src: &Path, dst: &Path, subs: &Substitutions, overrides: &[FieldOverride]) -> Result<()> {
    debug!("Rendering {} into {} with {} overrides", src.display(), dst.display(), overrides.len());
    template::warn_overlaps(subs);
    let data = template::read_template(src)?;
    let rendered = template::substitute(&data, subs)?;

    let mut doc: Value = serde_yaml::from_str(&rendered)?;
    apply_overrides(&mut doc, overrides)?;

    let encoded = serde_yaml::to_string(&doc)?;
    let reparsed: Value = serde_yaml::from_str(&encoded)?;
    if let Some((at, reason)) = divergence(&doc, &reparsed, &[]) {
        let path = if at.is_empty() { "<root>".to_string() } else { FieldPath(at).to_string() };
        bail!(ErrorKind::SchemaError(path, reason));
    }
    template::warn_residuals(&encoded, dst)?;
    template::write_rendered(dst, &format!("{}\n", encoded))
}

#[cfg(test)]
mod tests {
    use super::{apply_overrides, divergence, env_entry, FieldOverride, FieldPath, Segment};
    use serde_yaml::{self, Value};

    const DEPLOYMENT: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: bm-inventory
  namespace: assisted-installer
spec:
  replicas: 1
  paused: false
  template:
    spec:
      containers:
        - name: bm-inventory
          image: quay.io/ocpmetal/bm-inventory:latest
          ports:
            - containerPort: 8090
          env:
            - name: ROUTE53_SECRET
              value: "1234"
            - name: DEPLOY_TARGET
              value: k8s
      restartPolicy: Always
"#;

    fn parse(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    fn container(doc: &Value) -> &Value {
        &doc["spec"]["template"]["spec"]["containers"][0]
    }

    #[test]
    fn parse_paths() {
        let p: FieldPath = "spec.template.spec.containers[0].image".parse().unwrap();
        assert_eq!(p.segments().len(), 6);
        assert_eq!(p.segments()[4], Segment::Index(0));
        assert_eq!(p.to_string(), "spec.template.spec.containers[0].image");

        let nested: FieldPath = "a[1][2].b".parse().unwrap();
        assert_eq!(nested.segments(), &[
            Segment::Key("a".into()),
            Segment::Index(1),
            Segment::Index(2),
            Segment::Key("b".into()),
        ]);
        let top: FieldPath = "[0].name".parse().unwrap();
        assert_eq!(top.segments()[0], Segment::Index(0));

        assert!("".parse::<FieldPath>().is_err());
        assert!("a..b".parse::<FieldPath>().is_err());
        assert!("a[x]".parse::<FieldPath>().is_err());
        assert!("a.[0]".parse::<FieldPath>().is_err());
    }

    #[test]
    fn set_and_append_on_container() {
        let mut doc = parse(DEPLOYMENT);
        let c = "spec.template.spec.containers[0]";
        let overrides = vec![
            FieldOverride::set(&format!("{}.image", c), "quay.io/ocpmetal/bm-inventory:v1.0").unwrap(),
            FieldOverride::append(&format!("{}.env", c), vec![
                env_entry("CLUSTER_MONITOR_INTERVAL", "1s"),
                env_entry("HOST_MONITOR_INTERVAL", "1s"),
            ]).unwrap(),
            FieldOverride::set(&format!("{}.imagePullPolicy", c), "Never").unwrap(),
        ];
        apply_overrides(&mut doc, &overrides).unwrap();

        let ctr = container(&doc);
        assert_eq!(ctr["image"], Value::from("quay.io/ocpmetal/bm-inventory:v1.0"));
        assert_eq!(ctr["imagePullPolicy"], Value::from("Never"));
        let env = ctr["env"].as_sequence().unwrap();
        assert_eq!(env.len(), 4);
        assert_eq!(env[2]["name"], Value::from("CLUSTER_MONITOR_INTERVAL"));
        assert_eq!(env[3]["name"], Value::from("HOST_MONITOR_INTERVAL"));
        assert_eq!(env[3]["value"], Value::from("1s"));
    }

    #[test]
    fn untouched_fields_keep_value_type_and_order() {
        let original = parse(DEPLOYMENT);
        let mut doc = original.clone();
        let o = FieldOverride::set("spec.template.spec.containers[0].image", "nginx").unwrap();
        apply_overrides(&mut doc, &[o]).unwrap();

        let reparsed: Value = serde_yaml::from_str(&serde_yaml::to_string(&doc).unwrap()).unwrap();
        assert_eq!(reparsed["spec"]["replicas"], Value::from(1u64));
        assert_eq!(reparsed["spec"]["paused"], Value::Bool(false));
        // quoted number stays a string
        assert_eq!(container(&reparsed)["env"][0]["value"], Value::from("1234"));
        assert_eq!(container(&reparsed)["ports"], container(&original)["ports"]);
        assert_eq!(reparsed["metadata"], original["metadata"]);

        let keys = container(&reparsed).as_mapping().unwrap().iter()
            .map(|(k, _)| k.as_str().unwrap().to_string())
            .collect::<Vec<_>>();
        assert_eq!(keys, vec!["name", "image", "ports", "env"]);
    }

    #[test]
    fn append_creates_missing_sequence() {
        let mut doc = parse("spec:\n  containers:\n    - name: a\n    - name: b\n      env:\n");
        let first = FieldOverride::append("spec.containers[0].env", vec![env_entry("A", "1")]).unwrap();
        let second = FieldOverride::append("spec.containers[1].env", vec![env_entry("B", "2")]).unwrap();
        apply_overrides(&mut doc, &[first, second]).unwrap();
        assert_eq!(doc["spec"]["containers"][0]["env"][0]["value"], Value::from("1"));
        assert_eq!(doc["spec"]["containers"][1]["env"][0]["name"], Value::from("B"));
    }

    #[test]
    fn schema_errors() {
        let mut doc = parse(DEPLOYMENT);
        // missing intermediate
        let o = FieldOverride::set("spec.jobTemplate.spec.image", "x").unwrap();
        let err = apply_overrides(&mut doc, &[o]).unwrap_err();
        assert!(err.to_string().contains("spec.jobTemplate"));
        // index out of range
        let o = FieldOverride::set("spec.template.spec.containers[3].image", "x").unwrap();
        assert!(apply_overrides(&mut doc, &[o]).is_err());
        // wrong shape: indexing into a mapping
        let o = FieldOverride::set("spec.template[0].image", "x").unwrap();
        assert!(apply_overrides(&mut doc, &[o]).is_err());
        // wrong shape: appending to a scalar
        let o = FieldOverride::append("spec.replicas", vec![Value::from(2u64)]).unwrap();
        assert!(apply_overrides(&mut doc, &[o]).is_err());
        // wrong shape: key on a scalar parent
        let o = FieldOverride::set("metadata.name.first", "x").unwrap();
        assert!(apply_overrides(&mut doc, &[o]).is_err());
        // document untouched by the failures
        assert_eq!(doc, parse(DEPLOYMENT));
    }

    #[test]
    fn divergence_points_at_the_changed_node() {
        let doc = parse("a:\n  b:\n    - x\n    - \"0o17\"\n");
        assert_eq!(divergence(&doc, &doc.clone(), &[]), None);

        let retyped = parse("a:\n  b:\n    - x\n    - 15\n");
        let (at, reason) = divergence(&doc, &retyped, &[]).unwrap();
        assert_eq!(FieldPath(at).to_string(), "a.b[1]");
        assert_eq!(reason, "a string would be written back as a number");
    }
}
