//! # Resource Identifier Codec
//!
//! Maps a `(group, version, kind)` resource type key onto a single flat token
//! that can be used as a registry key, and back again.
//!
//! Encoding escapes `.` as `---` and `/` as `----`, joins the three segments
//! with `--`, lower-cases the result and prefixes it with `source.`:
//!
//! ```text
//! (core.example.io, v1alpha1, compiledgraphqlsources)
//!   => source.core---example---io--v1alpha1--compiledgraphqlsources
//! ```
//!
//! Decoding reads the body as runs of `-`: a run of two is the separator, a
//! run of three is `.`, four is `/` and one is a literal hyphen. These marker
//! strings are persisted in tokens and must never change.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::error::{GatewayError, GatewayResult};
use crate::structural_error;

/// Namespace tag every module token starts with
pub const TOKEN_PREFIX: &str = "source.";

const SEPARATOR: &str = "--";
const DOT_MARKER: &str = "---";
const SLASH_MARKER: &str = "----";

/// Identifies a kind of declarative document
///
/// `kind` is the lower-case plural resource name (`redissources`), which is
/// also the `{resource}` segment of the admin API paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceTypeKey {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl ResourceTypeKey {
    pub fn new(group: impl Into<String>, version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }

    /// Check that this key survives an encode/decode round trip
    ///
    /// Segments must be non-empty and lower-case, and the escaped characters
    /// (`-`, `.`, `/`) may neither touch each other nor sit at a segment edge.
    /// DNS-style group names always satisfy this.
    pub fn validate(&self) -> GatewayResult<()> {
        for (label, segment) in [
            ("group", &self.group),
            ("version", &self.version),
            ("kind", &self.kind),
        ] {
            validate_segment(label, segment)?;
        }
        Ok(())
    }

    /// The `apiVersion` string documents of this type carry
    pub fn api_version(&self) -> String {
        format!("{}/{}", self.group, self.version)
    }

    pub fn token(&self) -> ModuleToken {
        encode(self)
    }
}

impl fmt::Display for ResourceTypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.group, self.version, self.kind)
    }
}

fn is_escaped(c: char) -> bool {
    matches!(c, '-' | '.' | '/')
}

fn validate_segment(label: &str, segment: &str) -> GatewayResult<()> {
    if segment.is_empty() {
        return Err(structural_error!("resource {} must not be empty", label));
    }
    if segment.chars().any(|c| c.is_uppercase()) {
        return Err(structural_error!(
            "resource {} '{}' must be lower-case",
            label,
            segment
        ));
    }

    let chars: Vec<char> = segment.chars().collect();
    for (i, c) in chars.iter().enumerate() {
        if !is_escaped(*c) {
            continue;
        }
        let at_edge = i == 0 || i + 1 == chars.len();
        let touches = (i > 0 && is_escaped(chars[i - 1]))
            || chars.get(i + 1).map(|n| is_escaped(*n)).unwrap_or(false);
        if at_edge || touches {
            return Err(structural_error!(
                "resource {} '{}' has '{}' at an ambiguous position",
                label,
                segment,
                c
            ));
        }
    }
    Ok(())
}

/// Flat registry key derived from a [`ResourceTypeKey`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleToken(String);

impl ModuleToken {
    /// Parse a token string, accepting only the exact form [`encode`] produces
    pub fn parse(token: &str) -> GatewayResult<Self> {
        let key = decode(token)?;
        key.validate()?;
        let canonical = encode(&key);
        if canonical.as_str() != token {
            return Err(structural_error!(
                "token '{}' is not canonical, expected '{}'",
                token,
                canonical
            ));
        }
        Ok(canonical)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Recover the resource type key this token was built from
    pub fn type_key(&self) -> GatewayResult<ResourceTypeKey> {
        decode(&self.0)
    }
}

impl fmt::Display for ModuleToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ModuleToken {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for ModuleToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn escape(segment: &str) -> String {
    segment.replace('.', DOT_MARKER).replace('/', SLASH_MARKER)
}

/// Encode a resource type key into its module token
pub fn encode(key: &ResourceTypeKey) -> ModuleToken {
    let body = [escape(&key.group), escape(&key.version), escape(&key.kind)].join(SEPARATOR);
    ModuleToken(format!("{}{}", TOKEN_PREFIX, body.to_lowercase()))
}

/// Decode a module token back into its resource type key
pub fn decode(token: &str) -> GatewayResult<ResourceTypeKey> {
    let body = token
        .strip_prefix(TOKEN_PREFIX)
        .ok_or_else(|| structural_error!("token '{}' is missing the '{}' prefix", token, TOKEN_PREFIX))?;

    let mut segments: Vec<String> = vec![String::new()];
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '-' {
            if let Some(current) = segments.last_mut() {
                current.push(c);
            }
            continue;
        }

        let mut run = 1;
        while chars.peek() == Some(&'-') {
            chars.next();
            run += 1;
        }
        let current = segments.last_mut();
        match (run, current) {
            (1, Some(current)) => current.push('-'),
            (2, _) => segments.push(String::new()),
            (3, Some(current)) => current.push('.'),
            (4, Some(current)) => current.push('/'),
            _ => {
                return Err(structural_error!(
                    "token '{}' contains an unrecognised run of {} hyphens",
                    token,
                    run
                ))
            }
        }
    }

    if segments.len() != 3 {
        return Err(structural_error!(
            "token '{}' has {} segments, expected 3",
            token,
            segments.len()
        ));
    }
    if segments.iter().any(|s| s.is_empty()) {
        return Err(structural_error!("token '{}' has an empty segment", token));
    }

    let kind = segments.pop().unwrap_or_default();
    let version = segments.pop().unwrap_or_default();
    let group = segments.pop().unwrap_or_default();
    Ok(ResourceTypeKey { group, version, kind })
}
