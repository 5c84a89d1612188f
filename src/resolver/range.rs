use crate::error::{EsyError, Result};
use semver::{Version, VersionReq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A parsed version constraint together with the text it was written as.
///
/// The text is kept verbatim (trimmed) so a range can be written back into a
/// manifest exactly as the user typed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    text: String,
    kind: RangeKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeKind {
    /// `*`, `x`, `latest` or the empty string.
    Any,
    Exact(Version),
    Caret(Version),
    Tilde(Version),
    /// `1`, `1.x`, `1.2`, `1.2.*`
    Wildcard { major: u64, minor: Option<u64> },
    /// Anything else npm accepts, lowered onto `semver` comparators.
    Req(VersionReq),
    /// `a || b`
    AnyOf(Vec<RangeKind>),
}

impl VersionRange {
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        let kind = if trimmed.contains("||") {
            let mut alternatives = Vec::new();
            for part in trimmed.split("||").map(str::trim).filter(|p| !p.is_empty()) {
                alternatives.push(parse_single(part)?);
            }
            if alternatives.is_empty() {
                return Err(invalid(trimmed, "empty alternative set"));
            }
            RangeKind::AnyOf(alternatives)
        } else {
            parse_single(trimmed)?
        };
        Ok(Self { text: trimmed.to_string(), kind })
    }

    pub fn any() -> Self {
        Self { text: "*".into(), kind: RangeKind::Any }
    }

    /// `^major.minor.patch` anchored on `version`; pre-release and build tags are dropped.
    pub fn caret(version: &Version) -> Self {
        let anchor = Version::new(version.major, version.minor, version.patch);
        Self { text: format!("^{anchor}"), kind: RangeKind::Caret(anchor) }
    }

    pub fn exact(version: &Version) -> Self {
        Self { text: version.to_string(), kind: RangeKind::Exact(version.clone()) }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn kind(&self) -> &RangeKind {
        &self.kind
    }

    pub fn is_any(&self) -> bool {
        matches!(self.kind, RangeKind::Any)
    }

    pub fn satisfies(&self, version: &Version) -> bool {
        self.kind.matches(version)
    }

    /// The greatest candidate satisfying this range.
    pub fn select_best<'a, I>(&self, candidates: I) -> Option<&'a Version>
    where
        I: IntoIterator<Item = &'a Version>,
    {
        candidates.into_iter().filter(|v| self.satisfies(v)).max()
    }
}

impl RangeKind {
    fn matches(&self, version: &Version) -> bool {
        match self {
            RangeKind::Any => version.pre.is_empty(),
            RangeKind::Exact(v) => version.cmp_precedence(v).is_eq(),
            RangeKind::Caret(v) => {
                if !prerelease_allowed(v, version) || version.cmp_precedence(v).is_lt() {
                    return false;
                }
                if v.major > 0 {
                    version.major == v.major
                } else if v.minor > 0 {
                    version.major == 0 && version.minor == v.minor
                } else {
                    version.major == 0 && version.minor == 0 && version.patch == v.patch
                }
            }
            RangeKind::Tilde(v) => {
                prerelease_allowed(v, version)
                    && !version.cmp_precedence(v).is_lt()
                    && version.major == v.major
                    && version.minor == v.minor
            }
            RangeKind::Wildcard { major, minor } => {
                version.pre.is_empty()
                    && version.major == *major
                    && minor.map_or(true, |m| version.minor == m)
            }
            RangeKind::Req(req) => req.matches(version),
            RangeKind::AnyOf(alternatives) => alternatives.iter().any(|k| k.matches(version)),
        }
    }
}

/// Pre-releases only match an anchor that is itself a pre-release of the same release.
fn prerelease_allowed(anchor: &Version, version: &Version) -> bool {
    version.pre.is_empty()
        || (!anchor.pre.is_empty()
            && anchor.major == version.major
            && anchor.minor == version.minor
            && anchor.patch == version.patch)
}

/// Pick the maximal version of `name` satisfying `range`.
pub fn select_best<'a, I>(name: &str, range: &VersionRange, candidates: I) -> Result<Version>
where
    I: IntoIterator<Item = &'a Version>,
{
    range.select_best(candidates).cloned().ok_or_else(|| EsyError::NoSatisfyingVersion {
        name: name.to_string(),
        range: range.to_string(),
    })
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.text.is_empty() {
            f.write_str("*")
        } else {
            f.write_str(&self.text)
        }
    }
}

impl FromStr for VersionRange {
    type Err = EsyError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for VersionRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for VersionRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        VersionRange::parse(&raw).map_err(serde::de::Error::custom)
    }
}

fn invalid(range: &str, reason: impl Into<String>) -> EsyError {
    EsyError::InvalidRangeSyntax { range: range.to_string(), reason: reason.into() }
}

fn parse_single(s: &str) -> Result<RangeKind> {
    if s.is_empty() || s == "*" || s.eq_ignore_ascii_case("x") || s == "latest" {
        return Ok(RangeKind::Any);
    }
    let bare = s.strip_prefix('=').unwrap_or(s).trim();
    let bare = bare.strip_prefix('v').unwrap_or(bare);
    if let Ok(v) = Version::parse(bare) {
        return Ok(RangeKind::Exact(v));
    }
    if let Some(rest) = s.strip_prefix('^') {
        if let Ok(v) = Version::parse(rest.trim()) {
            return Ok(RangeKind::Caret(v));
        }
    }
    if let Some(rest) = s.strip_prefix('~') {
        if !rest.starts_with('>') {
            if let Ok(v) = Version::parse(rest.trim()) {
                return Ok(RangeKind::Tilde(v));
            }
        }
    }
    if let Some(kind) = parse_wildcard(s) {
        return Ok(kind);
    }
    let norm = canonicalize_npm_range(s);
    VersionReq::from_str(&norm)
        .map(RangeKind::Req)
        .map_err(|e| invalid(s, format!("{e} (normalized to '{norm}')")))
}

fn parse_wildcard(s: &str) -> Option<RangeKind> {
    fn is_wild(p: &str) -> bool {
        p == "*" || p.eq_ignore_ascii_case("x")
    }
    let parts: Vec<&str> = s.split('.').collect();
    let major = parts.first()?.parse::<u64>().ok()?;
    match parts.as_slice() {
        [_] => Some(RangeKind::Wildcard { major, minor: None }),
        [_, m] if is_wild(m) => Some(RangeKind::Wildcard { major, minor: None }),
        [_, m] => Some(RangeKind::Wildcard { major, minor: Some(m.parse().ok()?) }),
        [_, m, p] if is_wild(p) => {
            if is_wild(m) {
                Some(RangeKind::Wildcard { major, minor: None })
            } else {
                Some(RangeKind::Wildcard { major, minor: Some(m.parse().ok()?) })
            }
        }
        _ => None,
    }
}

/// Lower npm range syntax onto the comma separated comparator syntax `semver` parses.
pub fn canonicalize_npm_range(input: &str) -> String {
    let s = input.trim();
    if s.is_empty() || s == "*" || s == "latest" {
        return "*".into();
    }

    if semver::Version::parse(s).is_ok() {
        return format!("={s}");
    }

    // "1.2.3 - 2.3.4" => ">=1.2.3, <=2.3.4"; the spaces keep it apart from pre-release dashes
    if let Some((left, right)) = s.split_once(" - ") {
        let (left, right) = (left.trim(), right.trim());
        if is_version_like(left) && is_version_like(right) {
            return format!(">={left}, <={right}");
        }
    }

    let tokens: Vec<&str> = s.split_whitespace().collect();
    if tokens.len() > 1 {
        let mut comps: Vec<String> = Vec::new();
        let mut i = 0;
        while i < tokens.len() {
            let t = tokens[i];
            if is_op(t) {
                match tokens.get(i + 1) {
                    Some(ver) => {
                        comps.push(format!("{t}{ver}"));
                        i += 2;
                        continue;
                    }
                    None => return s.to_string(),
                }
            }
            if t.starts_with(|c: char| "<>=^~".contains(c)) {
                comps.push(t.to_string());
            } else if is_version_like(t) {
                comps.push(format!("={t}"));
            } else {
                return s.to_string();
            }
            i += 1;
        }
        return comps.join(", ");
    }

    s.to_string()
}

fn is_op(t: &str) -> bool {
    matches!(t, ">" | "<" | ">=" | "<=" | "=" | "^" | "~")
}

fn is_version_like(t: &str) -> bool {
    let mut has_digit = false;
    for c in t.chars() {
        if c.is_ascii_digit() {
            has_digit = true;
            continue;
        }
        if !matches!(c, '.' | '-' | '+' | 'x' | 'X' | '*' | 'a'..='z' | 'A'..='Z') {
            return false;
        }
    }
    has_digit
}
