//! Label identifier codec.
//!
//! A label chip is addressed by a string token, `label-<key>-<value>`. Tokens are the
//! drag-and-drop payload and the canvas membership key, so encoding must be stable.
//!
//! Decoding runs an ordered list of strategies and takes the first one that claims the
//! token. Earlier UI builds and hand-written fixtures used other separators, so the
//! list accepts those too. Order matters: a plain first-dash split would break
//! slash-qualified and prefix-qualified keys, so it runs last.

use std::borrow::Borrow;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::LabelPair;

pub const TOKEN_PREFIX: &str = "label-";

/// Canvas identifier for one label pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelToken(String);

impl LabelToken {
    pub fn new(raw: impl Into<String>) -> Self { Self(raw.into()) }

    pub fn as_str(&self) -> &str { &self.0 }

    /// Whether the token carries the reserved label prefix.
    pub fn is_label(&self) -> bool { self.0.starts_with(TOKEN_PREFIX) }

    pub fn decode(&self) -> Option<LabelPair> { decode(&self.0) }
}

impl fmt::Display for LabelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<String> for LabelToken {
    fn from(s: String) -> Self { Self(s) }
}

impl From<&str> for LabelToken {
    fn from(s: &str) -> Self { Self(s.to_string()) }
}

impl AsRef<str> for LabelToken {
    fn as_ref(&self) -> &str { &self.0 }
}

impl Borrow<str> for LabelToken {
    fn borrow(&self) -> &str { &self.0 }
}

/// Tokens minted by earlier builds, mapped straight to their label.
const HISTORICAL_TOKENS: &[(&str, &str, &str)] = &[
    ("label-location-group-edge", "location-group", "edge"),
    ("label-location-group:edge", "location-group", "edge"),
];

/// Well-known keys that would be cut short by a first-dash split.
const KNOWN_KEY_PREFIXES: &[&str] = &[
    "app.kubernetes.io",
    "kubernetes.io",
    "location-group",
    "cluster.open-cluster-management.io/clusterset",
    "feature.open-cluster-management.io/addon-application-manager",
];

/// `<anything with a slash>-<value>`; the greedy key makes the split land on the last dash.
static SLASH_QUALIFIED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<key>.*/.*)-(?P<value>[^-]*)$").unwrap());

pub(crate) struct Strategy {
    pub name: &'static str,
    /// Receives the full token and the remainder after [`TOKEN_PREFIX`].
    pub parse: fn(&str, &str) -> Option<LabelPair>,
}

pub(crate) const STRATEGIES: &[Strategy] = &[
    Strategy { name: "historical", parse: parse_historical },
    Strategy { name: "slash-qualified", parse: parse_slash_qualified },
    Strategy { name: "equals", parse: parse_equals },
    Strategy { name: "colon", parse: parse_colon },
    Strategy { name: "known-prefix", parse: parse_known_prefix },
    Strategy { name: "name", parse: parse_name },
    Strategy { name: "first-dash", parse: parse_first_dash },
];

fn parse_historical(token: &str, _rest: &str) -> Option<LabelPair> {
    HISTORICAL_TOKENS
        .iter()
        .find(|(t, _, _)| *t == token)
        .map(|(_, k, v)| LabelPair::new(*k, *v))
}

fn parse_slash_qualified(_token: &str, rest: &str) -> Option<LabelPair> {
    let caps = SLASH_QUALIFIED.captures(rest)?;
    Some(LabelPair::new(&caps["key"], &caps["value"]))
}

fn parse_equals(_token: &str, rest: &str) -> Option<LabelPair> {
    rest.split_once('=').map(|(k, v)| LabelPair::new(k, v))
}

fn parse_colon(_token: &str, rest: &str) -> Option<LabelPair> {
    rest.split_once(':').map(|(k, v)| LabelPair::new(k, v))
}

fn parse_known_prefix(_token: &str, rest: &str) -> Option<LabelPair> {
    KNOWN_KEY_PREFIXES.iter().find_map(|prefix| {
        rest.strip_prefix(prefix)
            .and_then(|r| r.strip_prefix('-'))
            .map(|value| LabelPair::new(*prefix, value))
    })
}

fn parse_name(_token: &str, rest: &str) -> Option<LabelPair> {
    rest.strip_prefix("name-").map(|value| LabelPair::new("name", value))
}

fn parse_first_dash(_token: &str, rest: &str) -> Option<LabelPair> {
    rest.split_once('-').map(|(k, v)| LabelPair::new(k, v))
}

/// Decode a token into its label pair.
///
/// Returns `None` when the token lacks the prefix, when no strategy claims it
/// (no separator at all), or when the claiming strategy yields an empty key.
pub fn decode(token: &str) -> Option<LabelPair> {
    let rest = token.strip_prefix(TOKEN_PREFIX)?;
    let (strategy, pair) = STRATEGIES
        .iter()
        .find_map(|s| (s.parse)(token, rest).map(|p| (s.name, p)))?;
    if pair.key.is_empty() {
        debug!(token, strategy, "label token decoded to an empty key");
        return None;
    }
    trace!(token, strategy, key = %pair.key, value = %pair.value, "label token decoded");
    Some(pair)
}

/// Encode a label pair into its canvas token.
///
/// The dash form is preferred; when the decoder would misread it (dashed keys, dashed
/// values under a slash-qualified key) the `=` form and then the `:` form are used.
pub fn encode(key: &str, value: &str) -> LabelToken {
    if let Some((token, _, _)) = HISTORICAL_TOKENS.iter().find(|(_, k, v)| *k == key && *v == value) {
        return LabelToken::new(*token);
    }
    let dash = format!("{TOKEN_PREFIX}{key}-{value}");
    let forms = [dash.clone(), format!("{TOKEN_PREFIX}{key}={value}"), format!("{TOKEN_PREFIX}{key}:{value}")];
    match forms
        .into_iter()
        .find(|t| decode(t).map_or(false, |p| p.key == key && p.value == value))
    {
        Some(t) => LabelToken(t),
        None => {
            debug!(key, value, "no token form round-trips; using dash form");
            LabelToken(dash)
        }
    }
}
