//! Request-supplied override tokens and their typed coercion.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::{Error, Result};

/// Override set keyed by configuration key (e.g. `"USE_PARALLEL"`).
///
/// Every value is a list of raw tokens, the way a command line delivers them:
/// scalar keys expect exactly one token, list keys accept any number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    entries: BTreeMap<String, Vec<String>>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to the given tokens, replacing any earlier value.
    pub fn set<K, I, S>(&mut self, key: K, tokens: I) -> &mut Self
    where
        K: Into<String>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries
            .insert(key.into(), tokens.into_iter().map(Into::into).collect());
        self
    }

    /// Builder form of [`Overrides::set`].
    pub fn with<K, I, S>(mut self, key: K, tokens: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set(key, tokens);
        self
    }

    /// Parse a `KEY=value[,value...]` assignment.
    pub fn parse_assignment(&mut self, assignment: &str) -> Result<&mut Self> {
        let (key, value) = assignment.split_once('=').ok_or_else(|| {
            Error::Config(format!("override '{}' is not of the form KEY=VALUE", assignment))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::Config(format!("override '{}' has an empty key", assignment)));
        }
        let tokens: Vec<String> = value
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        Ok(self.set(key, tokens))
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

fn single<'a>(key: &str, tokens: &'a [String]) -> Result<&'a str> {
    match tokens {
        [token] => Ok(token.as_str()),
        _ => Err(Error::Config(format!(
            "{} expects exactly one value, got {}",
            key,
            tokens.len()
        ))),
    }
}

fn is_none_token(tokens: &[String]) -> bool {
    matches!(tokens, [t] if t == "None")
}

pub(crate) fn parse_bool(key: &str, tokens: &[String]) -> Result<bool> {
    match single(key, tokens)? {
        "True" | "true" => Ok(true),
        "False" | "false" => Ok(false),
        other => Err(Error::Config(format!(
            "{} must be True or False, got '{}'",
            key, other
        ))),
    }
}

pub(crate) fn parse_u32(key: &str, tokens: &[String]) -> Result<u32> {
    let token = single(key, tokens)?;
    token
        .parse()
        .map_err(|e| Error::Config(format!("{} must be an integer, got '{}': {}", key, token, e)))
}

pub(crate) fn parse_f64(key: &str, tokens: &[String]) -> Result<f64> {
    let token = single(key, tokens)?;
    token
        .parse()
        .map_err(|e| Error::Config(format!("{} must be a number, got '{}': {}", key, token, e)))
}

pub(crate) fn parse_string(key: &str, tokens: &[String]) -> Result<String> {
    single(key, tokens).map(str::to_string)
}

/// A single string, or nothing at all for the literal `None`.
pub(crate) fn parse_opt_string(key: &str, tokens: &[String]) -> Result<Option<String>> {
    if is_none_token(tokens) {
        return Ok(None);
    }
    single(key, tokens).map(|t| Some(t.to_string()))
}

pub(crate) fn parse_opt_path(key: &str, tokens: &[String]) -> Result<Option<PathBuf>> {
    Ok(parse_opt_string(key, tokens)?.map(PathBuf::from))
}

pub(crate) fn parse_list(tokens: &[String]) -> Vec<String> {
    tokens.to_vec()
}

pub(crate) fn parse_opt_list(tokens: &[String]) -> Option<Vec<String>> {
    if is_none_token(tokens) {
        None
    } else {
        Some(tokens.to_vec())
    }
}

/// Render a boolean the way the engine's command-line runner expects it.
pub(crate) fn bool_token(value: bool) -> String {
    if value { "True" } else { "False" }.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_assignment_splits_lists() {
        let mut overrides = Overrides::new();
        overrides.parse_assignment("METRICS=HOTA, CLEAR").unwrap();
        overrides.parse_assignment("USE_PARALLEL=True").unwrap();

        assert_eq!(overrides.get("METRICS").unwrap(), &toks(&["HOTA", "CLEAR"])[..]);
        assert_eq!(overrides.get("USE_PARALLEL").unwrap(), &toks(&["True"])[..]);
    }

    #[test]
    fn test_parse_assignment_rejects_missing_equals() {
        let mut overrides = Overrides::new();
        assert!(overrides.parse_assignment("METRICS").is_err());
        assert!(overrides.parse_assignment("=HOTA").is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("K", &toks(&["True"])).unwrap());
        assert!(!parse_bool("K", &toks(&["false"])).unwrap());
        assert!(parse_bool("K", &toks(&["yes"])).is_err());
        assert!(parse_bool("K", &toks(&["1"])).is_err());
        assert!(parse_bool("K", &toks(&["True", "False"])).is_err());
    }

    #[test]
    fn test_parse_numbers() {
        assert_eq!(parse_u32("K", &toks(&["4"])).unwrap(), 4);
        assert!(parse_u32("K", &toks(&["four"])).is_err());
        assert_eq!(parse_f64("K", &toks(&["0.25"])).unwrap(), 0.25);
        assert!(parse_f64("K", &toks(&[])).is_err());
    }

    #[test]
    fn test_none_token_clears_optionals() {
        assert_eq!(parse_opt_string("K", &toks(&["None"])).unwrap(), None);
        assert_eq!(parse_opt_list(&toks(&["None"])), None);
        assert_eq!(
            parse_opt_list(&toks(&["a", "b"])),
            Some(toks(&["a", "b"]))
        );
    }
}
