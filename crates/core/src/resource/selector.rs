//! Equality-based label and field selectors.
//!
//! Supported terms: `k=v`, `k==v`, `k!=v`, `k` and `!k`, comma separated.
//! Set-based terms (`in`, `notin`) are rejected.

use super::Object;
use crate::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Requirement {
    Equals(String, String),
    NotEquals(String, String),
    Exists(String),
    NotExists(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    requirements: Vec<Requirement>,
}

impl Selector {
    pub fn parse(expr: &str) -> Result<Self, Error> {
        let mut requirements = Vec::new();
        for term in expr.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            requirements.push(parse_term(term)?);
        }
        Ok(Self { requirements })
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    /// Match against `metadata.labels`.
    pub fn matches_labels(&self, object: &Object) -> bool {
        let labels = object.labels();
        let lookup = |key: &str| labels.and_then(|l| l.get(key)).and_then(|v| v.as_str()).map(str::to_string);
        self.matches_with(lookup)
    }

    /// Match against dotted object paths.
    pub fn matches_fields(&self, object: &Object) -> bool {
        self.matches_with(|path| object.field(path))
    }

    fn matches_with(&self, lookup: impl Fn(&str) -> Option<String>) -> bool {
        self.requirements.iter().all(|req| match req {
            Requirement::Equals(k, v) => lookup(k).as_deref() == Some(v.as_str()),
            Requirement::NotEquals(k, v) => lookup(k).as_deref() != Some(v.as_str()),
            Requirement::Exists(k) => lookup(k).is_some(),
            Requirement::NotExists(k) => lookup(k).is_none(),
        })
    }
}

fn parse_term(term: &str) -> Result<Requirement, Error> {
    if term.contains('(') || term.contains(" in ") || term.contains(" notin ") {
        return Err(Error::InvalidRequest(format!("unsupported selector term: {term}")));
    }

    let req = if let Some((k, v)) = term.split_once("!=") {
        Requirement::NotEquals(k.trim().to_string(), v.trim().to_string())
    } else if let Some((k, v)) = term.split_once("==") {
        Requirement::Equals(k.trim().to_string(), v.trim().to_string())
    } else if let Some((k, v)) = term.split_once('=') {
        Requirement::Equals(k.trim().to_string(), v.trim().to_string())
    } else if let Some(k) = term.strip_prefix('!') {
        Requirement::NotExists(k.trim().to_string())
    } else {
        Requirement::Exists(term.to_string())
    };

    let key = match &req {
        Requirement::Equals(k, _) | Requirement::NotEquals(k, _) | Requirement::Exists(k) | Requirement::NotExists(k) => k,
    };
    if key.is_empty() || key.contains(char::is_whitespace) {
        return Err(Error::InvalidRequest(format!("invalid selector term: {term}")));
    }

    Ok(req)
}
