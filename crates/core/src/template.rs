//! Template rendering engine.
//!
//! Templates are opaque text carrying two disjoint token classes:
//!
//! - plain placeholders `{key}`, replaced by the field value for `key`;
//! - concatenations `{left+right}`, where each operand is a single-quoted
//!   literal (quotes stripped) or a field key, joined with no separator.
//!
//! Field keys resolve case- and convention-insensitively: inserting a field
//! under its canonical key also registers its all-lowercase, snake_case and
//! camelCase spellings (the key-variant closure), so a template authored
//! with any naming convention finds the value. Missing values render as the
//! [`NOT_SPECIFIED`] sentinel (a declared placeholder always resolves to
//! some text), and an unknown key is left literal rather than failing the
//! render.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::OnceLock;

use regex::{Captures, Regex};

/// Sentinel substituted for absent field values.
pub const NOT_SPECIFIED: &str = "Not specified";

/// Fixed degradation text used when no template could be loaded.
pub const TEMPLATE_UNAVAILABLE_MESSAGE: &str = "Report template could not be loaded";

fn plain_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{([A-Za-z][A-Za-z0-9_]*)\}").expect("plain token pattern is valid")
    })
}

fn concat_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{([^{}+]+)\+([^{}+]+)\}").expect("concat token pattern is valid")
    })
}

/// snake_case spelling of a key that contains uppercase letters:
/// `emergencyContactName2` becomes `emergency_contact_name2`.
fn snake_case_variant(key: &str) -> Option<String> {
    if !key.chars().any(|c| c.is_ascii_uppercase()) {
        return None;
    }
    let mut out = String::with_capacity(key.len() + 4);
    for (i, c) in key.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    Some(out)
}

/// camelCase spelling of a key that contains underscores:
/// `first_name` becomes `firstName`.
fn camel_case_variant(key: &str) -> Option<String> {
    if !key.contains('_') {
        return None;
    }
    let mut out = String::with_capacity(key.len());
    let mut upper_next = false;
    for c in key.chars() {
        if c == '_' {
            upper_next = true;
        } else if upper_next {
            out.push(c.to_ascii_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    Some(out)
}

/// Placeholder key to value map, built fresh per render.
///
/// Inserting one canonical key registers its whole variant closure, so
/// lookups succeed regardless of the convention the template author used.
#[derive(Debug, Default)]
pub struct FieldMap {
    values: HashMap<String, String>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a field under its canonical key plus every derived spelling.
    /// `None` registers the [`NOT_SPECIFIED`] sentinel.
    pub fn insert(&mut self, canonical: &str, value: Option<String>) {
        let value = value.unwrap_or_else(|| NOT_SPECIFIED.to_string());
        if let Some(snake) = snake_case_variant(canonical) {
            self.values.insert(snake, value.clone());
        }
        if let Some(camel) = camel_case_variant(canonical) {
            self.values.insert(camel, value.clone());
        }
        self.values.insert(canonical.to_lowercase(), value.clone());
        self.values.insert(canonical.to_string(), value);
    }

    /// Resolves a template key: exact spelling first, then the
    /// all-lowercase form (covers spellings like `FIRSTNAME`).
    pub fn resolve(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .or_else(|| self.values.get(&key.to_lowercase()))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn resolve_operand(operand: &str, fields: &FieldMap) -> String {
    let operand = operand.trim();
    if operand.len() >= 2 && operand.starts_with('\'') && operand.ends_with('\'') {
        return operand[1..operand.len() - 1].to_string();
    }
    fields.resolve(operand).unwrap_or(NOT_SPECIFIED).to_string()
}

/// Renders a template against a field map.
///
/// An empty or whitespace-only template short-circuits to the fixed
/// [`TEMPLATE_UNAVAILABLE_MESSAGE`]. The plain-placeholder pass runs first,
/// then the concatenation pass; the token classes cannot overlap, so order
/// only matters for text a substitution itself introduced.
pub fn render(template: &str, fields: &FieldMap) -> String {
    if template.trim().is_empty() {
        return TEMPLATE_UNAVAILABLE_MESSAGE.to_string();
    }

    let substituted = plain_token_re().replace_all(template, |caps: &Captures<'_>| {
        match fields.resolve(&caps[1]) {
            Some(value) => value.to_string(),
            // Unknown keys stay literal; a render never fails.
            None => caps[0].to_string(),
        }
    });

    concat_token_re()
        .replace_all(&substituted, |caps: &Captures<'_>| {
            let left = resolve_operand(&caps[1], fields);
            let right = resolve_operand(&caps[2], fields);
            format!("{left}{right}")
        })
        .into_owned()
}

/// Failures loading template text. These never fail a report request; the
/// caller degrades to [`TEMPLATE_UNAVAILABLE_MESSAGE`].
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("failed to read template file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to fetch remote template: {0}")]
    Fetch(String),
    #[error("unexpected status fetching remote template: {0}")]
    Status(u16),
    #[error("remote document does not contain a template field")]
    MissingField,
}

/// Where raw template text comes from.
///
/// `File` reads a packaged resource from disk on every render, so template
/// edits show up without a restart. `Remote` fetches a document that embeds
/// the template as an escaped `template: "..."` field and rewrites the
/// literal concatenation idiom `{a+' '+b}` into plain `{a} {b}` placeholders
/// before use.
pub enum TemplateStore {
    File(PathBuf),
    Remote {
        url: String,
        client: reqwest::Client,
    },
}

impl TemplateStore {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    pub fn remote(url: impl Into<String>) -> Self {
        Self::Remote {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Loads the template text this store points at.
    pub async fn read_template(&self) -> Result<String, TemplateError> {
        match self {
            Self::File(path) => {
                let text = tokio::fs::read_to_string(path)
                    .await
                    .map_err(TemplateError::FileRead)?;
                tracing::debug!(path = %path.display(), length = text.len(), "template loaded");
                Ok(text)
            }
            Self::Remote { url, client } => {
                let response = client
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| TemplateError::Fetch(e.to_string()))?;
                let status = response.status();
                if !status.is_success() {
                    return Err(TemplateError::Status(status.as_u16()));
                }
                let body = response
                    .text()
                    .await
                    .map_err(|e| TemplateError::Fetch(e.to_string()))?;
                let raw = extract_template_field(&body).ok_or(TemplateError::MissingField)?;
                Ok(rewrite_concat_idiom(&raw))
            }
        }
    }
}

fn template_field_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#""?template"?\s*:\s*"((?:\\.|[^"\\])*)""#)
            .expect("template field pattern is valid")
    })
}

/// Extracts the escaped template string from a remote document by pattern
/// match on its `template: "..."` field.
pub fn extract_template_field(document: &str) -> Option<String> {
    let caps = template_field_re().captures(document)?;
    Some(unescape(&caps[1]))
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn concat_idiom_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\s*([A-Za-z][A-Za-z0-9_]*)\s*\+\s*'([^']*)'\s*\+\s*([A-Za-z][A-Za-z0-9_]*)\s*\}")
            .expect("concat idiom pattern is valid")
    })
}

/// Rewrites the remote-document concatenation idiom `{a+' '+b}` into the
/// `{a} {b}` placeholder form the renderer consumes.
pub fn rewrite_concat_idiom(template: &str) -> String {
    concat_idiom_re()
        .replace_all(template, |caps: &Captures<'_>| {
            format!("{{{}}}{}{{{}}}", &caps[1], &caps[2], &caps[3])
        })
        .into_owned()
}
