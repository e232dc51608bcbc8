//! Parsing of `pragma solidity` version constraints.

use anyhow::Context;
use semver::{Version, VersionReq};

/// Comparison operators that may be separated from their version by whitespace.
const OPERATORS: [&str; 7] = [">=", "<=", ">", "<", "=", "^", "~"];

/// A version constraint declared by one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PragmaRequirement {
    /// Path of the source file declaring the pragma.
    pub path: String,
    /// Raw constraint text as written after `pragma solidity`.
    pub raw: String,
    /// Alternatives joined by `||`; any one of them must hold.
    alternatives: Vec<VersionReq>,
}

impl PragmaRequirement {
    /// Parse the constraint text of a `pragma solidity` directive.
    pub fn parse(path: impl Into<String>, raw: &str) -> anyhow::Result<Self> {
        let path = path.into();
        let alternatives = raw
            .split("||")
            .map(|alt| to_version_req(alt.trim()))
            .collect::<anyhow::Result<Vec<_>>>()
            .with_context(|| format!("Invalid solidity pragma '{}' in {}", raw, path))?;

        Ok(Self {
            path,
            raw: raw.trim().to_string(),
            alternatives,
        })
    }

    /// Whether `version` satisfies this constraint.
    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }
}

/// Convert one solidity comparator set into a [`VersionReq`].
///
/// Solidity separates comparators by whitespace and treats a bare version as an
/// exact match, whereas `semver` wants commas and reads a bare version as `^`.
fn to_version_req(alt: &str) -> anyhow::Result<VersionReq> {
    let mut comparators: Vec<String> = Vec::new();
    let mut pending_op: Option<&str> = None;

    for token in alt.split_whitespace() {
        if OPERATORS.contains(&token) {
            pending_op = Some(token);
            continue;
        }

        let comparator = match pending_op.take() {
            Some(op) => format!("{}{}", op, token),
            None if token.starts_with(|c: char| c.is_ascii_digit()) => format!("={}", token),
            None => token.to_string(),
        };
        comparators.push(comparator);
    }

    if let Some(op) = pending_op {
        anyhow::bail!("Dangling operator '{}' in version constraint", op);
    }
    if comparators.is_empty() {
        anyhow::bail!("Empty version constraint");
    }

    VersionReq::parse(&comparators.join(", "))
        .with_context(|| format!("Failed to parse version constraint '{}'", alt))
}

/// Extract every `pragma solidity` directive from a source file.
///
/// Directives inside `//` or `/* */` comments are ignored.
pub fn extract_pragmas(path: &str, content: &str) -> anyhow::Result<Vec<PragmaRequirement>> {
    let mut pragmas = Vec::new();

    for line in strip_comments(content).lines() {
        let line = line.trim();
        let Some(rest) = line.strip_prefix("pragma solidity") else {
            continue;
        };
        let constraint = rest
            .split(';')
            .next()
            .filter(|_| rest.contains(';'))
            .with_context(|| format!("Unterminated solidity pragma in {}", path))?;
        pragmas.push(PragmaRequirement::parse(path, constraint)?);
    }

    Ok(pragmas)
}

/// Blank out `//` and `/* */` comments, keeping string literals and line breaks.
pub(super) fn strip_comments(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if c == '\\' {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            } else if c == q {
                quote = None;
            }
            continue;
        }

        let next = chars.peek().copied();
        match (c, next) {
            ('"' | '\'', _) => {
                quote = Some(c);
                out.push(c);
            }
            ('/', Some('/')) => {
                while chars.next_if(|&n| n != '\n').is_some() {}
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for n in chars.by_ref() {
                    if n == '\n' {
                        out.push('\n');
                    }
                    if prev == '*' && n == '/' {
                        break;
                    }
                    prev = n;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }

    out
}
