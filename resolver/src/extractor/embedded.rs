/// Embedded-object strategy: JSON literals assigned to script globals.
///
/// Looks for `marker = {...}`, `marker = [...]` or `marker({...})` in the
/// page body, cuts out the balanced literal and deep-scans it.
use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use super::deep_scan::MediaScanner;
use super::{ExtractionContext, ExtractionStrategy, StrategyOutcome};

pub struct EmbeddedObjectStrategy {
    markers: Vec<(String, Regex)>,
    scanner: MediaScanner,
}

impl EmbeddedObjectStrategy {
    pub fn new(markers: &[String], scanner: MediaScanner) -> Result<Self, regex::Error> {
        let markers = markers
            .iter()
            .map(|name| {
                let re = Regex::new(&format!(r"{}\s*(?:=|\()\s*", regex::escape(name)))?;
                Ok((name.clone(), re))
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self { markers, scanner })
    }

    /// Scan the body synchronously; the strategy itself does no I/O.
    pub fn scan_body(&self, body: &str) -> StrategyOutcome {
        let mut malformed: Option<String> = None;

        for (name, re) in &self.markers {
            for m in re.find_iter(body) {
                let literal = match balanced_literal(&body[m.end()..]) {
                    Some(Ok(literal)) => literal,
                    Some(Err(reason)) => {
                        debug!("Marker {} has an unterminated literal", name);
                        malformed.get_or_insert_with(|| format!("{}: {}", name, reason));
                        continue;
                    }
                    None => continue,
                };

                match serde_json::from_str::<serde_json::Value>(literal) {
                    Ok(value) => {
                        let found = self.scanner.scan(&value);
                        if !found.is_empty() {
                            debug!("Marker {} yielded {} media URL(s)", name, found.len());
                            return StrategyOutcome::Found(found);
                        }
                        debug!("Marker {} parsed but holds no media URLs", name);
                    }
                    Err(e) => {
                        debug!("Marker {} literal is not valid JSON: {}", name, e);
                        malformed.get_or_insert_with(|| format!("{}: {}", name, e));
                    }
                }
            }
        }

        match malformed {
            Some(reason) => StrategyOutcome::Malformed(reason),
            None => StrategyOutcome::NotApplicable,
        }
    }
}

#[async_trait]
impl ExtractionStrategy for EmbeddedObjectStrategy {
    fn name(&self) -> &'static str {
        "embedded_object"
    }

    async fn attempt(&self, ctx: &ExtractionContext<'_>) -> StrategyOutcome {
        self.scan_body(&ctx.fetch.body_text)
    }
}

/// Cut the `{...}` or `[...]` literal at the start of `text`.
///
/// Returns `None` when `text` does not open with a bracket and
/// `Some(Err)` when the literal never closes. Brackets inside quoted
/// strings are ignored.
pub(crate) fn balanced_literal(text: &str) -> Option<Result<&str, &'static str>> {
    let first = text.chars().next()?;
    if first != '{' && first != '[' {
        return None;
    }

    let mut stack: Vec<char> = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (idx, ch) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }

        match ch {
            '"' | '\'' => quote = Some(ch),
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.pop() != Some(ch) {
                    return Some(Err("mismatched bracket"));
                }
                if stack.is_empty() {
                    return Some(Ok(&text[..idx + ch.len_utf8()]));
                }
            }
            _ => {}
        }
    }
    Some(Err("unterminated literal"))
}
