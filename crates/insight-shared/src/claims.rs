//! Claim extraction and provenance tracing.
//!
//! A claim is a figure ("50", "$12,345.67", "-4.5%") or an entity identifier
//! ("S001", "CAT-07") found in a candidate answer. A claim is traced when the
//! same figure or identifier appears in the aggregated context. Figures may
//! also come from the question ("top 5"); identifiers may not.
//!
//! # Matching Rules
//!
//! - Figures compare numerically and with their sign after removing `$`, `,`
//!   and `%`; a context value matches when rounded to the claim's decimal
//!   places (context `150000.0` traces claim `150000`, context `12.346`
//!   traces `12.35`, context `-5.2` does not trace `+5.2`)
//! - A leading `-` or `+` is a sign only when it does not follow a letter or
//!   digit (`2024-03` is two unsigned figures)
//! - Identifiers compare case-insensitively
//! - Capitalized names inside a sentence ("Frozen Foods") must appear in the
//!   context text
//! - Derived figures (sums, differences) are not traced

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::OnceLock;

fn figure_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$?\b(\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?)\b%?")
            .expect("figure regex is valid")
    })
}

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b[A-Z]{1,5}[-_]?\d{1,6}\b").expect("identifier regex is valid")
    })
}

fn capitalized_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b[A-Z][a-z]+(?:[ ][A-Z][a-z]+)*\b").expect("name regex is valid")
    })
}

fn named_value_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[A-Za-z_]+=([A-Za-z][A-Za-z &'-]*[A-Za-z])").expect("named value regex is valid")
    })
}

/// A checkable statement inside an answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Claim {
    Figure {
        raw: String,
        value: f64,
        decimals: usize,
    },
    Identifier {
        raw: String,
    },
}

impl Claim {
    pub fn raw(&self) -> &str {
        match self {
            Claim::Figure { raw, .. } | Claim::Identifier { raw } => raw,
        }
    }
}

fn parse_figure(digits: &str) -> Option<(f64, usize)> {
    let clean = digits.replace(',', "");
    let value = clean.parse::<f64>().ok()?;
    let decimals = clean.split_once('.').map(|(_, f)| f.len()).unwrap_or(0);
    Some((value, decimals))
}

/// Sign character directly before byte offset `start`, if it acts as a sign.
fn sign_before(text: &str, start: usize) -> Option<char> {
    let mut rev = text[..start].chars().rev();
    let sign = rev.next().filter(|c| matches!(c, '-' | '+' | '\u{2212}'))?;
    match rev.next() {
        Some(c) if c.is_alphanumeric() => None,
        _ => Some(sign),
    }
}

/// Every figure in `text` as (raw, signed value, decimals, start offset).
fn figures(text: &str) -> Vec<(String, f64, usize, usize)> {
    let mut out = Vec::new();
    for caps in figure_re().captures_iter(text) {
        let (Some(whole), Some(digits)) = (caps.get(0), caps.get(1)) else { continue };
        let Some((value, decimals)) = parse_figure(digits.as_str()) else { continue };
        let (raw, value, start) = match sign_before(text, whole.start()) {
            Some(sign) => {
                let start = whole.start() - sign.len_utf8();
                let value = if sign == '+' { value } else { -value };
                (text[start..whole.end()].to_string(), value, start)
            }
            None => (whole.as_str().to_string(), value, whole.start()),
        };
        out.push((raw, value, decimals, start));
    }
    out
}

/// Capitalized names in `text`, without the first word of a sentence.
pub fn capitalized_names(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for m in capitalized_name_re().find_iter(text) {
        let before = text[..m.start()].trim_end_matches([' ', '\t']);
        let sentence_start = before.is_empty()
            || before.ends_with(['.', '!', '?', ':', '\n', '-', '*', '(', '"']);
        let name = if sentence_start {
            match m.as_str().split_once(' ') {
                Some((_, rest)) => rest,
                None => continue,
            }
        } else {
            m.as_str()
        };
        out.push(name.to_string());
    }
    out
}

/// Extract figure and identifier claims from free text.
pub fn extract_claims(text: &str) -> Vec<Claim> {
    let mut claims = Vec::new();
    let mut id_spans = Vec::new();

    for m in identifier_re().find_iter(text) {
        id_spans.push(m.range());
        claims.push(Claim::Identifier {
            raw: m.as_str().to_string(),
        });
    }

    for (raw, value, decimals, start) in figures(text) {
        if id_spans.iter().any(|r| r.start <= start && start < r.end) {
            continue;
        }
        claims.push(Claim::Figure { raw, value, decimals });
    }

    claims
}

/// Everything a claim may be traced to
#[derive(Debug, Clone, Default)]
pub struct ClaimIndex {
    figures: Vec<f64>,
    identifiers: HashSet<String>,
    named_values: Vec<String>,
    /// Lowercased evidence text, for name lookups
    corpus: String,
}

impl ClaimIndex {
    /// Index one or more context texts.
    pub fn from_texts(texts: &[&str]) -> Self {
        let mut index = Self::default();
        for text in texts {
            index.add_figures(text);
            index.corpus.push_str(&text.to_lowercase());
            index.corpus.push('\n');
            for m in identifier_re().find_iter(&text.to_uppercase()) {
                index.identifiers.insert(m.as_str().to_string());
            }
            for caps in named_value_re().captures_iter(text) {
                if let Some(v) = caps.get(1) {
                    let v = v.as_str().trim().to_lowercase();
                    if v.len() > 2 && v != "null" && v != "true" && v != "false" {
                        index.named_values.push(v);
                    }
                }
            }
        }
        index.named_values.sort();
        index.named_values.dedup();
        index
    }

    /// Accept figures from `text` (the question) without its identifiers or names.
    pub fn with_figures_from(mut self, text: &str) -> Self {
        self.add_figures(text);
        self
    }

    fn add_figures(&mut self, text: &str) {
        self.figures.extend(figures(text).into_iter().map(|(_, value, _, _)| value));
    }

    /// Whether a capitalized name appears in the evidence text
    pub fn has_name(&self, name: &str) -> bool {
        contains_word(&self.corpus, &name.to_lowercase())
    }

    fn has_figure(&self, value: f64, decimals: usize) -> bool {
        let scale = 10f64.powi(decimals.min(9) as i32);
        self.figures.iter().any(|c| {
            let rounded = (c * scale).round() / scale;
            (rounded - value).abs() <= 1e-9 * value.abs().max(1.0)
        })
    }

    /// Whether a single claim is backed by indexed evidence
    pub fn traces(&self, claim: &Claim) -> bool {
        match claim {
            Claim::Figure { value, decimals, .. } => self.has_figure(*value, *decimals),
            Claim::Identifier { raw } => self.identifiers.contains(&raw.to_uppercase()),
        }
    }

    /// Named entity values from `key=value` context lines mentioned in `text`
    pub fn named_mentions(&self, text: &str) -> Vec<String> {
        let lower = text.to_lowercase();
        self.named_values
            .iter()
            .filter(|v| contains_word(&lower, v))
            .cloned()
            .collect()
    }
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(i, _)| {
        let before = haystack[..i].chars().next_back();
        let after = haystack[i + needle.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

/// Result of tracing one answer's claims
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceReport {
    pub traced: Vec<Claim>,
    pub untraced: Vec<Claim>,
    /// Context entity names the answer mentions
    pub named_mentions: Vec<String>,
    /// Capitalized names absent from the evidence text
    pub unknown_names: Vec<String>,
}

impl TraceReport {
    /// At least one claim or named entity is backed by context
    pub fn uses_data(&self) -> bool {
        !self.traced.is_empty() || !self.named_mentions.is_empty()
    }

    pub fn all_traced(&self) -> bool {
        self.untraced.is_empty()
    }
}

/// Trace every claim of `answer` against the index.
pub fn trace_claims(answer: &str, index: &ClaimIndex) -> TraceReport {
    let mut report = TraceReport {
        named_mentions: index.named_mentions(answer),
        unknown_names: capitalized_names(answer)
            .into_iter()
            .filter(|n| !index.has_name(n))
            .collect(),
        ..Default::default()
    };
    for claim in extract_claims(answer) {
        if index.traces(&claim) {
            report.traced.push(claim);
        } else {
            report.untraced.push(claim);
        }
    }
    report
}
