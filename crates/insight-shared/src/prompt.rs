//! Prompt templates held as configuration data.
//!
//! One parameterized pipeline renders every strategy; wording lives here (or
//! in the `[prompts]` config section), never in control flow.
//! Placeholders: `{question}`, `{verdict}`, `{context}`, `{feedback}`,
//! `{entity}`, `{answer}`.

use crate::candidate::Strategy;
use serde::{Deserialize, Serialize};

/// Per-strategy generation templates plus the alignment judge template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplates {
    #[serde(default = "default_direct")]
    pub direct: String,

    #[serde(default = "default_contextual")]
    pub contextual: String,

    #[serde(default = "default_comprehensive")]
    pub comprehensive: String,

    #[serde(default = "default_judge")]
    pub judge: String,
}

fn default_direct() -> String {
    r#"Strategy: direct
You answer grocery retail analytics questions using only the data below.
Give the shortest possible answer: the figure or entity with its unit. No explanation.

Question ({verdict}): {question}

Data:
{context}
{feedback}
Answer:"#
        .to_string()
}

fn default_contextual() -> String {
    r#"Strategy: contextual
You answer grocery retail analytics questions using only the data below.
Answer in one or two sentences and cite the immediate supporting figures exactly as they appear in the data.

Question ({verdict}): {question}

Data:
{context}
{feedback}
Answer:"#
        .to_string()
}

fn default_comprehensive() -> String {
    r#"Strategy: comprehensive
You answer grocery retail analytics questions using only the data below.
Answer the question, then explain the drivers or root causes. Every figure and entity you mention must appear in the data.

Question ({verdict}): {question}

Data:
{context}
{feedback}
Answer:"#
        .to_string()
}

fn default_judge() -> String {
    r#"Evaluate the candidate answer against the question and the data. Output JSON only:
{"directly_answers":true,"uses_retrieved_data":true,"correct_entity_type":true,"appropriate_detail_level":true,"no_unverifiable_claims":true}

Rules: directly_answers = answers the question with no evasion or off-topic content.
uses_retrieved_data = every figure and named entity comes from the data.
correct_entity_type = the answer is about {entity}.
appropriate_detail_level = terse for a simple question, elaborated for a complex one.
no_unverifiable_claims = nothing in the answer is absent from the data.

Question ({verdict}): {question}

Data:
{context}

Candidate answer:
{answer}
JSON ONLY."#
        .to_string()
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            direct: default_direct(),
            contextual: default_contextual(),
            comprehensive: default_comprehensive(),
            judge: default_judge(),
        }
    }
}

impl PromptTemplates {
    pub fn for_strategy(&self, strategy: Strategy) -> &str {
        match strategy {
            Strategy::Direct => &self.direct,
            Strategy::Contextual => &self.contextual,
            Strategy::Comprehensive => &self.comprehensive,
        }
    }
}

/// Substitute `{name}` placeholders in one pass over the template.
/// Unknown braces are left untouched and substituted values are never rescanned.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open + 1..];
        let value = tail.find('}').and_then(|close| {
            let name = &tail[..close];
            vars.iter().find(|(n, _)| *n == name).map(|(_, v)| (close, *v))
        });
        match value {
            Some((close, value)) => {
                out.push_str(value);
                rest = &tail[close + 1..];
            }
            None => {
                out.push('{');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}
