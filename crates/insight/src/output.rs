//! Terminal output - ASCII only, colored with owo-colors.

use insight_shared::{AnswerResult, ClarificationRequest, ProvenanceSummary};
use owo_colors::OwoColorize;

/// Plain-text rendering, no color codes
pub fn format_plain(result: &AnswerResult) -> String {
    let mut out = String::new();
    match result {
        AnswerResult::Answer { text, provenance } => {
            out.push_str(text);
            out.push('\n');
            out.push_str(&format_provenance(provenance));
        }
        AnswerResult::Clarification(req) => out.push_str(&format_clarification(req)),
    }
    out
}

fn format_provenance(p: &ProvenanceSummary) -> String {
    let mut out = format!(
        "\n[EVIDENCE] strategy={} attempts={} verdict={}\n",
        p.strategy, p.attempts, p.verdict
    );
    for source in &p.sources {
        out.push_str(&format!("  * [source: {}]\n", source));
    }
    out
}

fn format_clarification(req: &ClarificationRequest) -> String {
    let mut out = format!("[CLARIFY] {}\n", req.code);
    for reason in &req.reasons {
        out.push_str(&format!("  - {}\n", reason.message));
    }
    if !req.suggestions.is_empty() {
        out.push_str("\nTry:\n");
        for (i, s) in req.suggestions.iter().enumerate() {
            out.push_str(&format!("  {}. {}\n", i + 1, s));
        }
    }
    out
}

/// Display a result to the user
pub fn display(result: &AnswerResult) {
    match result {
        AnswerResult::Answer { text, provenance } => {
            println!("{}  {}", "[OK]".bright_green(), text);
            println!();
            println!(
                "[EVIDENCE] strategy={} attempts={} verdict={}",
                provenance.strategy, provenance.attempts, provenance.verdict
            );
            for source in &provenance.sources {
                println!("  * [source: {}]", source.cyan());
            }
        }
        AnswerResult::Clarification(req) => {
            println!("{}  {}", "[CLARIFY]".yellow(), req.code.yellow());
            for reason in &req.reasons {
                println!("  - {}", reason.message);
            }
            if !req.suggestions.is_empty() {
                println!();
                println!("Try:");
                for (i, s) in req.suggestions.iter().enumerate() {
                    println!("  {}. {}", i + 1, s.cyan());
                }
            }
        }
    }
}
