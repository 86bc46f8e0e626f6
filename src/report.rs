//! Compliance report rendering.
//!
//! Renders a [`ComparisonResult`] as plain text, pretty JSON, or a
//! standalone HTML page. Rendering is pure: the same result always produces
//! the same string, and every format lists the items in result order.

use std::fmt::Write as _;
use std::str::FromStr;

use crate::compliance::{ComparisonResult, ComplianceStatus};
use crate::error::{RagError, Result};

const RULE_WIDTH: usize = 70;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Plain,
    Structured,
    Markup,
}

impl FromStr for ReportFormat {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "plain" => Ok(ReportFormat::Plain),
            "json" | "structured" => Ok(ReportFormat::Structured),
            "html" | "markup" | "marked-up" => Ok(ReportFormat::Markup),
            other => Err(RagError::unsupported(format!(
                "Unknown report format: {} (expected text, json, or html)",
                other
            ))),
        }
    }
}

pub fn render(result: &ComparisonResult, format: ReportFormat) -> Result<String> {
    match format {
        ReportFormat::Structured => Ok(serde_json::to_string_pretty(result)?),
        ReportFormat::Plain => Ok(render_plain(result)),
        ReportFormat::Markup => Ok(render_html(result)),
    }
}

fn render_plain(result: &ComparisonResult) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut out = String::new();

    let _ = writeln!(out, "{rule}\nCOMPLIANCE REPORT\n{rule}\n");
    let _ = writeln!(out, "{}\n", result.summary);
    let _ = writeln!(out, "{rule}\nDETAILED FINDINGS\n{rule}\n");

    for item in &result.items {
        let _ = writeln!(
            out,
            "[{}] {}",
            item.requirement_id,
            item.status.as_str().to_uppercase()
        );
        let _ = writeln!(out, "Requirement: {}", item.requirement_text);
        if let Some(expected) = &item.expected_value {
            let _ = writeln!(out, "Expected: {}", expected);
        }
        if let Some(found) = &item.found_value {
            let _ = writeln!(out, "Found: {}", found);
        }
        if !item.evidence.is_empty() {
            out.push_str("Evidence:\n");
            for (i, ev) in item.evidence.iter().enumerate() {
                let _ = writeln!(out, "  {}. {} (Score: {:.2})", i + 1, ev.snippet, ev.score);
            }
        }
        if !item.notes.is_empty() {
            let _ = writeln!(out, "Notes: {}", item.notes);
        }
        out.push('\n');
    }

    let _ = writeln!(out, "{rule}\nReport generated: {}", result.timestamp.to_rfc3339());
    out
}

fn status_color(status: ComplianceStatus) -> &'static str {
    match status {
        ComplianceStatus::Compliant => "green",
        ComplianceStatus::Partial => "orange",
        ComplianceStatus::NonCompliant => "red",
        ComplianceStatus::Unknown => "gray",
    }
}

fn render_html(result: &ComparisonResult) -> String {
    let mut out = String::new();
    let _ = write!(
        out,
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
         <title>Compliance Report - {}</title>\n<style>\n\
         body {{ font-family: Arial, sans-serif; margin: 20px; }}\n\
         h1, h2 {{ color: #333; }}\n\
         .summary {{ background-color: #f5f5f5; padding: 15px; border-radius: 5px; }}\n\
         .item {{ margin: 20px 0; padding: 10px; border-left: 4px solid #ddd; }}\n\
         .evidence {{ margin-left: 20px; font-size: 0.9em; color: #666; }}\n",
        escape(&result.document_name)
    );
    for status in [
        ComplianceStatus::Compliant,
        ComplianceStatus::Partial,
        ComplianceStatus::NonCompliant,
        ComplianceStatus::Unknown,
    ] {
        let (class, color) = (status.as_str(), status_color(status));
        let _ = writeln!(out, ".{class} {{ color: {color}; font-weight: bold; }}");
        let _ = writeln!(out, ".item.{class} {{ border-left-color: {color}; color: inherit; font-weight: normal; }}");
    }
    out.push_str("</style>\n</head>\n<body>\n<h1>Compliance Report</h1>\n");

    let _ = write!(
        out,
        "<div class=\"summary\">\n<h2>{}</h2>\n\
         <p><strong>Specification:</strong> {}</p>\n\
         <p><strong>Compliance:</strong> <span style=\"font-size: 1.5em;\">{:.1}%</span></p>\n\
         <p>Compliant: {} | Partial: {} | Non-Compliant: {} | Unknown: {}</p>\n</div>\n",
        escape(&result.document_name),
        escape(&result.spec_name),
        result.compliance_percentage,
        result.compliant_items,
        result.partial_items,
        result.non_compliant_items,
        result.unknown_items
    );

    out.push_str("<h2>Detailed Findings</h2>\n");
    for item in &result.items {
        let class = item.status.as_str();
        let _ = write!(
            out,
            "<div class=\"item {class}\">\n<h3>[{}] <span class=\"{class}\">{}</span></h3>\n\
             <p><strong>Requirement:</strong> {}</p>\n",
            escape(&item.requirement_id),
            class.to_uppercase(),
            escape(&item.requirement_text)
        );
        if let Some(expected) = &item.expected_value {
            let _ = writeln!(out, "<p><strong>Expected:</strong> {}</p>", escape(expected));
        }
        if let Some(found) = &item.found_value {
            let _ = writeln!(out, "<p><strong>Found:</strong> {}</p>", escape(found));
        }
        if !item.evidence.is_empty() {
            out.push_str("<div class=\"evidence\"><strong>Evidence:</strong><ul>\n");
            for ev in &item.evidence {
                let _ = writeln!(
                    out,
                    "<li>{} (Score: {:.2})</li>",
                    escape(&ev.snippet),
                    ev.score
                );
            }
            out.push_str("</ul></div>\n");
        }
        if !item.notes.is_empty() {
            let _ = writeln!(out, "<p><strong>Notes:</strong> {}</p>", escape(&item.notes));
        }
        out.push_str("</div>\n");
    }

    let _ = write!(
        out,
        "<p><em>Report generated: {}</em></p>\n</body>\n</html>\n",
        result.timestamp.to_rfc3339()
    );
    out
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
