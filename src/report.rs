//! Compliance aggregation and report rendering.
//!
//! A pure computation over the ordered verdict sequence. Printing the
//! rendered report is the caller's concern.

use std::fmt::Write as _;

use crate::classify::Verdict;
use crate::extract::ElementKind;

/// Terminal artifact of a run: counts, the compliance flag, and the ordered
/// per-element details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplianceReport {
    pub url: String,
    pub total_elements: usize,
    pub heading_count: usize,
    pub label_count: usize,
    pub descriptive_count: usize,
    pub non_descriptive_count: usize,
    pub overall_compliant: bool,
    pub details: Vec<Verdict>,
}

impl ComplianceReport {
    /// Aggregate the full ordered verdict sequence. A page with no headings
    /// or labels is vacuously compliant.
    pub fn from_verdicts(url: impl Into<String>, details: Vec<Verdict>) -> Self {
        let total_elements = details.len();
        let heading_count = details
            .iter()
            .filter(|verdict| verdict.element.kind == ElementKind::Heading)
            .count();
        let label_count = total_elements - heading_count;
        let descriptive_count = details
            .iter()
            .filter(|verdict| verdict.is_descriptive)
            .count();
        let non_descriptive_count = total_elements - descriptive_count;

        ComplianceReport {
            url: url.into(),
            total_elements,
            heading_count,
            label_count,
            descriptive_count,
            non_descriptive_count,
            overall_compliant: non_descriptive_count == 0,
            details,
        }
    }

    /// Render the human-readable report.
    pub fn render(&self) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "=== WCAG 2.4.6 Compliance Report ===");
        let _ = writeln!(out, "URL: {}", self.url);
        let _ = writeln!(out);

        for verdict in &self.details {
            let element = &verdict.element;
            let kind = match element.kind {
                ElementKind::Heading => {
                    format!("heading (h{})", element.level.unwrap_or(1))
                }
                ElementKind::Label => "label".to_string(),
            };
            let status = if verdict.is_descriptive {
                "descriptive"
            } else {
                "NOT descriptive"
            };

            let _ = writeln!(out, "- {kind}: \"{}\"", element.text);
            let _ = writeln!(out, "  location: {}", element.source_ref);
            let _ = writeln!(out, "  verdict: {status}");
            if !verdict.rationale.is_empty() {
                let _ = writeln!(out, "  rationale: {}", verdict.rationale);
            }
            if !verdict.is_descriptive && !verdict.recommendations.is_empty() {
                let _ = writeln!(out, "  recommendations:");
                for recommendation in &verdict.recommendations {
                    let _ = writeln!(out, "    - {recommendation}");
                }
            }
        }

        if !self.details.is_empty() {
            let _ = writeln!(out);
        }

        let _ = writeln!(out, "Total elements:    {}", self.total_elements);
        let _ = writeln!(out, "  headings:        {}", self.heading_count);
        let _ = writeln!(out, "  labels:          {}", self.label_count);
        let _ = writeln!(out, "Descriptive:       {}", self.descriptive_count);
        let _ = writeln!(out, "Not descriptive:   {}", self.non_descriptive_count);
        let _ = writeln!(
            out,
            "WCAG 2.4.6:        {}",
            if self.overall_compliant {
                "COMPLIANT"
            } else {
                "NOT COMPLIANT"
            }
        );

        out
    }
}
