//! Prompt assembly for the descriptiveness classifier.

use crate::extract::{ElementKind, PageElement};

pub fn build_classifier_system_prompt() -> String {
    "You are an accessibility testing expert specialising in WCAG 2.4.6 (Headings and Labels).\n\
     Your task is to judge whether a heading or form label describes its topic or purpose.\n\n\
     Evaluation criteria for headings (h1-h6):\n\
     - Does the heading clearly describe the content of its section?\n\
     - Is it specific and unique rather than vague (e.g. 'Click Here', 'More')?\n\n\
     Evaluation criteria for labels:\n\
     - Does the label clearly describe the purpose of the form control?\n\
     - Would a user know what input is expected from the label text alone?\n\n\
     Judge the text on its own merits: assume the reader cannot see the visual layout,\n\
     only the text and the structural context provided.\n\n\
     Respond with JSON only, matching this shape:\n\
     {\"descriptive\": true/false, \"evaluation\": \"short assessment\", \"recommendations\": [\"suggestion\", ...]}\n\
     Leave recommendations empty when no improvement is needed."
        .to_string()
}

pub fn build_element_prompt(url: &str, element: &PageElement) -> String {
    let role = match element.kind {
        ElementKind::Heading => {
            let level = element.level.unwrap_or(1);
            format!("heading (level {level})")
        }
        ElementKind::Label => "form label".to_string(),
    };

    let context = if element.context.is_empty() {
        "none".to_string()
    } else {
        element.context.clone()
    };

    format!(
        "Page under test: {url}\n\n\
         Element to analyse:\n\
         - role: {role}\n\
         - text: {text}\n\
         - surrounding context: {context}\n\
         - location: {source_ref}\n\n\
         Does the text alone let a user or assistive-technology consumer understand the {goal} it announces?",
        text = element.text,
        source_ref = element.source_ref,
        goal = match element.kind {
            ElementKind::Heading => "topic",
            ElementKind::Label => "purpose",
        },
    )
}
