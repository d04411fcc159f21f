//! WCAG 2.4.6 headings-and-labels checker.
//!
//! The crate implements a single linear pipeline: load a page in a headless
//! Chromium instance, extract heading and form-label elements with their
//! surrounding context, judge each element's descriptiveness with a language
//! model, and aggregate the verdicts into a compliance report.

pub mod classify;
pub mod config;
pub mod extract;
pub mod loader;
pub mod logging;
pub mod pipeline;
pub mod prompts;
pub mod report;

pub use classify::{Classifier, JudgmentProvider, Verdict};
pub use config::CheckerConfig;
pub use extract::{ElementKind, PageElement, extract_elements};
pub use pipeline::{CheckError, run_check};
pub use report::ComplianceReport;
