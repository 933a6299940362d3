//! # Golden Tests
//!
//! These tests ensure that receipt formatting and the compiled print job
//! stay byte-for-byte stable.
//!
//! ## Test Coverage
//!
//! - **Text** (`.txt`): the demo receipt at a fixed time, one line per row.
//! - **Job shape**: the compiled write sequence for the same receipt.
//!
//! ## Regenerating Golden Files
//!
//! ```bash
//! cargo test generate_golden_files -- --ignored --nocapture
//! ```

use chrono::{DateTime, TimeZone, Utc};
use pretty_assertions::assert_eq;
use std::fs;
use struk::printer::{PrintPipeline, Step};
use struk::protocol::PrinterCommand;
use struk::receipt::{ReceiptDocument, StoreProfile, demo_sale, format_receipt};

/// Path to golden test directory
const GOLDEN_DIR: &str = "tests/golden";

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Fixed time so the transaction id and date line are reproducible.
fn golden_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 20, 12, 0, 0).unwrap()
}

fn demo_document() -> ReceiptDocument {
    let at = golden_time();
    ReceiptDocument::from_sale(&StoreProfile::default(), &demo_sale(&at), at.naive_utc())
}

fn demo_text() -> String {
    let mut text = format_receipt(&demo_document(), 32).join("\n");
    text.push('\n');
    text
}

/// Write text to a golden file
fn write_golden(name: &str, ext: &str, data: &str) {
    let path = format!("{}/{}.{}", GOLDEN_DIR, name, ext);
    fs::write(&path, data).unwrap_or_else(|e| panic!("Failed to write {}: {}", path, e));
    println!("Wrote {} ({} bytes)", path, data.len());
}

/// Compare text against a golden file
fn check_golden(name: &str, ext: &str, data: &str) {
    let path = format!("{}/{}.{}", GOLDEN_DIR, name, ext);
    let golden = fs::read_to_string(&path).unwrap_or_else(|_| {
        panic!(
            "Golden file not found: {}. Run the generator to create it.",
            path
        )
    });
    assert_eq!(golden, data, "golden mismatch for {}", path);
}

// ============================================================================
// GOLDEN FILE GENERATOR
// ============================================================================

#[test]
#[ignore]
fn generate_golden_files() {
    write_golden("demo_receipt", "txt", &demo_text());
    println!("\nAll golden files written to {}/", GOLDEN_DIR);
}

// ============================================================================
// RECEIPT TESTS
// ============================================================================

#[test]
fn test_text_demo_receipt() {
    check_golden("demo_receipt", "txt", &demo_text());
}

#[test]
fn test_demo_receipt_fits_paper() {
    // Only the item detail lines may grow past the width, and the demo's don't
    for line in format_receipt(&demo_document(), 32) {
        assert!(line.chars().count() <= 32, "too wide: {:?}", line);
    }
}

#[test]
fn test_job_text_matches_preview() {
    let pipeline = PrintPipeline::default();
    let doc = demo_document();
    let job = pipeline.compile(&doc);

    // Writes ending in LF are the text lines; they appear in preview order
    let printed: Vec<String> = job
        .steps
        .iter()
        .filter_map(|step| match step {
            Step::Write(data) if data.last() == Some(&0x0A) => {
                Some(String::from_utf8_lossy(&data[..data.len() - 1]).into_owned())
            }
            _ => None,
        })
        .collect();
    assert_eq!(printed, pipeline.print_preview(&doc));
}

#[test]
fn test_job_framing() {
    let job = PrintPipeline::default().compile(&demo_document());
    assert_eq!(job.steps.first(), Some(&Step::Write(vec![0x1B, 0x40])));
    assert!(matches!(job.steps[1], Step::Settle(_)));
    assert_eq!(
        &job.steps[job.steps.len() - 2..],
        &[
            Step::Write(PrinterCommand::FeedLines(4).encode()),
            Step::Write(PrinterCommand::CutPaper.encode()),
        ]
    );
}
