use crate::sink::read_records;
use crate::utils::config::{ABANDONED_FIELD, EXCEPTION_FIELD, RECORD_SCHEMA_VERSION};
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Validate a JSON-lines record file
pub fn validate_record_file(file_path: PathBuf) -> Result<()> {
    println!("Validating records: {}", file_path.display());

    let records = read_records(&file_path)
        .with_context(|| format!("Invalid record file {}", file_path.display()))?;

    let abandoned = records
        .iter()
        .filter(|r| r.get(ABANDONED_FIELD).and_then(|v| v.as_bool()) == Some(true))
        .count();
    let exceptions = records.iter().filter(|r| r.contains(EXCEPTION_FIELD)).count();
    let outdated = records
        .iter()
        .filter(|r| r.version != RECORD_SCHEMA_VERSION)
        .count();

    println!("✓ Valid record file");
    println!("  Records: {}", records.len());
    println!("  With exceptions: {}", exceptions);
    println!("  Abandoned: {}", abandoned);
    if outdated > 0 {
        println!(
            "  Other schema versions: {} (current is {})",
            outdated, RECORD_SCHEMA_VERSION
        );
    }

    Ok(())
}

/// Display schema information
pub fn display_schema(show_details: bool) {
    println!("Reqtrail Record Schema");
    println!("Current Version: {}", RECORD_SCHEMA_VERSION);
    println!();

    if show_details {
        println!("Schema Structure:");
        println!("  version: string          - Schema version (e.g., '1.0.0')");
        println!("  context_id: number       - Execution context that produced the record");
        println!("  started_at: string       - ISO 8601 timestamp");
        println!("  finished_at: string?     - ISO 8601 timestamp");
        println!("  fields: object           - Fields in first-write order");
        println!("    controller: string     - Handling controller");
        println!("    action: string         - Handling action");
        println!("    format: string?        - Response format");
        println!("    parameters: object?    - Request parameters, sensitive values '[FILTERED]'");
        println!("    status: number?        - Response status");
        println!("    <span>_duration: number - Span length in milliseconds");
        println!("    halted_callback: string? - Hook that stopped the request");
        println!("    redirect_to: string?   - Redirect location");
        println!("    send_data: string?     - Filename of sent data");
        println!("    send_file: string?     - Path of sent file");
        println!("    cache: array?          - Cache operations");
        println!("      type: string         - e.g. 'Read fragment', 'Write page'");
        println!("      key_or_path: string  - Cache key or page path, verbatim");
        println!("    exception: object?     - kind: string, rescued: boolean");
        println!("    abandoned: boolean?    - Finalized by the stale sweep");
    } else {
        println!("Use --show for detailed schema information");
    }
}

/// Display version information
pub fn display_version() {
    println!("Reqtrail v{}", env!("CARGO_PKG_VERSION"));
    println!("Record Schema: v{}", RECORD_SCHEMA_VERSION);
    println!();
    println!("Aggregates request instrumentation events into one structured record per request.");
}
