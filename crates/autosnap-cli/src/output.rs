//! Run-report rendering: human-readable text or stable JSON.

use autosnap_core::RunReport;
use std::io::{self, Write};

/// The two output modes the CLI supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

/// Render the report for the selected mode.
///
/// # Errors
///
/// Propagates write failures (and JSON serialization failures, which for
/// this report type only arise from the writer).
pub fn render_report(report: &RunReport, mode: OutputMode, w: &mut dyn Write) -> io::Result<()> {
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut *w, report).map_err(io::Error::other)?;
            writeln!(w)
        }
        OutputMode::Human => render_human(report, w),
    }
}

fn render_human(report: &RunReport, w: &mut dyn Write) -> io::Result<()> {
    for skip in &report.skipped {
        writeln!(w, "skipped {} ({})", skip.dataset, skip.reason)?;
    }

    for pair in &report.pairs {
        let heading = format!("{}:{}", pair.dataset, pair.label);
        if let Some(name) = &pair.created {
            writeln!(w, "{heading} created {name}")?;
        }
        if let Some(name) = &pair.would_create {
            writeln!(w, "{heading} would create {name}")?;
        }
        for name in &pair.destroyed {
            writeln!(w, "{heading} destroyed {name}")?;
        }
        for name in &pair.would_destroy {
            writeln!(w, "{heading} would destroy {name}")?;
        }
        for err in &pair.decode_errors {
            writeln!(w, "{heading} unparseable: {err}")?;
        }
        for err in &pair.errors {
            writeln!(w, "{heading} error: {err}")?;
        }
    }

    let errors: usize = report
        .pairs
        .iter()
        .map(|p| p.errors.len() + p.decode_errors.len())
        .sum();
    let status = if report.stopped_early {
        "stopped early"
    } else if errors == 0 {
        "completed cleanly"
    } else {
        "completed with errors"
    };
    writeln!(
        w,
        "{} pairs, {} skipped, {} errors: {status}",
        report.pairs.len(),
        report.skipped.len(),
        errors
    )
}
