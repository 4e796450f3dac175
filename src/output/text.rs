//! Plain text rendering for terminals.

use std::io::{self, Write};

use bytesize::ByteSize;

use crate::duplicates::{DuplicateGroup, ScanSummary};

/// Human-readable report of a run and/or a list of duplicate groups.
pub struct TextOutput<'a> {
    groups: &'a [DuplicateGroup],
    summary: Option<&'a ScanSummary>,
}

impl<'a> TextOutput<'a> {
    /// Text output for a finished run, groups included.
    #[must_use]
    pub fn from_run(summary: &'a ScanSummary) -> Self {
        Self {
            groups: &summary.groups,
            summary: Some(summary),
        }
    }

    /// Text output for stored groups only.
    #[must_use]
    pub fn from_groups(groups: &'a [DuplicateGroup]) -> Self {
        Self {
            groups,
            summary: None,
        }
    }

    /// Write the report.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        for (idx, group) in self.groups.iter().enumerate() {
            writeln!(
                writer,
                "Group {} ({} files, {} each, hash {})",
                idx + 1,
                group.len(),
                ByteSize::b(group.size),
                group.hash_hex()
            )?;
            for path in &group.paths {
                writeln!(writer, "  {}", path.display())?;
            }
            writeln!(writer)?;
        }

        let reclaimable: u64 = self.groups.iter().map(DuplicateGroup::wasted_space).sum();
        writeln!(
            writer,
            "{} duplicate groups, {} reclaimable",
            self.groups.len(),
            ByteSize::b(reclaimable)
        )?;

        if let Some(summary) = self.summary {
            write_summary(writer, summary)?;
        }
        Ok(())
    }

    /// Render to a string.
    #[must_use]
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        // Writing to a Vec cannot fail.
        let _ = self.write_to(&mut buffer);
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

fn write_summary<W: Write>(writer: &mut W, summary: &ScanSummary) -> io::Result<()> {
    let counts = &summary.classification;
    writeln!(
        writer,
        "Files: {} ({}), {} reused, {} rehashed, {} new",
        summary.total_files,
        summary.total_size_display(),
        counts.reused,
        counts.rehashed,
        counts.new
    )?;
    writeln!(
        writer,
        "Funnel: {} fingerprinted, {} candidates, {} hashed ({}) in {} commits",
        summary.funnel.fingerprinted,
        summary.funnel.candidates,
        summary.hashed_files,
        ByteSize::b(summary.bytes_hashed),
        summary.commits.len()
    )?;

    let failures = summary.hash_failures.len() + summary.discovery_failures.len();
    if failures > 0 {
        writeln!(writer, "Failures: {failures}")?;
        for failure in &summary.hash_failures {
            writeln!(writer, "  {failure}")?;
        }
        for failure in &summary.discovery_failures {
            writeln!(writer, "  {failure}")?;
        }
    }

    if summary.interrupted {
        writeln!(
            writer,
            "Interrupted after {:.2?}; committed results are kept, run `dupfinder resume` to finish",
            summary.scan_duration
        )?;
    } else {
        writeln!(writer, "Completed in {:.2?}", summary.scan_duration)?;
    }
    Ok(())
}
