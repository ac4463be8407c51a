use anyhow::{Context, Result};
use chrono::Local;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Plain-text run report: blocks of aligned `KEY> value` lines, one block
/// per stage or bucket. Matches the log layout repertoire pipelines expect,
/// so downstream log parsers keep working.
pub struct RunReport {
    out: Option<BufWriter<File>>,
}

impl RunReport {
    /// No-op report when no log path was requested.
    pub fn disabled() -> Self {
        RunReport { out: None }
    }

    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("failed to create log file {}", path.display()))?;
        Ok(RunReport {
            out: Some(BufWriter::new(file)),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.out.is_some()
    }

    /// Write one block of key/value pairs, keys right-aligned to the
    /// longest, followed by a blank line.
    pub fn block(&mut self, entries: &[(&str, String)]) -> Result<()> {
        let out = match self.out.as_mut() {
            Some(o) => o,
            None => return Ok(()),
        };
        let width = entries.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
        for (key, value) in entries {
            writeln!(out, "{key:>width$}> {value}")?;
        }
        writeln!(out)?;
        Ok(())
    }

    pub fn start_block(&mut self, command: &str, params: &[(&str, String)]) -> Result<()> {
        let mut entries: Vec<(&str, String)> = vec![
            ("START", command.to_string()),
            ("TIME", Local::now().format("%Y-%m-%d %H:%M:%S").to_string()),
        ];
        entries.extend(params.iter().map(|(k, v)| (*k, v.clone())));
        self.block(&entries)
    }

    pub fn end_block(&mut self, command: &str, totals: &[(&str, String)]) -> Result<()> {
        let mut entries: Vec<(&str, String)> = totals.to_vec();
        entries.push(("END", command.to_string()));
        self.block(&entries)
    }

    pub fn finish(mut self) -> Result<()> {
        if let Some(mut out) = self.out.take() {
            out.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_report_accepts_blocks() {
        let mut report = RunReport::disabled();
        assert!(!report.is_enabled());
        report
            .block(&[("CLONES", "3".to_string())])
            .expect("disabled report should swallow writes");
    }

    #[test]
    fn block_alignment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        let mut report = RunReport::create(&path).unwrap();
        report
            .block(&[("ID", "x".to_string()), ("CLONES", "2".to_string())])
            .unwrap();
        report.finish().unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "    ID> x\nCLONES> 2\n\n");
    }
}
