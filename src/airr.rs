use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::record::Receptor;

/// Tab-delimited schema flavor. AIRR uses lowercase column names and
/// `clone_id`; the legacy Change-O schema uses uppercase and `CLONE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbFormat {
    Airr,
    Changeo,
}

impl DbFormat {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "airr" => Some(DbFormat::Airr),
            "changeo" => Some(DbFormat::Changeo),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DbFormat::Airr => "airr",
            DbFormat::Changeo => "changeo",
        }
    }

    pub fn seq_field(&self) -> &'static str {
        match self {
            DbFormat::Airr => "junction",
            DbFormat::Changeo => "JUNCTION",
        }
    }

    pub fn v_field(&self) -> &'static str {
        match self {
            DbFormat::Airr => "v_call",
            DbFormat::Changeo => "V_CALL",
        }
    }

    pub fn j_field(&self) -> &'static str {
        match self {
            DbFormat::Airr => "j_call",
            DbFormat::Changeo => "J_CALL",
        }
    }

    pub fn id_field(&self) -> &'static str {
        match self {
            DbFormat::Airr => "sequence_id",
            DbFormat::Changeo => "SEQUENCE_ID",
        }
    }

    pub fn clone_field(&self) -> &'static str {
        match self {
            DbFormat::Airr => "clone_id",
            DbFormat::Changeo => "CLONE",
        }
    }
}

/// Header-driven reader for tab-delimited annotation databases.
pub struct DbReader<R: Read> {
    reader: BufReader<R>,
    pub columns: Vec<String>,
    line: u64,
}

impl DbReader<File> {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("failed to open database {}", path.display()))?;
        Self::new(file)
    }
}

impl<R: Read> DbReader<R> {
    pub fn new(reader: R) -> Result<Self> {
        let mut reader = BufReader::new(reader);
        let mut header = String::new();
        if reader.read_line(&mut header)? == 0 {
            bail!("database is empty, expected a tab-delimited header row");
        }
        let columns: Vec<String> = header
            .trim_end_matches(['\r', '\n'])
            .split('\t')
            .map(|s| s.to_string())
            .collect();
        Ok(DbReader {
            reader,
            columns,
            line: 1,
        })
    }

    /// Check that every required column is present in the header.
    pub fn check_fields(&self, required: &[&str]) -> Result<()> {
        let missing: Vec<&str> = required
            .iter()
            .filter(|f| !self.columns.iter().any(|c| c == *f))
            .copied()
            .collect();
        if !missing.is_empty() {
            bail!("database is missing required columns: {}", missing.join(", "));
        }
        Ok(())
    }

    pub fn read_record(&mut self) -> Result<Option<Receptor>> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            self.line += 1;
            if !line.trim_end_matches(['\r', '\n']).is_empty() {
                break;
            }
        }

        let values: Vec<&str> = line.trim_end_matches(['\r', '\n']).split('\t').collect();
        if values.len() != self.columns.len() {
            bail!(
                "line {}: expected {} fields, got {}",
                self.line,
                self.columns.len(),
                values.len()
            );
        }

        let mut fields = IndexMap::with_capacity(self.columns.len());
        for (col, val) in self.columns.iter().zip(values) {
            fields.insert(col.clone(), val.to_string());
        }
        Ok(Some(Receptor::new(fields)))
    }

    pub fn read_all(&mut self) -> Result<Vec<Receptor>> {
        let mut records = Vec::new();
        while let Some(rec) = self.read_record()? {
            records.push(rec);
        }
        Ok(records)
    }
}

/// Writer that preserves the input column layout and appends the clone
/// column. Opening is deferred by the caller so a fail file only appears
/// when there is something to put in it.
pub struct DbWriter<W: Write> {
    writer: BufWriter<W>,
    columns: Vec<String>,
    clone_field: String,
}

impl DbWriter<File> {
    pub fn create<P: AsRef<Path>>(
        path: P,
        columns: &[String],
        format: DbFormat,
    ) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("failed to create output {}", path.display()))?;
        Self::new(file, columns, format)
    }
}

impl<W: Write> DbWriter<W> {
    pub fn new(writer: W, columns: &[String], format: DbFormat) -> Result<Self> {
        let clone_field = format.clone_field().to_string();
        let mut columns: Vec<String> = columns.to_vec();
        if !columns.contains(&clone_field) {
            columns.push(clone_field.clone());
        }
        let mut writer = BufWriter::new(writer);
        writeln!(writer, "{}", columns.join("\t"))?;
        Ok(DbWriter {
            writer,
            columns,
            clone_field,
        })
    }

    pub fn write_record(&mut self, rec: &Receptor) -> Result<()> {
        let mut row = Vec::with_capacity(self.columns.len());
        for col in &self.columns {
            if *col == self.clone_field {
                let label = rec.clone_id.map(|c| c.to_string()).unwrap_or_default();
                // An input clone column is overwritten by the new label
                row.push(label);
            } else {
                row.push(rec.fields.get(col).cloned().unwrap_or_default());
            }
        }
        writeln!(self.writer, "{}", row.join("\t"))?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Derive the conventional output name for a pass/fail file:
/// `input.tsv` becomes `input_clone-pass.tsv`.
pub fn default_output_path(db_path: &Path, label: &str) -> std::path::PathBuf {
    let stem = db_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let ext = db_path.extension().and_then(|s| s.to_str()).unwrap_or("tsv");
    let name = format!("{stem}_clone-{label}.{ext}");
    match db_path.parent() {
        Some(dir) => dir.join(name),
        None => std::path::PathBuf::from(name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DB: &str = "sequence_id\tv_call\tj_call\tjunction\n\
                      A\tIGHV1-2*01\tIGHJ4*01\tTGTGCA\n\
                      B\tIGHV3-7*01\tIGHJ4*01\tTGTGCC\n";

    #[test]
    fn read_header_and_records() {
        let mut reader = DbReader::new(DB.as_bytes()).unwrap();
        assert_eq!(
            reader.columns,
            vec!["sequence_id", "v_call", "j_call", "junction"]
        );
        let records = reader.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id(), "A");
        assert_eq!(records[1].field("v_call"), Some("IGHV3-7*01"));
    }

    #[test]
    fn missing_required_column_fails() {
        let reader = DbReader::new("sequence_id\tv_call\n".as_bytes()).unwrap();
        assert!(reader.check_fields(&["junction"]).is_err());
        assert!(reader.check_fields(&["sequence_id", "v_call"]).is_ok());
    }

    #[test]
    fn ragged_row_is_an_error() {
        let mut reader =
            DbReader::new("sequence_id\tjunction\nA\n".as_bytes()).unwrap();
        assert!(reader.read_record().is_err());
    }

    #[test]
    fn writer_appends_clone_column() {
        let mut reader = DbReader::new(DB.as_bytes()).unwrap();
        let mut records = reader.read_all().unwrap();
        records[0].clone_id = Some(7);

        let mut out = Vec::new();
        {
            let mut writer = DbWriter::new(&mut out, &reader.columns, DbFormat::Airr).unwrap();
            writer.write_record(&records[0]).unwrap();
            writer.finish().unwrap();
        }
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "sequence_id\tv_call\tj_call\tjunction\tclone_id"
        );
        assert_eq!(lines.next().unwrap(), "A\tIGHV1-2*01\tIGHJ4*01\tTGTGCA\t7");
    }

    #[test]
    fn output_path_naming() {
        let p = default_output_path(Path::new("/data/reads.tsv"), "pass");
        assert_eq!(p, Path::new("/data/reads_clone-pass.tsv"));
    }
}
