use indexmap::IndexMap;

/// A single annotated receptor sequence read from the database.
///
/// All input columns are kept verbatim in `fields` (insertion order preserved
/// so output rows match the input layout). The clone label is the only thing
/// the clustering core ever mutates.
#[derive(Debug, Clone)]
pub struct Receptor {
    pub fields: IndexMap<String, String>,
    pub clone_id: Option<u64>,
}

impl Receptor {
    pub fn new(fields: IndexMap<String, String>) -> Self {
        Receptor {
            fields,
            clone_id: None,
        }
    }

    /// Look up a column value, treating an empty string as missing.
    pub fn field(&self, name: &str) -> Option<&str> {
        match self.fields.get(name) {
            Some(v) if !v.is_empty() => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn id(&self) -> &str {
        self.field("sequence_id")
            .or_else(|| self.field("SEQUENCE_ID"))
            .unwrap_or("")
    }
}

/// Specificity of a gene call identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    /// Full identifier including the allele suffix, e.g. `IGHV1-2*01`.
    Allele,
    /// Identifier with the `*NN` allele suffix stripped, e.g. `IGHV1-2`.
    Gene,
}

/// Extract segment identifiers from a raw call string.
///
/// Call fields may hold several comma-separated assignments, and each
/// assignment may carry extra tokens (IMGT emits e.g. `Homsap IGHV1-2*01 F`).
/// The receptor segment token is the one starting with an IG/TR locus prefix;
/// a bare single-token value is accepted as-is so non-IMGT references still
/// group. Duplicates are dropped, first-listed order is preserved.
pub fn parse_calls(raw: &str, granularity: Granularity) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let token = part
            .split_whitespace()
            .find(|t| is_segment_token(t))
            .or_else(|| {
                // Fall back to a bare identifier with no decoration
                let mut it = part.split_whitespace();
                match (it.next(), it.next()) {
                    (Some(t), None) => Some(t),
                    _ => None,
                }
            });
        if let Some(t) = token {
            let id = match granularity {
                Granularity::Allele => t.to_string(),
                Granularity::Gene => strip_allele(t).to_string(),
            };
            if !out.contains(&id) {
                out.push(id);
            }
        }
    }
    out
}

/// First identifier listed in a call field, if any.
pub fn first_call(raw: &str, granularity: Granularity) -> Option<String> {
    parse_calls(raw, granularity).into_iter().next()
}

fn is_segment_token(t: &str) -> bool {
    (t.starts_with("IG") || t.starts_with("TR")) && t.len() >= 4
}

fn strip_allele(t: &str) -> &str {
    match t.find('*') {
        Some(pos) => &t[..pos],
        None => t,
    }
}
