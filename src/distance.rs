use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Substitution model used to score a mismatch between two junction sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceModel {
    /// Nucleotide Hamming distance.
    Ham,
    /// Amino acid Hamming distance (junctions are translated first).
    Aa,
    /// Human single nucleotide model (Yaari et al, 2013).
    HhS1f,
    /// Human 5-mer context model (Yaari et al, 2013).
    HhS5f,
    /// Mouse single nucleotide model (Cui et al, 2016).
    MkRs1nf,
    /// Mouse 5-mer context model (Cui et al, 2016).
    MkRs5nf,
    /// hs1f matrix as shipped with Change-O v0.3.3, kept for compatibility.
    Hs1fCompat,
    /// m1n matrix as shipped with Change-O v0.3.3, kept for compatibility.
    M1nCompat,
}

impl DistanceModel {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ham" => Some(DistanceModel::Ham),
            "aa" => Some(DistanceModel::Aa),
            "hh_s1f" => Some(DistanceModel::HhS1f),
            "hh_s5f" => Some(DistanceModel::HhS5f),
            "mk_rs1nf" => Some(DistanceModel::MkRs1nf),
            "mk_rs5nf" => Some(DistanceModel::MkRs5nf),
            "hs1f_compat" => Some(DistanceModel::Hs1fCompat),
            "m1n_compat" => Some(DistanceModel::M1nCompat),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DistanceModel::Ham => "ham",
            DistanceModel::Aa => "aa",
            DistanceModel::HhS1f => "hh_s1f",
            DistanceModel::HhS5f => "hh_s5f",
            DistanceModel::MkRs1nf => "mk_rs1nf",
            DistanceModel::MkRs5nf => "mk_rs5nf",
            DistanceModel::Hs1fCompat => "hs1f_compat",
            DistanceModel::M1nCompat => "m1n_compat",
        }
    }

    /// Length of the sequence context a substitution score is keyed on.
    pub fn nmer_len(&self) -> usize {
        match self {
            DistanceModel::HhS5f | DistanceModel::MkRs5nf => 5,
            _ => 1,
        }
    }

    pub fn is_amino_acid(&self) -> bool {
        matches!(self, DistanceModel::Aa)
    }

    /// 5-mer context tables are distribution data files, not constants.
    pub fn needs_table_file(&self) -> bool {
        self.nmer_len() == 5
    }
}

/// How a raw pairwise score is scaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalization {
    None,
    /// Divide by the aligned length.
    Len,
    /// Divide by the number of differing informative positions.
    Mut,
}

impl Normalization {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "none" => Some(Normalization::None),
            "len" => Some(Normalization::Len),
            "mut" => Some(Normalization::Mut),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Normalization::None => "none",
            Normalization::Len => "len",
            Normalization::Mut => "mut",
        }
    }
}

/// How the two directions of an asymmetric context score are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symmetry {
    Avg,
    Min,
}

impl Symmetry {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "avg" => Some(Symmetry::Avg),
            "min" => Some(Symmetry::Min),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Symmetry::Avg => "avg",
            Symmetry::Min => "min",
        }
    }

    fn combine(&self, a: f64, b: f64) -> f64 {
        match self {
            Symmetry::Avg => (a + b) / 2.0,
            Symmetry::Min => a.min(b),
        }
    }
}

// Single nucleotide distance matrices, row = from, column = to, base order ACGT.
// The 1-mer matrices are symmetric; transitions score lower than transversions.

// Human 1-mer distances aggregated from the HH_S5F targeting model.
const HH_S1F: [[f64; 4]; 4] = [
    [0.00, 1.21, 0.64, 1.16],
    [1.21, 0.00, 1.16, 0.64],
    [0.64, 1.16, 0.00, 1.21],
    [1.16, 0.64, 1.21, 0.00],
];

// Mouse kappa 1-mer distances aggregated from the MK_RS5NF targeting model.
const MK_RS1NF: [[f64; 4]; 4] = [
    [0.00, 1.31, 0.63, 1.21],
    [1.31, 0.00, 1.21, 0.63],
    [0.63, 1.21, 0.00, 1.31],
    [1.21, 0.63, 1.31, 0.00],
];

// hs1f matrix from Change-O v0.3.3 / SHazaM v0.1.4.
const HS1F_COMPAT: [[f64; 4]; 4] = [
    [0.00, 2.08, 1.00, 1.75],
    [2.08, 0.00, 1.75, 1.00],
    [1.00, 1.75, 0.00, 2.08],
    [1.75, 1.00, 2.08, 0.00],
];

// m1n matrix (Smith et al, 1996) from Change-O v0.3.3.
const M1N_COMPAT: [[f64; 4]; 4] = [
    [0.00, 2.86, 1.00, 2.14],
    [2.86, 0.00, 2.14, 1.00],
    [1.00, 2.14, 0.00, 2.86],
    [2.14, 1.00, 2.86, 0.00],
];

enum ScoreSource {
    /// Every informative mismatch scores 1 (ham, aa).
    Uniform,
    /// 1-mer lookup, indexed by from/to base.
    Single([[f64; 4]; 4]),
    /// 5-mer context lookup: center base context -> score per target base.
    Context(HashMap<String, [f64; 4]>),
}

/// A fully resolved distance configuration: model, score table, normalization
/// and symmetrization. Construction validates everything up front so workers
/// never hit a configuration error mid-run.
pub struct DistanceParams {
    pub model: DistanceModel,
    pub norm: Normalization,
    pub sym: Symmetry,
    source: ScoreSource,
}

impl DistanceParams {
    pub fn new(
        model: DistanceModel,
        norm: Normalization,
        sym: Symmetry,
        model_path: Option<&Path>,
    ) -> Result<Self> {
        let source = match model {
            DistanceModel::Ham | DistanceModel::Aa => ScoreSource::Uniform,
            DistanceModel::HhS1f => ScoreSource::Single(HH_S1F),
            DistanceModel::MkRs1nf => ScoreSource::Single(MK_RS1NF),
            DistanceModel::Hs1fCompat => ScoreSource::Single(HS1F_COMPAT),
            DistanceModel::M1nCompat => ScoreSource::Single(M1N_COMPAT),
            DistanceModel::HhS5f | DistanceModel::MkRs5nf => {
                let path = match model_path {
                    Some(p) => p,
                    None => bail!(
                        "model {} requires a 5-mer table file (--model-path)",
                        model.name()
                    ),
                };
                ScoreSource::Context(load_context_table(path)?)
            }
        };
        Ok(DistanceParams {
            model,
            norm,
            sym,
            source,
        })
    }

    /// Normalize a raw junction for distance computation: gap characters
    /// become N, and amino acid models pad to a codon multiple and translate.
    pub fn prepare(&self, raw: &str) -> String {
        let mut seq: String = raw
            .chars()
            .map(|c| match c.to_ascii_uppercase() {
                '.' | '-' => 'N',
                c => c,
            })
            .collect();
        if self.model.is_amino_acid() {
            let rem = seq.len() % 3;
            if rem > 0 {
                for _ in 0..(3 - rem) {
                    seq.push('N');
                }
            }
            seq = translate(&seq);
        }
        seq
    }

    /// Pairwise distance matrix over a set of prepared sequences.
    /// Symmetric with a zero diagonal; empty input yields an empty matrix.
    pub fn pairwise(&self, seqs: &[String]) -> Vec<Vec<f64>> {
        let n = seqs.len();
        let mut dists = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in (i + 1)..n {
                let d = self.pair_distance(&seqs[i], &seqs[j]);
                dists[i][j] = d;
                dists[j][i] = d;
            }
        }
        dists
    }

    /// Distance between two prepared sequences of (nominally) equal length.
    pub fn pair_distance(&self, a: &str, b: &str) -> f64 {
        let a: Vec<char> = a.chars().collect();
        let b: Vec<char> = b.chars().collect();
        let aligned = a.len().min(b.len());

        let mut score = 0.0;
        let mut muts = 0usize;
        match &self.source {
            ScoreSource::Uniform => {
                let aa = self.model.is_amino_acid();
                for i in 0..aligned {
                    if a[i] == b[i] {
                        continue;
                    }
                    let informative = if aa {
                        is_informative_aa(a[i]) && is_informative_aa(b[i])
                    } else {
                        nt_index(a[i]).is_some() && nt_index(b[i]).is_some()
                    };
                    if informative {
                        score += 1.0;
                        muts += 1;
                    }
                }
            }
            ScoreSource::Single(mat) => {
                for i in 0..aligned {
                    if a[i] == b[i] {
                        continue;
                    }
                    if let (Some(ia), Some(ib)) = (nt_index(a[i]), nt_index(b[i])) {
                        score += self.sym.combine(mat[ia][ib], mat[ib][ia]);
                        muts += 1;
                    }
                }
            }
            ScoreSource::Context(table) => {
                // Pad so every position has a full 5-mer context
                let pa = pad_context(&a);
                let pb = pad_context(&b);
                for i in 0..aligned {
                    if a[i] == b[i] {
                        continue;
                    }
                    if let (Some(ia), Some(ib)) = (nt_index(a[i]), nt_index(b[i])) {
                        let ctx_a: String = pa[i..i + 5].iter().collect();
                        let ctx_b: String = pb[i..i + 5].iter().collect();
                        // Unlisted contexts (N in the window) score zero
                        let d_ab = table.get(&ctx_a).map_or(0.0, |row| row[ib]);
                        let d_ba = table.get(&ctx_b).map_or(0.0, |row| row[ia]);
                        score += self.sym.combine(d_ab, d_ba);
                        muts += 1;
                    }
                }
            }
        }

        match self.norm {
            Normalization::None => score,
            Normalization::Len => {
                if aligned == 0 {
                    0.0
                } else {
                    score / aligned as f64
                }
            }
            Normalization::Mut => {
                if muts == 0 {
                    0.0
                } else {
                    score / muts as f64
                }
            }
        }
    }
}

fn pad_context(seq: &[char]) -> Vec<char> {
    let mut padded = Vec::with_capacity(seq.len() + 4);
    padded.extend(['N', 'N']);
    padded.extend_from_slice(seq);
    padded.extend(['N', 'N']);
    padded
}

fn nt_index(c: char) -> Option<usize> {
    match c {
        'A' => Some(0),
        'C' => Some(1),
        'G' => Some(2),
        'T' => Some(3),
        _ => None,
    }
}

fn is_informative_aa(c: char) -> bool {
    c.is_ascii_uppercase() && c != 'X'
}

// Standard genetic code indexed by ACGT digits, stops as '*'.
const CODON_TABLE: &[u8; 64] =
    b"KNKNTTTTRSRSIIMIQHQHPPPPRRRRLLLLEDEDAAAAGGGGVVVV*Y*YSSSS*CWCLFLF";

/// Best-effort translation: codons containing a non-ACGT base become X.
/// Stop codons translate to `*`; neither is treated as an error here.
pub fn translate(nt: &str) -> String {
    let chars: Vec<char> = nt.chars().collect();
    let mut out = String::with_capacity(chars.len() / 3);
    for codon in chars.chunks(3) {
        if codon.len() < 3 {
            break;
        }
        let idx = match (
            nt_index(codon[0]),
            nt_index(codon[1]),
            nt_index(codon[2]),
        ) {
            (Some(a), Some(b), Some(c)) => Some(a * 16 + b * 4 + c),
            _ => None,
        };
        out.push(match idx {
            Some(i) => CODON_TABLE[i] as char,
            None => 'X',
        });
    }
    out
}

/// Load a 5-mer context table from a tab-delimited file with columns
/// `nmer  A  C  G  T`. A header row is detected and skipped.
fn load_context_table(path: &Path) -> Result<HashMap<String, [f64; 4]>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open model table {}", path.display()))?;
    let reader = BufReader::new(file);
    let mut table = HashMap::new();

    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 5 {
            bail!(
                "{}:{}: expected 5 tab-delimited columns, got {}",
                path.display(),
                lineno + 1,
                fields.len()
            );
        }
        let nmer = fields[0].to_ascii_uppercase();
        if lineno == 0 && fields[1].parse::<f64>().is_err() {
            // Header row
            continue;
        }
        if nmer.len() != 5 {
            bail!("{}:{}: '{}' is not a 5-mer", path.display(), lineno + 1, nmer);
        }
        let mut row = [0.0; 4];
        for (k, v) in fields[1..5].iter().enumerate() {
            row[k] = v.parse::<f64>().with_context(|| {
                format!("{}:{}: invalid score '{}'", path.display(), lineno + 1, v)
            })?;
        }
        table.insert(nmer, row);
    }

    if table.is_empty() {
        bail!("model table {} contains no entries", path.display());
    }
    Ok(table)
}
