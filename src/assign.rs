use anyhow::Result;
use indexmap::IndexMap;
use rayon::prelude::*;

use crate::cluster::{form_clusters, Linkage};
use crate::distance::DistanceParams;
use crate::preclone::{GroupIndex, PrecloneBucket};
use crate::record::Receptor;

/// Parameters for distance clustering within a preclone bucket.
pub struct CloneConfig {
    pub seq_field: String,
    pub max_missing: usize,
    pub params: DistanceParams,
    pub linkage: Linkage,
    pub threshold: f64,
}

/// Per-bucket diagnostics carried into the run log.
#[derive(Debug, Clone)]
pub struct BucketLog {
    pub v_group: String,
    pub j_group: String,
    pub junction_length: usize,
    pub records: usize,
    pub passed: usize,
    pub failed: usize,
    pub unique: usize,
    pub clones: usize,
}

/// Clustering outcome for one bucket. Clone membership is bucket-local;
/// final clone ids are issued later by the sequential collector.
#[derive(Debug)]
pub struct BucketResult {
    /// Record indices per clone, in cluster id order.
    pub clones: Vec<Vec<usize>>,
    /// Records rejected by the missing-character filter.
    pub failed: Vec<usize>,
    pub log: BucketLog,
}

/// Totals for the whole run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub records: usize,
    pub pass_records: usize,
    pub fail_records: usize,
    pub clone_count: u64,
    pub bucket_logs: Vec<BucketLog>,
}

fn passes_missing_filter(seq: &str, max_missing: usize) -> bool {
    if seq.is_empty() {
        return false;
    }
    let missing = seq
        .chars()
        .filter(|c| !matches!(c.to_ascii_uppercase(), 'A' | 'C' | 'G' | 'T'))
        .count();
    missing <= max_missing
}

/// Partition one preclone bucket into clones: filter records on missing
/// characters, deduplicate by processed sequence, cluster the unique
/// sequences, then expand clusters back to records.
pub fn clone_bucket(
    records: &[Receptor],
    bucket: &PrecloneBucket,
    config: &CloneConfig,
) -> BucketResult {
    let mut log = BucketLog {
        v_group: bucket.v_group.join(","),
        j_group: bucket.j_group.join(","),
        junction_length: bucket.junction_length,
        records: bucket.records.len(),
        passed: 0,
        failed: 0,
        unique: 0,
        clones: 0,
    };

    // Filter on raw sequence content before any preprocessing
    let mut passed: Vec<usize> = Vec::new();
    let mut failed: Vec<usize> = Vec::new();
    for &idx in &bucket.records {
        let seq = records[idx].field(&config.seq_field).unwrap_or("");
        if passes_missing_filter(seq, config.max_missing) {
            passed.push(idx);
        } else {
            failed.push(idx);
        }
    }
    log.passed = passed.len();
    log.failed = failed.len();

    // Deduplicate by processed sequence; insertion order keeps the
    // clustering input deterministic for a given record order.
    let mut seq_map: IndexMap<String, Vec<usize>> = IndexMap::new();
    for &idx in &passed {
        let raw = records[idx].field(&config.seq_field).unwrap_or("");
        seq_map
            .entry(config.params.prepare(raw))
            .or_default()
            .push(idx);
    }
    log.unique = seq_map.len();

    let clones: Vec<Vec<usize>> = match seq_map.len() {
        0 => Vec::new(),
        1 => {
            // Single unique sequence: one clone, no distance computation
            vec![passed.clone()]
        }
        _ => {
            let sequences: Vec<String> = seq_map.keys().cloned().collect();
            let dists = config.params.pairwise(&sequences);
            let assignment = form_clusters(&dists, config.linkage, config.threshold);
            let n_clusters = assignment.iter().copied().max().unwrap_or(0);
            let mut clones = vec![Vec::new(); n_clusters];
            for (seq_idx, cluster_id) in assignment.iter().enumerate() {
                clones[cluster_id - 1].extend(seq_map[seq_idx].iter().copied());
            }
            clones
        }
    };
    log.clones = clones.len();

    BucketResult {
        clones,
        failed,
        log,
    }
}

/// Cluster every bucket (in parallel) and assign globally unique clone ids.
///
/// Buckets share no state, so clustering runs under rayon; only the final
/// labeling pass is sequential. It walks bucket results in bucket index
/// order with a single counter, which is what guarantees ids are unique
/// and reproducible across the run.
pub fn assign_clones(
    records: &mut [Receptor],
    index: &GroupIndex,
    config: &CloneConfig,
) -> Result<RunSummary> {
    let records_ref: &[Receptor] = records;
    let results: Vec<BucketResult> = index
        .buckets
        .par_iter()
        .map(|bucket| clone_bucket(records_ref, bucket, config))
        .collect();

    let mut summary = RunSummary {
        records: records.len(),
        ..Default::default()
    };

    let mut next_clone: u64 = 0;
    for result in results {
        for clone in &result.clones {
            next_clone += 1;
            for &idx in clone {
                records[idx].clone_id = Some(next_clone);
                summary.pass_records += 1;
            }
        }
        summary.fail_records += result.failed.len();
        summary.bucket_logs.push(result.log);
    }
    summary.clone_count = next_clone;
    summary.fail_records += index.unassigned.len();

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::{DistanceModel, DistanceParams, Normalization, Symmetry};
    use indexmap::IndexMap;

    fn receptor(id: &str, junction: &str) -> Receptor {
        let mut fields = IndexMap::new();
        fields.insert("sequence_id".to_string(), id.to_string());
        fields.insert("junction".to_string(), junction.to_string());
        Receptor::new(fields)
    }

    #[test]
    fn missing_filter_boundaries() {
        assert!(!passes_missing_filter("", 0));
        assert!(passes_missing_filter("ACGT", 0));
        assert!(!passes_missing_filter("ACGN", 0));
        assert!(passes_missing_filter("ACNN", 2));
        assert!(!passes_missing_filter("ANNN", 2));
        // Gaps count individually, not per run
        assert!(!passes_missing_filter("AC--G", 1));
    }

    #[test]
    fn single_unique_sequence_skips_clustering() {
        let records = vec![receptor("A", "TGTGCA"), receptor("B", "TGTGCA")];
        let bucket = PrecloneBucket {
            v_group: vec!["IGHV1-2".to_string()],
            j_group: vec!["IGHJ4".to_string()],
            junction_length: 6,
            extras: vec![],
            records: vec![0, 1],
        };
        let config = CloneConfig {
            seq_field: "junction".to_string(),
            max_missing: 0,
            params: DistanceParams::new(
                DistanceModel::Ham,
                Normalization::Len,
                Symmetry::Avg,
                None,
            )
            .unwrap(),
            linkage: Linkage::Single,
            threshold: 0.1,
        };
        let result = clone_bucket(&records, &bucket, &config);
        assert_eq!(result.clones, vec![vec![0, 1]]);
        assert_eq!(result.log.unique, 1);
        assert_eq!(result.log.clones, 1);
    }
}
