use std::collections::HashMap;

use indexmap::IndexMap;

use crate::record::{first_call, parse_calls, Granularity, Receptor};
use crate::union_find::DisjointSet;

/// Specificity of the V/J identifiers used for preclone keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupMode {
    Allele,
    Gene,
}

impl GroupMode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "allele" => Some(GroupMode::Allele),
            "gene" => Some(GroupMode::Gene),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            GroupMode::Allele => "allele",
            GroupMode::Gene => "gene",
        }
    }

    fn granularity(&self) -> Granularity {
        match self {
            GroupMode::Allele => Granularity::Allele,
            GroupMode::Gene => Granularity::Gene,
        }
    }
}

/// Multi-value policy for ambiguous gene calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupAction {
    /// Key on the first listed identifier only.
    First,
    /// Single-linkage grouping over shared identifiers.
    Set,
}

impl GroupAction {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "first" => Some(GroupAction::First),
            "set" => Some(GroupAction::Set),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            GroupAction::First => "first",
            GroupAction::Set => "set",
        }
    }
}

#[derive(Debug, Clone)]
pub struct GroupConfig {
    pub v_field: String,
    pub j_field: String,
    pub seq_field: String,
    pub group_fields: Vec<String>,
    pub mode: GroupMode,
    pub action: GroupAction,
}

/// One preclone bucket: the records to cluster together plus the key
/// identity carried into the run log.
#[derive(Debug, Clone)]
pub struct PrecloneBucket {
    /// V identifiers covered by this bucket (unioned under `set`).
    pub v_group: Vec<String>,
    /// J identifiers covered by this bucket.
    pub j_group: Vec<String>,
    pub junction_length: usize,
    pub extras: Vec<String>,
    /// Indices into the input record slice.
    pub records: Vec<usize>,
}

/// Result of preclone indexing: clusterable buckets plus the records whose
/// key had a missing component (emitted directly as failed).
#[derive(Debug, Default)]
pub struct GroupIndex {
    pub buckets: Vec<PrecloneBucket>,
    pub unassigned: Vec<usize>,
}

struct RecordKey {
    v: Vec<String>,
    j: Vec<String>,
    junction_length: usize,
    extras: Vec<String>,
}

/// Group records into preclone buckets by V, J, junction length and any
/// configured extra fields. Extra fields and junction length always match
/// exactly; the `set` action additionally merges buckets whose multi-valued
/// V and J call sets overlap (single-linkage over shared identifiers).
pub fn group_records(records: &[Receptor], config: &GroupConfig) -> GroupIndex {
    let mut index = GroupIndex::default();

    // Extract keys once; records with any missing component are unassigned.
    let mut keys: Vec<Option<RecordKey>> = Vec::with_capacity(records.len());
    for (i, rec) in records.iter().enumerate() {
        match extract_key(rec, config) {
            Some(key) => keys.push(Some(key)),
            None => {
                index.unassigned.push(i);
                keys.push(None);
            }
        }
    }

    match config.action {
        GroupAction::First => group_first(&keys, &mut index),
        GroupAction::Set => group_set(&keys, &mut index),
    }
    index
}

fn extract_key(rec: &Receptor, config: &GroupConfig) -> Option<RecordKey> {
    let granularity = config.mode.granularity();
    let v_raw = rec.field(&config.v_field)?;
    let j_raw = rec.field(&config.j_field)?;
    let junction = rec.field(&config.seq_field)?;

    let (v, j) = match config.action {
        GroupAction::First => (
            vec![first_call(v_raw, granularity)?],
            vec![first_call(j_raw, granularity)?],
        ),
        GroupAction::Set => {
            let v = parse_calls(v_raw, granularity);
            let j = parse_calls(j_raw, granularity);
            if v.is_empty() || j.is_empty() {
                return None;
            }
            (v, j)
        }
    };

    let mut extras = Vec::with_capacity(config.group_fields.len());
    for field in &config.group_fields {
        extras.push(rec.field(field)?.to_string());
    }

    Some(RecordKey {
        v,
        j,
        junction_length: junction.chars().count(),
        extras,
    })
}

/// Exact tuple bucketing on the first listed V/J identifier.
fn group_first(keys: &[Option<RecordKey>], index: &mut GroupIndex) {
    let mut buckets: IndexMap<(String, String, usize, Vec<String>), Vec<usize>> = IndexMap::new();
    for (i, key) in keys.iter().enumerate() {
        let key = match key {
            Some(k) => k,
            None => continue,
        };
        buckets
            .entry((
                key.v[0].clone(),
                key.j[0].clone(),
                key.junction_length,
                key.extras.clone(),
            ))
            .or_default()
            .push(i);
    }
    for ((v, j, junction_length, extras), records) in buckets {
        index.buckets.push(PrecloneBucket {
            v_group: vec![v],
            j_group: vec![j],
            junction_length,
            extras,
            records,
        });
    }
}

/// Union grouping: within each exact (extras, junction length) stratum, two
/// records belong to the same bucket iff they are connected by a chain of
/// records whose V sets and J sets both overlap. Implemented as a disjoint
/// set over record indices, unioning through the first owner of each
/// (V, J) identifier pair; the final partition is independent of record
/// arrival order.
fn group_set(keys: &[Option<RecordKey>], index: &mut GroupIndex) {
    let mut strata: IndexMap<(usize, Vec<String>), Vec<usize>> = IndexMap::new();
    for (i, key) in keys.iter().enumerate() {
        if let Some(k) = key {
            strata
                .entry((k.junction_length, k.extras.clone()))
                .or_default()
                .push(i);
        }
    }

    for ((junction_length, extras), members) in strata {
        let mut sets = DisjointSet::new(members.len());
        let mut pair_owner: HashMap<(&str, &str), usize> = HashMap::new();
        for (local, &rec_idx) in members.iter().enumerate() {
            let key = keys[rec_idx].as_ref().unwrap();
            for v in &key.v {
                for j in &key.j {
                    match pair_owner.get(&(v.as_str(), j.as_str())) {
                        Some(&owner) => sets.union(local, owner),
                        None => {
                            pair_owner.insert((v.as_str(), j.as_str()), local);
                        }
                    }
                }
            }
        }

        for component in sets.into_sets() {
            let records: Vec<usize> = component.iter().map(|&l| members[l]).collect();
            let mut v_group: Vec<String> = Vec::new();
            let mut j_group: Vec<String> = Vec::new();
            for &rec_idx in &records {
                let key = keys[rec_idx].as_ref().unwrap();
                for v in &key.v {
                    if !v_group.contains(v) {
                        v_group.push(v.clone());
                    }
                }
                for j in &key.j {
                    if !j_group.contains(j) {
                        j_group.push(j.clone());
                    }
                }
            }
            v_group.sort();
            j_group.sort();
            index.buckets.push(PrecloneBucket {
                v_group,
                j_group,
                junction_length,
                extras: extras.clone(),
                records,
            });
        }
    }
}
