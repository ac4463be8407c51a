use ordered_float::OrderedFloat;

/// Inter-cluster distance rule for agglomerative merging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linkage {
    Single,
    Average,
    Complete,
}

impl Linkage {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "single" => Some(Linkage::Single),
            "average" => Some(Linkage::Average),
            "complete" => Some(Linkage::Complete),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Linkage::Single => "single",
            Linkage::Average => "average",
            Linkage::Complete => "complete",
        }
    }
}

/// Flat partition of a pairwise distance matrix by agglomerative clustering.
///
/// Merges the closest pair of clusters until every remaining inter-cluster
/// distance exceeds `threshold`, then reports 1-based cluster ids per input
/// index. Stopping early is equivalent to cutting the dendrogram at the
/// threshold because single/average/complete linkage merge distances are
/// monotone non-decreasing.
///
/// Ties are broken by smallest cluster index, and ids are numbered by each
/// cluster's smallest member, so the partition is reproducible for a given
/// input order. The caller guarantees a square symmetric matrix.
pub fn form_clusters(dists: &[Vec<f64>], linkage: Linkage, threshold: f64) -> Vec<usize> {
    let n = dists.len();
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![1];
    }

    // Working inter-cluster distances, updated in place on merge
    // (Lance-Williams for the three supported linkages).
    let mut d: Vec<Vec<f64>> = dists.to_vec();
    let mut alive = vec![true; n];
    let mut size = vec![1usize; n];
    let mut members: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();

    loop {
        // Closest alive pair; the (dist, i, j) tuple order makes the
        // earliest pair win among equal distances.
        let mut best: Option<(OrderedFloat<f64>, usize, usize)> = None;
        for i in 0..n {
            if !alive[i] {
                continue;
            }
            for j in (i + 1)..n {
                if !alive[j] {
                    continue;
                }
                let cand = (OrderedFloat(d[i][j]), i, j);
                if best.map_or(true, |b| cand < b) {
                    best = Some(cand);
                }
            }
        }

        let (dist, i, j) = match best {
            Some(b) => b,
            None => break,
        };
        if dist.into_inner() > threshold {
            break;
        }

        // Merge j into i
        for k in 0..n {
            if !alive[k] || k == i || k == j {
                continue;
            }
            d[i][k] = match linkage {
                Linkage::Single => d[i][k].min(d[j][k]),
                Linkage::Complete => d[i][k].max(d[j][k]),
                Linkage::Average => {
                    (d[i][k] * size[i] as f64 + d[j][k] * size[j] as f64)
                        / (size[i] + size[j]) as f64
                }
            };
            d[k][i] = d[i][k];
        }
        size[i] += size[j];
        let moved = std::mem::take(&mut members[j]);
        members[i].extend(moved);
        alive[j] = false;
    }

    // Number surviving clusters by smallest member index
    let mut clusters: Vec<Vec<usize>> = (0..n)
        .filter(|&i| alive[i])
        .map(|i| {
            let mut m = members[i].clone();
            m.sort_unstable();
            m
        })
        .collect();
    clusters.sort_by_key(|c| c[0]);

    let mut assignment = vec![0usize; n];
    for (id, cluster) in clusters.iter().enumerate() {
        for &idx in cluster {
            assignment[idx] = id + 1;
        }
    }
    assignment
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(vals: &[&[f64]]) -> Vec<Vec<f64>> {
        vals.iter().map(|r| r.to_vec()).collect()
    }

    #[test]
    fn empty_matrix_empty_partition() {
        assert!(form_clusters(&[], Linkage::Single, 0.5).is_empty());
    }

    #[test]
    fn zero_threshold_all_zero_matrix_is_one_cluster() {
        let d = vec![vec![0.0; 3]; 3];
        assert_eq!(form_clusters(&d, Linkage::Single, 0.0), vec![1, 1, 1]);
    }

    #[test]
    fn zero_threshold_positive_matrix_is_singletons() {
        let d = square(&[
            &[0.0, 0.2, 0.3],
            &[0.2, 0.0, 0.1],
            &[0.3, 0.1, 0.0],
        ]);
        assert_eq!(form_clusters(&d, Linkage::Single, 0.0), vec![1, 2, 3]);
    }

    #[test]
    fn single_linkage_chains() {
        // 0-1 close, 1-2 close, 0-2 far: single linkage chains all three
        let d = square(&[
            &[0.0, 0.1, 0.9],
            &[0.1, 0.0, 0.1],
            &[0.9, 0.1, 0.0],
        ]);
        assert_eq!(form_clusters(&d, Linkage::Single, 0.2), vec![1, 1, 1]);
    }

    #[test]
    fn complete_linkage_breaks_chains() {
        let d = square(&[
            &[0.0, 0.1, 0.9],
            &[0.1, 0.0, 0.1],
            &[0.9, 0.1, 0.0],
        ]);
        // After merging {0,1}, complete distance to 2 is 0.9
        assert_eq!(form_clusters(&d, Linkage::Complete, 0.2), vec![1, 1, 2]);
    }

    #[test]
    fn average_linkage_uses_mean() {
        let d = square(&[
            &[0.0, 0.1, 0.5],
            &[0.1, 0.0, 0.1],
            &[0.5, 0.1, 0.0],
        ]);
        // Mean distance from {0,1} to 2 is 0.3
        assert_eq!(form_clusters(&d, Linkage::Average, 0.3), vec![1, 1, 1]);
        assert_eq!(form_clusters(&d, Linkage::Average, 0.25), vec![1, 1, 2]);
    }

    #[test]
    fn ids_follow_first_appearance() {
        let d = square(&[
            &[0.0, 0.9, 0.1],
            &[0.9, 0.0, 0.9],
            &[0.1, 0.9, 0.0],
        ]);
        // {0,2} cluster first in index order, 1 stays alone
        assert_eq!(form_clusters(&d, Linkage::Single, 0.2), vec![1, 2, 1]);
    }
}
