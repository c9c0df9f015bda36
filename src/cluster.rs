//! Topic grouping of stored inputs: TF-IDF vectors partitioned with a
//! seeded k-means, so identical input always yields identical groups.

use crate::config::ClusteringConfig;
use crate::vectorizer::TfidfVectorizer;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Lloyd's k-means with greedy k-means++ seeding.
#[derive(Debug, Clone)]
pub struct KMeans {
    n_clusters: usize,
    max_iterations: usize,
    tolerance: f64,
    seed: u64,
}

/// Outcome of one k-means run.
#[derive(Debug, Clone)]
pub struct KMeansFit {
    pub labels: Vec<usize>,
    pub iterations: usize,
    pub converged: bool,
}

impl KMeans {
    pub fn new(n_clusters: usize, config: &ClusteringConfig) -> Self {
        KMeans {
            n_clusters,
            max_iterations: config.max_iterations,
            tolerance: config.tolerance,
            seed: config.seed,
        }
    }

    /// Partitions the rows of `data`. `n_clusters` must not exceed the row count.
    pub fn fit(&self, data: &Array2<f64>) -> KMeansFit {
        let n = data.nrows();
        let k = self.n_clusters.min(n);
        let mut rng = StdRng::seed_from_u64(self.seed);

        let mut centroids = init_centroids(data, k, &mut rng);
        let tol = self.tolerance * mean_variance(data);

        let mut labels = assign(data, &centroids);
        let mut converged = false;
        let mut iterations = 0;

        while iterations < self.max_iterations {
            iterations += 1;

            let mut next = update_centroids(data, &labels, k);
            relocate_empty(data, &labels, &centroids, &mut next);

            let shift: f64 = (&next - &centroids).mapv(|v| v * v).sum();
            centroids = next;

            let next_labels = assign(data, &centroids);
            let stable = next_labels == labels;
            labels = next_labels;

            if stable || shift <= tol {
                converged = true;
                break;
            }
        }

        if !converged {
            warn!(iterations, "k-means stopped before converging");
        }

        KMeansFit {
            labels,
            iterations,
            converged,
        }
    }
}

fn squared_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn mean_variance(data: &Array2<f64>) -> f64 {
    if data.ncols() == 0 {
        return 0.0;
    }
    data.var_axis(Axis(0), 0.0).mean().unwrap_or(0.0)
}

/// Picks `k` starting centroids, each subsequent one sampled proportionally
/// to squared distance and kept only if it lowers total inertia the most
/// among `2 + ln k` candidates.
fn init_centroids(data: &Array2<f64>, k: usize, rng: &mut StdRng) -> Array2<f64> {
    let n = data.nrows();
    let mut centroids = Array2::<f64>::zeros((k, data.ncols()));
    if k == 0 {
        return centroids;
    }
    let trials = 2 + (k as f64).ln().floor() as usize;

    let first = rng.gen_range(0..n);
    centroids.row_mut(0).assign(&data.row(first));
    let mut closest: Vec<f64> = data
        .rows()
        .into_iter()
        .map(|row| squared_distance(row, data.row(first)))
        .collect();
    let mut potential: f64 = closest.iter().sum();

    for c in 1..k {
        let mut best: Option<(usize, f64, Vec<f64>)> = None;

        for _ in 0..trials {
            let candidate = if potential > 0.0 {
                sample_weighted(&closest, rng.r#gen::<f64>() * potential)
            } else {
                rng.gen_range(0..n)
            };

            let distances: Vec<f64> = data
                .rows()
                .into_iter()
                .zip(&closest)
                .map(|(row, &current)| current.min(squared_distance(row, data.row(candidate))))
                .collect();
            let candidate_potential: f64 = distances.iter().sum();

            if best
                .as_ref()
                .is_none_or(|(_, pot, _)| candidate_potential < *pot)
            {
                best = Some((candidate, candidate_potential, distances));
            }
        }

        if let Some((index, pot, distances)) = best {
            centroids.row_mut(c).assign(&data.row(index));
            closest = distances;
            potential = pot;
        }
    }

    centroids
}

/// First index whose cumulative weight reaches `target`.
fn sample_weighted(weights: &[f64], target: f64) -> usize {
    let mut cumulative = 0.0;
    for (i, w) in weights.iter().enumerate() {
        cumulative += w;
        if cumulative >= target && *w > 0.0 {
            return i;
        }
    }
    weights.iter().rposition(|w| *w > 0.0).unwrap_or(0)
}

/// Nearest centroid per row; ties go to the lower cluster id.
fn assign(data: &Array2<f64>, centroids: &Array2<f64>) -> Vec<usize> {
    data.rows()
        .into_iter()
        .map(|row| {
            let mut best = (0, f64::INFINITY);
            for (c, centroid) in centroids.rows().into_iter().enumerate() {
                let d = squared_distance(row, centroid);
                if d < best.1 {
                    best = (c, d);
                }
            }
            best.0
        })
        .collect()
}

fn update_centroids(data: &Array2<f64>, labels: &[usize], k: usize) -> Array2<f64> {
    let mut sums = Array2::<f64>::zeros((k, data.ncols()));
    let mut counts = vec![0usize; k];
    for (row, &label) in data.rows().into_iter().zip(labels) {
        let mut target = sums.row_mut(label);
        target += &row;
        counts[label] += 1;
    }
    for (mut row, &count) in sums.rows_mut().into_iter().zip(&counts) {
        if count > 0 {
            row /= count as f64;
        }
    }
    sums
}

/// Moves each empty cluster onto the point farthest from its own centroid.
fn relocate_empty(
    data: &Array2<f64>,
    labels: &[usize],
    previous: &Array2<f64>,
    centroids: &mut Array2<f64>,
) {
    let mut counts = vec![0usize; centroids.nrows()];
    for &label in labels {
        counts[label] += 1;
    }
    let empty: Vec<usize> = (0..counts.len()).filter(|&c| counts[c] == 0).collect();
    if empty.is_empty() {
        return;
    }

    let mut far: Vec<(usize, f64)> = data
        .rows()
        .into_iter()
        .zip(labels)
        .enumerate()
        .map(|(i, (row, &label))| (i, squared_distance(row, previous.row(label))))
        .collect();
    far.sort_by(|a, b| b.1.total_cmp(&a.1));

    for (cluster, (point, _)) in empty.into_iter().zip(far) {
        let row: Array1<f64> = data.row(point).to_owned();
        centroids.row_mut(cluster).assign(&row);
    }
}

/// Groups `corpus` into `min(max_clusters, len)` topics keyed `0..k`,
/// preserving corpus order inside each group. Fewer than two documents
/// give an empty map.
pub fn cluster_by_topic<S: AsRef<str>>(
    corpus: &[S],
    config: &ClusteringConfig,
) -> BTreeMap<usize, Vec<String>> {
    if corpus.len() <= 1 {
        return BTreeMap::new();
    }

    let mut vectorizer = TfidfVectorizer::new();
    let matrix = vectorizer.fit_transform(corpus);

    let k = config.max_clusters.min(corpus.len());
    debug!(
        documents = corpus.len(),
        terms = vectorizer.vocabulary().len(),
        k,
        "clustering corpus"
    );

    let fit = KMeans::new(k, config).fit(&matrix);
    debug!(iterations = fit.iterations, converged = fit.converged, "k-means finished");

    let mut clusters: BTreeMap<usize, Vec<String>> = (0..k).map(|c| (c, Vec::new())).collect();
    for (doc, label) in corpus.iter().zip(fit.labels) {
        clusters
            .entry(label)
            .or_default()
            .push(doc.as_ref().to_string());
    }
    clusters
}
