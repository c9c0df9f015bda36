//! Fuzzy lookup over stored chat inputs.
//!
//! Ranking uses a matching-blocks similarity ratio: the longest common
//! block is found, then the regions on either side are searched recursively,
//! and the score is `2 * matched / (len(a) + len(b))`. Inputs that clear the
//! cutoff are shortlisted, then every record whose input contains a
//! shortlisted string is returned.

use crate::config::SearchConfig;
use crate::store::ChatRecord;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use tracing::debug;

/// Sequences at least this long have their most popular characters
/// excluded from the block index.
const AUTOJUNK_MIN_LEN: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub user_input: String,
    pub response: Option<String>,
}

/// Similarity matcher with a fixed second sequence.
///
/// Building the index for `b` once lets one query be scored against many
/// candidates cheaply.
pub struct SequenceMatcher {
    b: Vec<char>,
    b2j: FxHashMap<char, Vec<usize>>,
    b_counts: FxHashMap<char, usize>,
}

impl SequenceMatcher {
    pub fn new(b: &str) -> Self {
        let b: Vec<char> = b.chars().collect();

        let mut b2j: FxHashMap<char, Vec<usize>> = FxHashMap::default();
        let mut b_counts: FxHashMap<char, usize> = FxHashMap::default();
        for (j, &c) in b.iter().enumerate() {
            b2j.entry(c).or_default().push(j);
            *b_counts.entry(c).or_insert(0) += 1;
        }

        let n = b.len();
        if n >= AUTOJUNK_MIN_LEN {
            let threshold = n / 100 + 1;
            b2j.retain(|_, positions| positions.len() <= threshold);
        }

        SequenceMatcher { b, b2j, b_counts }
    }

    /// Upper bound on `ratio` from the lengths alone.
    pub fn real_quick_ratio(&self, a: &[char]) -> f64 {
        ratio_of(a.len().min(self.b.len()), a.len() + self.b.len())
    }

    /// Upper bound on `ratio` from shared character counts.
    pub fn quick_ratio(&self, a: &[char]) -> f64 {
        let mut avail: FxHashMap<char, isize> = FxHashMap::default();
        let mut matches = 0;
        for c in a {
            let remaining = avail
                .entry(*c)
                .or_insert_with(|| self.b_counts.get(c).copied().unwrap_or(0) as isize);
            if *remaining > 0 {
                matches += 1;
            }
            *remaining -= 1;
        }
        ratio_of(matches, a.len() + self.b.len())
    }

    pub fn ratio(&self, a: &[char]) -> f64 {
        ratio_of(self.matched_len(a), a.len() + self.b.len())
    }

    /// Total size of all matching blocks between `a` and `b`.
    fn matched_len(&self, a: &[char]) -> usize {
        let mut total = 0;
        let mut pending = vec![(0, a.len(), 0, self.b.len())];

        while let Some((alo, ahi, blo, bhi)) = pending.pop() {
            let (i, j, k) = self.find_longest_match(a, alo, ahi, blo, bhi);
            if k == 0 {
                continue;
            }
            total += k;
            if alo < i && blo < j {
                pending.push((alo, i, blo, j));
            }
            if i + k < ahi && j + k < bhi {
                pending.push((i + k, ahi, j + k, bhi));
            }
        }

        total
    }

    fn find_longest_match(
        &self,
        a: &[char],
        alo: usize,
        ahi: usize,
        blo: usize,
        bhi: usize,
    ) -> (usize, usize, usize) {
        let (mut best_i, mut best_j, mut best_size) = (alo, blo, 0);
        let mut j2len: FxHashMap<usize, usize> = FxHashMap::default();

        for i in alo..ahi {
            let mut next: FxHashMap<usize, usize> = FxHashMap::default();
            if let Some(positions) = self.b2j.get(&a[i]) {
                for &j in positions {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let k = j
                        .checked_sub(1)
                        .and_then(|prev| j2len.get(&prev))
                        .copied()
                        .unwrap_or(0)
                        + 1;
                    next.insert(j, k);
                    if k > best_size {
                        best_i = i + 1 - k;
                        best_j = j + 1 - k;
                        best_size = k;
                    }
                }
            }
            j2len = next;
        }

        // Grow the block over characters dropped from the index as popular.
        while best_i > alo && best_j > blo && a[best_i - 1] == self.b[best_j - 1] {
            best_i -= 1;
            best_j -= 1;
            best_size += 1;
        }
        while best_i + best_size < ahi
            && best_j + best_size < bhi
            && a[best_i + best_size] == self.b[best_j + best_size]
        {
            best_size += 1;
        }

        (best_i, best_j, best_size)
    }
}

fn ratio_of(matches: usize, length: usize) -> f64 {
    if length == 0 {
        1.0
    } else {
        2.0 * matches as f64 / length as f64
    }
}

/// Best `limit` candidates scoring at least `cutoff` against `query`, as
/// `(candidate index, score)`. Equal scores keep candidate order.
pub fn close_matches(
    query: &str,
    candidates: &[&str],
    limit: usize,
    cutoff: f64,
) -> Vec<(usize, f64)> {
    let matcher = SequenceMatcher::new(query);

    let mut scored: Vec<(usize, f64)> = candidates
        .iter()
        .enumerate()
        .filter_map(|(idx, candidate)| {
            let chars: Vec<char> = candidate.chars().collect();
            if matcher.real_quick_ratio(&chars) < cutoff || matcher.quick_ratio(&chars) < cutoff {
                return None;
            }
            let score = matcher.ratio(&chars);
            (score >= cutoff).then_some((idx, score))
        })
        .collect();

    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(limit);
    scored
}

/// Shortlists distinct inputs similar to `query`, then expands each one to
/// every record whose input contains it.
pub fn search(query: &str, corpus: &[ChatRecord], config: &SearchConfig) -> Vec<SearchHit> {
    let mut seen = FxHashSet::default();
    let distinct: Vec<&str> = corpus
        .iter()
        .map(|record| record.user_input.as_str())
        .filter(|input| seen.insert(*input))
        .collect();

    let shortlist = close_matches(query, &distinct, config.limit, config.cutoff);
    debug!(
        candidates = distinct.len(),
        shortlisted = shortlist.len(),
        "search shortlist"
    );

    let mut hits = Vec::new();
    for (idx, _) in shortlist {
        let matched = distinct[idx];
        hits.extend(
            corpus
                .iter()
                .filter(|record| record.user_input.contains(matched))
                .map(|record| SearchHit {
                    user_input: record.user_input.clone(),
                    response: record.response.clone(),
                }),
        );
    }
    hits
}
