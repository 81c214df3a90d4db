//! Multi-pass set partitioning for duplicate detection.
//!
//! Three partitioners run in sequence over the library, each restricted to
//! entries the earlier passes did not claim:
//!
//! 1. [`partition_by_hash`] - exact content-hash buckets, O(n)
//! 2. [`GreedyClusterer`] - pairwise fuzzy metadata similarity, worst-case
//!    O(n^2) within the pass
//! 3. [`partition_by_duration`] - (normalized title, rounded duration)
//!    buckets as a low-precision catch-all
//!
//! The fuzzy pass sits behind the [`Clusterer`] trait: its greedy,
//! order-dependent claim semantics are preserved for compatibility, and the
//! trait keeps callers insulated if a graph-based clusterer replaces it.

use std::collections::HashMap;

use crate::config::DedupConfig;
use crate::dedup::normalizer;
use crate::model::LibraryEntry;

/// A cluster of entries believed to be duplicates, with the similarity that
/// put each member there (1.0 for exact matches).
#[derive(Debug, Clone)]
pub struct Cluster {
    /// Indices into the entry slice handed to the partitioner.
    pub members: Vec<ClusterMember>,
}

/// One member of a [`Cluster`].
#[derive(Debug, Clone, Copy)]
pub struct ClusterMember {
    /// Index into the partitioner's input slice
    pub index: usize,
    /// Similarity that triggered inclusion
    pub similarity: f64,
}

impl Cluster {
    /// Entry ids of all members, resolved against the input slice.
    pub fn entry_ids(&self, entries: &[LibraryEntry]) -> Vec<i64> {
        self.members
            .iter()
            .map(|m| entries[m.index].id)
            .collect()
    }
}

/// Group entries by identical content hash.
///
/// Entries without a hash never match anything. Only buckets with at least
/// two members are returned.
pub fn partition_by_hash(entries: &[LibraryEntry]) -> Vec<Cluster> {
    let mut buckets: HashMap<&str, Vec<usize>> = HashMap::new();
    for (index, entry) in entries.iter().enumerate() {
        if let Some(hash) = entry.file_hash.as_deref() {
            buckets.entry(hash).or_default().push(index);
        }
    }

    let mut clusters: Vec<Cluster> = buckets
        .into_values()
        .filter(|members| members.len() > 1)
        .map(|members| Cluster {
            members: members
                .into_iter()
                .map(|index| ClusterMember {
                    index,
                    similarity: 1.0,
                })
                .collect(),
        })
        .collect();

    // HashMap iteration order is arbitrary; keep output deterministic
    clusters.sort_by_key(|c| c.members[0].index);
    clusters
}

/// Group entries by (normalized title, duration bucket).
///
/// Lower precision than fuzzy matching; intended as a final catch-all for
/// entries the earlier passes missed. Entries lacking a title or a duration
/// are excluded.
pub fn partition_by_duration(entries: &[LibraryEntry], config: &DedupConfig) -> Vec<Cluster> {
    let bucket_ms = config.duration_bucket_ms.max(1);
    let mut buckets: HashMap<(String, i64), Vec<usize>> = HashMap::new();

    for (index, entry) in entries.iter().enumerate() {
        let Some(duration) = entry.duration_ms else {
            continue;
        };
        let Some(title) = normalized_title(entry) else {
            continue;
        };
        let bucket = (duration as f64 / bucket_ms as f64).round() as i64 * bucket_ms;
        buckets.entry((title, bucket)).or_default().push(index);
    }

    let mut clusters: Vec<Cluster> = buckets
        .into_values()
        .filter(|members| members.len() > 1)
        .map(|members| Cluster {
            members: members
                .into_iter()
                .map(|index| ClusterMember {
                    index,
                    similarity: 1.0,
                })
                .collect(),
        })
        .collect();

    clusters.sort_by_key(|c| c.members[0].index);
    clusters
}

/// Strategy seam for the fuzzy metadata pass.
pub trait Clusterer {
    /// Partition `entries` into clusters of likely duplicates. Implementors
    /// report progress through `on_progress(index, label)` as they advance.
    fn cluster(
        &self,
        entries: &[LibraryEntry],
        config: &DedupConfig,
        on_progress: &mut dyn FnMut(usize, &str),
    ) -> Vec<Cluster>;
}

/// The production fuzzy clusterer.
///
/// Greedy and order-dependent: each entry in input order opens a cluster and
/// claims every later unclaimed entry whose combined similarity clears the
/// threshold and whose duration is within tolerance. Once claimed, an entry
/// cannot join another cluster in this pass.
#[derive(Debug, Default)]
pub struct GreedyClusterer;

impl Clusterer for GreedyClusterer {
    fn cluster(
        &self,
        entries: &[LibraryEntry],
        config: &DedupConfig,
        on_progress: &mut dyn FnMut(usize, &str),
    ) -> Vec<Cluster> {
        let mut clusters = Vec::new();
        let mut claimed = vec![false; entries.len()];

        for i in 0..entries.len() {
            if claimed[i] {
                continue;
            }
            on_progress(i, &entries[i].title);

            let mut members = vec![ClusterMember {
                index: i,
                similarity: 1.0,
            }];
            claimed[i] = true;

            for j in (i + 1)..entries.len() {
                if claimed[j] {
                    continue;
                }
                let similarity = metadata_similarity(&entries[i], &entries[j]);
                if similarity >= config.fuzzy_threshold
                    && durations_match(&entries[i], &entries[j], config)
                {
                    members.push(ClusterMember {
                        index: j,
                        similarity,
                    });
                    claimed[j] = true;
                }
            }

            if members.len() > 1 {
                clusters.push(Cluster { members });
            }
        }

        clusters
    }
}

/// Combined metadata similarity between two entries, in [0, 1].
///
/// A weighted average over up to three terms: title (0.5), artist (0.35),
/// album (0.15). The weighted sum is divided by the total weight of the
/// terms actually scored, so a skipped term neither helps nor penalizes:
/// - artist absent on both sides counts as a perfect artist match
///   (silence matches silence); absent on one side, the term is skipped
/// - the album term is skipped whenever either side has no album
pub fn metadata_similarity(a: &LibraryEntry, b: &LibraryEntry) -> f64 {
    let mut total = 0.0;
    let mut weight_sum = 0.0;

    const TITLE_WEIGHT: f64 = 0.5;
    const ARTIST_WEIGHT: f64 = 0.35;
    const ALBUM_WEIGHT: f64 = 0.15;

    let title_a = normalized_title(a);
    let title_b = normalized_title(b);
    if let (Some(ta), Some(tb)) = (&title_a, &title_b) {
        total += strsim::normalized_levenshtein(ta, tb) * TITLE_WEIGHT;
        weight_sum += TITLE_WEIGHT;
    }

    let artist_a = normalized_artist(a);
    let artist_b = normalized_artist(b);
    match (&artist_a, &artist_b) {
        (Some(aa), Some(ab)) => {
            total += strsim::normalized_levenshtein(aa, ab) * ARTIST_WEIGHT;
            weight_sum += ARTIST_WEIGHT;
        }
        (None, None) => {
            // Both missing artist - might be the same track
            total += ARTIST_WEIGHT;
            weight_sum += ARTIST_WEIGHT;
        }
        _ => {}
    }

    let album_a = normalized_album(a);
    let album_b = normalized_album(b);
    if let (Some(la), Some(lb)) = (&album_a, &album_b) {
        total += strsim::normalized_levenshtein(la, lb) * ALBUM_WEIGHT;
        weight_sum += ALBUM_WEIGHT;
    }

    if weight_sum == 0.0 {
        0.0
    } else {
        total / weight_sum
    }
}

/// Whether two entries' durations are close enough to be the same recording.
///
/// A missing duration on either side is a non-veto: we can't compare, so we
/// assume a match and let the similarity threshold decide.
pub fn durations_match(a: &LibraryEntry, b: &LibraryEntry, config: &DedupConfig) -> bool {
    match (a.duration_ms, b.duration_ms) {
        (Some(da), Some(db)) => (da - db).abs() <= config.duration_tolerance_ms,
        _ => true,
    }
}

fn normalized_title(entry: &LibraryEntry) -> Option<String> {
    entry
        .title_normalized
        .clone()
        .or_else(|| normalizer::normalize_title(Some(&entry.title)))
}

fn normalized_artist(entry: &LibraryEntry) -> Option<String> {
    entry
        .artist_normalized
        .clone()
        .or_else(|| normalizer::normalize_artist(entry.artist.as_deref()))
}

fn normalized_album(entry: &LibraryEntry) -> Option<String> {
    entry
        .album_normalized
        .clone()
        .or_else(|| normalizer::normalize_album(entry.album.as_deref()))
}
