//! Quality scoring for duplicate candidates.
//!
//! Computes a 0-100 fitness score per entry from its encoding parameters,
//! metadata completeness, artwork presence, and file size. The score ranks
//! copies within a duplicate group and picks the recommended keeper.
//!
//! Scoring is a pure function of the entry's current field values: calling
//! it twice on unchanged data returns the same value. Absent inputs simply
//! contribute nothing - the remaining weights are not re-normalized, so an
//! entry missing a signal scores strictly lower than one that has it.

use crate::config::DedupConfig;
use crate::dedup::normalizer;
use crate::model::LibraryEntry;

/// Weights for each scoring term. They sum to 1.0; the result is scaled
/// to 0-100.
const WEIGHT_BITRATE: f64 = 0.25;
const WEIGHT_SAMPLE_RATE: f64 = 0.15;
const WEIGHT_FORMAT: f64 = 0.20;
const WEIGHT_COMPLETENESS: f64 = 0.20;
const WEIGHT_ARTWORK: f64 = 0.10;
const WEIGHT_FILE_SIZE: f64 = 0.10;

/// Container format quality ranks (0-100). Lossless at the top, lossy
/// below, unknown formats get the benefit of the doubt at 50.
const FORMAT_RANKS: &[(&str, f64)] = &[
    ("FLAC", 100.0),
    ("WAV", 95.0),
    ("ALAC", 90.0),
    ("M4A", 80.0),
    ("AAC", 75.0),
    ("OGG", 70.0),
    ("MP3", 60.0),
    ("WMA", 50.0),
];

const UNKNOWN_FORMAT_RANK: f64 = 50.0;

/// Quality rank for a container format name (case-insensitive).
fn format_rank(format: Option<&str>) -> f64 {
    let Some(format) = format else {
        return UNKNOWN_FORMAT_RANK;
    };
    let upper = format.to_uppercase();
    FORMAT_RANKS
        .iter()
        .find(|(name, _)| *name == upper)
        .map(|(_, rank)| *rank)
        .unwrap_or(UNKNOWN_FORMAT_RANK)
}

/// Compute the overall quality score for an entry, in [0, 100].
///
/// Rounded to two decimal places so persisted member scores compare
/// exactly across recomputations.
pub fn quality_score(entry: &LibraryEntry, config: &DedupConfig) -> f64 {
    let mut score = 0.0;

    if let Some(bitrate) = entry.bitrate {
        score += (bitrate as f64 / config.max_bitrate as f64).min(1.0) * WEIGHT_BITRATE;
    }

    if let Some(sample_rate) = entry.sample_rate {
        score +=
            (sample_rate as f64 / config.max_sample_rate as f64).min(1.0) * WEIGHT_SAMPLE_RATE;
    }

    score += format_rank(entry.format.as_deref()) / 100.0 * WEIGHT_FORMAT;

    let completeness = entry
        .metadata_completeness
        .unwrap_or_else(|| normalizer::completeness(entry));
    score += completeness as f64 / 100.0 * WEIGHT_COMPLETENESS;

    if entry.artwork_path.is_some() {
        score += WEIGHT_ARTWORK;
    }

    if let Some(file_size) = entry.file_size {
        score += (file_size as f64 / config.max_file_size as f64).min(1.0) * WEIGHT_FILE_SIZE;
    }

    (score * 100.0 * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::mock_entry;

    fn config() -> DedupConfig {
        DedupConfig::default()
    }

    #[test]
    fn test_score_is_deterministic() {
        let entry = mock_entry(1);
        let first = quality_score(&entry, &config());
        let second = quality_score(&entry, &config());
        assert_eq!(first, second);
    }

    #[test]
    fn test_full_marks() {
        let entry = LibraryEntry {
            bitrate: Some(320),
            sample_rate: Some(96_000),
            format: Some("FLAC".into()),
            metadata_completeness: Some(100),
            artwork_path: Some("/art.jpg".into()),
            file_size: Some(50 * 1024 * 1024),
            ..mock_entry(1)
        };
        assert_eq!(quality_score(&entry, &config()), 100.0);
    }

    #[test]
    fn test_absent_signals_contribute_zero() {
        let entry = LibraryEntry {
            bitrate: None,
            sample_rate: None,
            format: None,
            metadata_completeness: Some(0),
            artwork_path: None,
            file_size: None,
            ..mock_entry(1)
        };
        // Only the unknown-format default contributes: 0.5 * 0.20 * 100
        assert_eq!(quality_score(&entry, &config()), 10.0);
    }

    #[test]
    fn test_bitrate_caps_at_max() {
        let base = LibraryEntry {
            metadata_completeness: Some(0),
            format: Some("MP3".into()),
            ..mock_entry(1)
        };
        let at_cap = LibraryEntry {
            bitrate: Some(320),
            ..base.clone()
        };
        let over_cap = LibraryEntry {
            bitrate: Some(1411),
            ..base
        };
        assert_eq!(
            quality_score(&at_cap, &config()),
            quality_score(&over_cap, &config())
        );
    }

    #[test]
    fn test_lossless_beats_lossy() {
        let base = LibraryEntry {
            bitrate: Some(256),
            metadata_completeness: Some(50),
            ..mock_entry(1)
        };
        let flac = LibraryEntry {
            format: Some("flac".into()),
            ..base.clone()
        };
        let mp3 = LibraryEntry {
            format: Some("mp3".into()),
            ..base
        };
        assert!(quality_score(&flac, &config()) > quality_score(&mp3, &config()));
    }

    #[test]
    fn test_unknown_format_defaults_to_midpoint() {
        let entry = LibraryEntry {
            format: Some("XYZ".into()),
            metadata_completeness: Some(0),
            ..mock_entry(1)
        };
        assert_eq!(quality_score(&entry, &config()), 10.0);
    }

    #[test]
    fn test_completeness_computed_when_not_stored() {
        let entry = LibraryEntry {
            metadata_completeness: None,
            artist: Some("Artist".into()),
            album: None,
            genre: None,
            year: None,
            track_number: None,
            bitrate: None,
            sample_rate: None,
            format: None,
            artwork_path: None,
            file_size: None,
            ..mock_entry(1)
        };
        // title 20 + artist 25 = 45 completeness -> 0.45 * 0.20 = 0.09,
        // plus unknown format 0.10 -> 19.0
        assert_eq!(quality_score(&entry, &config()), 19.0);
    }
}
