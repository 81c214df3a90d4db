//! Metadata string normalization for comparison and grouping.
//!
//! Canonicalizes display strings (case, Unicode form, punctuation, article
//! placement) so near-identical tags compare equal. Original values are
//! never overwritten; normalized values are stored alongside them.
//!
//! Normalization is idempotent: normalizing an already-normalized string
//! returns it unchanged.

use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Punctuation that varies between tag sources, mapped to ASCII equivalents.
const PUNCTUATION_MAP: &[(char, &str)] = &[
    ('\u{2018}', "'"),  // left single quote
    ('\u{2019}', "'"),  // right single quote
    ('\u{201A}', "'"),  // single low quote
    ('\u{201C}', "\""), // left double quote
    ('\u{201D}', "\""), // right double quote
    ('\u{201E}', "\""), // double low quote
    ('\u{2013}', "-"),  // en dash
    ('\u{2014}', "-"),  // em dash
    ('\u{2026}', "..."),
    ('\u{00D7}', "x"),
    ('\u{2022}', "-"), // bullet
];

/// Featuring/with clauses, parenthesized or trailing. Tag sources are wildly
/// inconsistent about these, so matching strips them when asked to.
static FEATURING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*\(?\s*\b(?:feat\.?|ft\.?|featuring|with)\s+[^)]*\)?").unwrap()
});

/// Options controlling [`normalize`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeOptions {
    /// Rewrite a leading "the/a/an" to the end ("The Beatles" -> "beatles, the")
    pub move_article_to_end: bool,
    /// Strip "feat./ft./featuring/with ..." clauses
    pub strip_featuring: bool,
}

/// Normalize a string for comparison:
/// 1. Unicode normalization (NFKC)
/// 2. Lowercase
/// 3. Punctuation normalization
/// 4. Optional: strip featuring clauses
/// 5. Whitespace collapse and trim
/// 6. Optional: article prefix handling
///
/// Returns `None` for absent, empty, or whitespace-only input.
pub fn normalize(value: Option<&str>, options: NormalizeOptions) -> Option<String> {
    let value = value?;
    if value.trim().is_empty() {
        return None;
    }

    let mut normalized: String = value.nfkc().collect::<String>().to_lowercase();

    for (from, to) in PUNCTUATION_MAP {
        if normalized.contains(*from) {
            normalized = normalized.replace(*from, to);
        }
    }

    if options.strip_featuring {
        normalized = FEATURING_RE.replace_all(&normalized, "").into_owned();
    }

    // Collapse runs of whitespace and trim
    let mut normalized = normalized.split_whitespace().collect::<Vec<_>>().join(" ");

    if options.move_article_to_end && !ends_with_moved_article(&normalized) {
        for article in ["the", "a", "an"] {
            if let Some(rest) = normalized.strip_prefix(article) {
                // Must be a whole leading word, and something must remain
                let rest = rest.strip_prefix(' ').map(str::trim_start);
                if let Some(rest) = rest
                    && !rest.is_empty()
                {
                    normalized = format!("{rest}, {article}");
                    break;
                }
            }
        }
    }

    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

/// True when the string already carries a moved article ("beatles, the").
/// The rewrite must not fire on its own output, or normalization stops
/// being idempotent ("a an b" -> "an b, a" -> "b, a, an").
fn ends_with_moved_article(s: &str) -> bool {
    [", the", ", a", ", an"]
        .iter()
        .any(|suffix| s.ends_with(suffix))
}

/// Normalize a track title.
///
/// Does NOT move articles - song titles often start with "The" intentionally.
pub fn normalize_title(title: Option<&str>) -> Option<String> {
    normalize(title, NormalizeOptions::default())
}

/// Normalize an artist name, moving "The/A/An" to the end for sorting.
pub fn normalize_artist(artist: Option<&str>) -> Option<String> {
    normalize(
        artist,
        NormalizeOptions {
            move_article_to_end: true,
            strip_featuring: false,
        },
    )
}

/// Normalize an album name, moving "The/A/An" to the end for sorting.
pub fn normalize_album(album: Option<&str>) -> Option<String> {
    normalize(
        album,
        NormalizeOptions {
            move_article_to_end: true,
            strip_featuring: false,
        },
    )
}

/// Aggressive title normalization for duplicate matching: also strips
/// featuring clauses, which vary between otherwise-identical copies.
pub fn normalize_for_matching(title: Option<&str>) -> Option<String> {
    normalize(
        title,
        NormalizeOptions {
            move_article_to_end: false,
            strip_featuring: true,
        },
    )
}

/// Weights for the metadata completeness score. Artist outweighs everything
/// else because it drives library organization.
const COMPLETENESS_WEIGHTS: &[(CompletenessField, i64)] = &[
    (CompletenessField::Title, 20),
    (CompletenessField::Artist, 25),
    (CompletenessField::Album, 15),
    (CompletenessField::Year, 10),
    (CompletenessField::Genre, 10),
    (CompletenessField::Artwork, 10),
    (CompletenessField::TrackNumber, 5),
    (CompletenessField::Bitrate, 5),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompletenessField {
    Title,
    Artist,
    Album,
    Year,
    Genre,
    Artwork,
    TrackNumber,
    Bitrate,
}

/// Calculate a metadata completeness score (0-100) from the presence of
/// individual tag fields.
#[allow(clippy::too_many_arguments)]
pub fn completeness_of(
    title: Option<&str>,
    artist: Option<&str>,
    album: Option<&str>,
    year: Option<i64>,
    genre: Option<&str>,
    artwork_path: Option<&str>,
    track_number: Option<i64>,
    bitrate: Option<i64>,
) -> i64 {
    let present = |s: Option<&str>| s.map(|v| !v.trim().is_empty()).unwrap_or(false);

    COMPLETENESS_WEIGHTS
        .iter()
        .filter(|(field, _)| match field {
            CompletenessField::Title => present(title),
            CompletenessField::Artist => present(artist),
            CompletenessField::Album => present(album),
            CompletenessField::Year => year.is_some(),
            CompletenessField::Genre => present(genre),
            CompletenessField::Artwork => present(artwork_path),
            CompletenessField::TrackNumber => track_number.is_some(),
            CompletenessField::Bitrate => bitrate.is_some(),
        })
        .map(|(_, weight)| weight)
        .sum()
}

/// Completeness of a library entry's current field values.
pub fn completeness(entry: &crate::model::LibraryEntry) -> i64 {
    completeness_of(
        Some(&entry.title),
        entry.artist.as_deref(),
        entry.album.as_deref(),
        entry.year,
        entry.genre.as_deref(),
        entry.artwork_path.as_deref(),
        entry.track_number,
        entry.bitrate,
    )
}
