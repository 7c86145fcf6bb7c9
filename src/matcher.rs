//! Candidate evaluation for peer search results and fallback songs.
//!
//! Everything here is pure: no I/O, no clock.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::AcquisitionRequest;
use crate::ports::fallback::FallbackSong;
use crate::slskd::{PeerFile, PeerResponse};

/// Files at or above this size are never requested.
pub const MAX_CANDIDATE_SIZE: u64 = 2_000_000_000;

/// Formats the finalizer can tag.
pub const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "ogg", "wav", "m4a", "aac", "alac", "aiff",
];

static BRACKETED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s?[\(\[].*?[\)\]]").expect("valid bracket regex"));

static TRAILING_QUALIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s*[-_]\s*(instrumental|remix|edit)\s*$").expect("valid qualifier regex")
});

/// A file worth trying, with the peer offering it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub username: String,
    pub filename: String,
    pub size: u64,
}

// ============================================================================
// String Utilities
// ============================================================================

/// Lowercase, drop `(...)`/`[...]` groups and a trailing
/// `- instrumental`/`- remix`/`- edit` qualifier, then trim.
pub fn normalize_title(title: &str) -> String {
    let lowered = title.to_lowercase();
    let without_groups = BRACKETED.replace_all(&lowered, "");
    let without_qualifier = TRAILING_QUALIFIER.replace(without_groups.trim_end(), "");
    without_qualifier.trim().to_string()
}

/// Lowercased extension of a remote path, or an empty string.
pub fn extension(filename: &str) -> String {
    match filename.rfind('.') {
        Some(dot) if dot + 1 < filename.len() => filename[dot + 1..].to_lowercase(),
        _ => String::new(),
    }
}

/// File name without directories (either separator) and without extension.
fn file_stem(filename: &str) -> &str {
    let name = filename.rsplit(['\\', '/']).next().unwrap_or(filename);
    match name.rfind('.') {
        Some(dot) if dot > 0 => &name[..dot],
        _ => name,
    }
}

/// Lower number sorts first; lossless formats are preferred.
pub fn extension_priority(filename: &str) -> u8 {
    match extension(filename).as_str() {
        "flac" => 1,
        "ogg" => 2,
        "wav" => 3,
        _ => 99,
    }
}

/// Levenshtein distance over characters.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, a_char) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, b_char) in b.iter().enumerate() {
            let cost = usize::from(a_char != b_char);
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

// ============================================================================
// Peer candidates
// ============================================================================

pub fn is_acceptable_candidate(file: &PeerFile, request: &AcquisitionRequest) -> bool {
    if file.is_locked || file.size >= MAX_CANDIDATE_SIZE {
        return false;
    }
    if !AUDIO_EXTENSIONS.contains(&extension(&file.filename).as_str()) {
        return false;
    }

    let wanted = normalize_title(&request.track_name);
    let candidate = normalize_title(file_stem(&file.filename));
    if !wanted
        .split_whitespace()
        .all(|token| candidate.contains(token))
    {
        return false;
    }

    file.filename
        .to_lowercase()
        .contains(&request.primary_artist().to_lowercase())
}

/// Acceptable files from peers with a free upload slot, best extension first.
/// Ties keep the order the peer service reported them in.
pub fn rank_candidates(responses: &[PeerResponse], request: &AcquisitionRequest) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = responses
        .iter()
        .filter(|response| response.has_free_upload_slot)
        .flat_map(|response| {
            response
                .files
                .iter()
                .filter(|file| is_acceptable_candidate(file, request))
                .map(|file| Candidate {
                    username: response.username.clone(),
                    filename: file.filename.clone(),
                    size: file.size,
                })
        })
        .collect();

    candidates.sort_by_key(|candidate| extension_priority(&candidate.filename));
    candidates
}

// ============================================================================
// Fallback songs
// ============================================================================

/// Exact artist + normalized title match first, otherwise the song whose
/// title is closest to the wanted one.
pub fn pick_fallback_song<'a>(
    songs: &'a [FallbackSong],
    request: &AcquisitionRequest,
) -> Option<&'a FallbackSong> {
    let primary_artist = request.primary_artist().to_lowercase();
    let wanted = normalize_title(&request.track_name);

    let exact = songs.iter().find(|song| {
        song.artists
            .iter()
            .any(|artist| artist.to_lowercase() == primary_artist)
            && normalize_title(&song.title) == wanted
    });
    if exact.is_some() {
        return exact;
    }

    songs
        .iter()
        .min_by_key(|song| edit_distance(&song.title, &request.track_name))
}
