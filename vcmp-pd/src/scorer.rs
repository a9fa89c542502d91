//! Candidate Scorer
//!
//! Ranks backend search results against a canonical descriptor with a
//! weighted heuristic. Pure: no I/O, deterministic for identical inputs.
//!
//! # Scoring (base 100)
//! - Unreliable backend: −30
//! - Exclude lexicon match in title (remix, nightcore, cover, ...): −60 each
//! - Extraneous title word: −10, or −40 when the word is itself excluded
//! - Title equals / contains the canonical title: +20
//! - Canonical artist alias in title or author: +20 (short alias) / +45
//! - No artist match at all: −25
//! - Soundtrack marker absent from the canonical title: +35 (once)
//! - Duration proximity (known canonical duration): ≤5s +40, ≤15s +25,
//!   ≤30s +5, >45s −30
//! - Duration outside 60s..600s when the canonical duration is unknown: −20

use crate::text::{artist_aliases, contains_phrase, normalize, tokens};
use std::collections::HashSet;
use tracing::trace;
use vcmp_common::{BackendKind, Candidate, CanonicalTrackDescriptor};

const BASE_SCORE: i32 = 100;
const UNRELIABLE_BACKEND_PENALTY: i32 = 30;
const EXCLUDE_PENALTY: i32 = 60;
const EXTRANEOUS_WORD_PENALTY: i32 = 10;
const EXTRANEOUS_EXCLUDED_WORD_PENALTY: i32 = 40;
const TITLE_MATCH_BONUS: i32 = 20;
const SHORT_ALIAS_BONUS: i32 = 20;
const LONG_ALIAS_BONUS: i32 = 45;
/// Aliases up to this many characters match spuriously often
const SHORT_ALIAS_MAX_CHARS: usize = 4;
const UNKNOWN_AUTHOR_PENALTY: i32 = 25;
const SOUNDTRACK_BONUS: i32 = 35;
const DURATION_SANITY_PENALTY: i32 = 20;
const MIN_SANE_DURATION_MS: u64 = 60_000;
const MAX_SANE_DURATION_MS: u64 = 600_000;

/// Minimum score for a clean candidate to be accepted outright
pub const MIN_ACCEPTABLE_SCORE: i32 = 40;
/// Minimum score for a clean alternate-backend candidate
pub const ALTERNATE_MIN_SCORE: i32 = 20;

/// Quality-degrading markers, matched as whole phrases on normalised titles
const EXCLUDE_PATTERNS: &[&str] = &[
    "remix",
    "slowed",
    "reverb",
    "sped up",
    "speed up",
    "nightcore",
    "cover",
    "karaoke",
    "lofi",
    "lo fi",
    "mashup",
    "live",
    "extended",
    "instrumental",
    "8d",
    "bass boosted",
    "acapella",
    "a cappella",
    "reaction",
    "1 hour",
    "loop",
];

/// Single words that mark an extraneous token as a quality marker
const EXCLUDE_TOKENS: &[&str] = &[
    "remix",
    "remixed",
    "slowed",
    "reverb",
    "sped",
    "nightcore",
    "cover",
    "karaoke",
    "lofi",
    "mashup",
    "live",
    "extended",
    "instrumental",
    "8d",
    "boosted",
    "acapella",
    "reaction",
    "loop",
];

/// Decoration words that say nothing about which recording it is
const NOISE_TOKENS: &[&str] = &[
    "official", "audio", "video", "music", "lyrics", "lyric", "hd", "hq", "4k", "mv",
    "visualizer", "visualiser", "ft", "feat", "featuring", "prod", "by", "the", "a", "an", "and",
    "x", "with", "topic", "vevo", "explicit", "clean", "remastered", "remaster",
];

/// Phrases indicating an original-source (film, game, show) release
const SOUNDTRACK_MARKERS: &[&str] = &[
    "ost",
    "soundtrack",
    "original score",
    "motion picture",
    "from the movie",
    "from the film",
    "from the series",
    "theme song",
];

/// Words of the soundtrack markers; not counted as extraneous
const SOUNDTRACK_TOKENS: &[&str] = &[
    "ost", "soundtrack", "original", "score", "motion", "picture", "from", "movie", "film",
    "series", "theme", "song",
];

/// Candidate with its heuristic score
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub score: i32,
    /// Number of exclude-lexicon phrases matched in the title
    pub exclude_match_count: u32,
}

impl ScoredCandidate {
    /// No exclude-lexicon phrase matched
    pub fn is_clean(&self) -> bool {
        self.exclude_match_count == 0
    }
}

/// Which rule of the selection policy produced the pick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionTier {
    /// Highest clean candidate at or above [`MIN_ACCEPTABLE_SCORE`]
    Clean,
    /// Clean alternate-backend candidate while the primary backend had only tainted results
    AlternateClean,
    /// Highest candidate overall, tainted or not
    BestEffort,
}

/// Selected candidate
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub scored: ScoredCandidate,
    pub tier: SelectionTier,
}

impl Selection {
    /// Whether the pick is good enough to skip a degraded search
    pub fn is_acceptable(&self) -> bool {
        self.tier != SelectionTier::BestEffort || self.scored.score >= MIN_ACCEPTABLE_SCORE
    }
}

/// Pre-normalised view of the canonical descriptor
struct CanonicalView {
    title: String,
    aliases: Vec<String>,
    vocabulary: HashSet<String>,
    duration_ms: Option<u64>,
}

impl CanonicalView {
    fn new(canonical: &CanonicalTrackDescriptor) -> Self {
        let vocabulary = tokens(&canonical.title)
            .into_iter()
            .chain(tokens(&canonical.artist))
            .collect();
        Self {
            title: normalize(&canonical.title),
            aliases: artist_aliases(&canonical.artist),
            vocabulary,
            duration_ms: canonical.duration_ms,
        }
    }

    /// Whether the canonical title or artist already contains `phrase`
    fn mentions(&self, phrase: &str) -> bool {
        contains_phrase(&self.title, phrase)
            || self.aliases.iter().any(|alias| contains_phrase(alias, phrase))
    }
}

/// Score and rank candidates, highest first
///
/// Ties keep the fewer-exclude-matches candidate first, then input order.
pub fn score(canonical: &CanonicalTrackDescriptor, candidates: &[Candidate]) -> Vec<ScoredCandidate> {
    let view = CanonicalView::new(canonical);

    let mut scored: Vec<ScoredCandidate> = candidates
        .iter()
        .map(|candidate| score_one(&view, candidate))
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then(a.exclude_match_count.cmp(&b.exclude_match_count))
    });
    scored
}

fn score_one(view: &CanonicalView, candidate: &Candidate) -> ScoredCandidate {
    let title = normalize(&candidate.title);
    let author = normalize(&candidate.author);
    let mut score = BASE_SCORE;
    let mut exclude_match_count = 0;

    if candidate.backend.is_unreliable_for_playback() {
        score -= UNRELIABLE_BACKEND_PENALTY;
    }

    for pattern in EXCLUDE_PATTERNS {
        if contains_phrase(&title, pattern) && !view.mentions(pattern) {
            score -= EXCLUDE_PENALTY;
            exclude_match_count += 1;
        }
    }

    let mut seen = HashSet::new();
    for token in title.split(' ').filter(|t| !t.is_empty()) {
        if !seen.insert(token)
            || view.vocabulary.contains(token)
            || NOISE_TOKENS.contains(&token)
            || SOUNDTRACK_TOKENS.contains(&token)
        {
            continue;
        }
        score -= if EXCLUDE_TOKENS.contains(&token) {
            EXTRANEOUS_EXCLUDED_WORD_PENALTY
        } else {
            EXTRANEOUS_WORD_PENALTY
        };
    }

    if !view.title.is_empty() && (title == view.title || contains_phrase(&title, &view.title)) {
        score += TITLE_MATCH_BONUS;
    }

    let mut artist_matched = false;
    for alias in &view.aliases {
        if contains_phrase(&title, alias) || contains_phrase(&author, alias) {
            artist_matched = true;
            score += if alias.chars().count() <= SHORT_ALIAS_MAX_CHARS {
                SHORT_ALIAS_BONUS
            } else {
                LONG_ALIAS_BONUS
            };
        }
    }
    if !artist_matched {
        score -= UNKNOWN_AUTHOR_PENALTY;
    }

    if SOUNDTRACK_MARKERS
        .iter()
        .any(|m| contains_phrase(&title, m) && !contains_phrase(&view.title, m))
    {
        score += SOUNDTRACK_BONUS;
    }

    score += duration_adjustment(view.duration_ms, candidate.duration_ms);

    trace!(
        title = %candidate.title,
        backend = %candidate.backend,
        score,
        exclude_match_count,
        "Scored candidate"
    );

    ScoredCandidate {
        candidate: candidate.clone(),
        score,
        exclude_match_count,
    }
}

/// Duration component of the score
///
/// With a known canonical duration only proximity counts, which keeps the
/// adjustment non-increasing in the duration difference. A candidate of
/// unknown length (`0`, live streams) cannot prove proximity and scores as
/// far off. The absolute sanity check applies when there is nothing to
/// compare against; unknown against unknown is neutral.
fn duration_adjustment(canonical_ms: Option<u64>, candidate_ms: u64) -> i32 {
    match canonical_ms {
        Some(_) if candidate_ms == 0 => -30,
        Some(expected) => {
            let diff = expected.abs_diff(candidate_ms);
            match diff {
                0..=5_000 => 40,
                5_001..=15_000 => 25,
                15_001..=30_000 => 5,
                30_001..=45_000 => 0,
                _ => -30,
            }
        }
        None if candidate_ms == 0 => 0,
        None if !(MIN_SANE_DURATION_MS..=MAX_SANE_DURATION_MS).contains(&candidate_ms) => {
            -DURATION_SANITY_PENALTY
        }
        None => 0,
    }
}

/// Apply the selection policy to a ranked list
///
/// `primary` is the low-penalty backend whose clean results are preferred.
pub fn select(ranked: &[ScoredCandidate], primary: BackendKind) -> Option<Selection> {
    if let Some(best_clean) = ranked
        .iter()
        .find(|s| s.is_clean())
        .filter(|s| s.score >= MIN_ACCEPTABLE_SCORE)
    {
        return Some(Selection {
            scored: best_clean.clone(),
            tier: SelectionTier::Clean,
        });
    }

    let primary_all_tainted = ranked
        .iter()
        .filter(|s| s.candidate.backend == primary)
        .all(|s| !s.is_clean());
    if primary_all_tainted {
        if let Some(alternate) = ranked.iter().find(|s| {
            s.candidate.backend != primary && s.is_clean() && s.score >= ALTERNATE_MIN_SCORE
        }) {
            return Some(Selection {
                scored: alternate.clone(),
                tier: SelectionTier::AlternateClean,
            });
        }
    }

    ranked.first().map(|best| Selection {
        scored: best.clone(),
        tier: SelectionTier::BestEffort,
    })
}

/// Score then select in one step
pub fn pick_best(
    canonical: &CanonicalTrackDescriptor,
    candidates: &[Candidate],
    primary: BackendKind,
) -> Option<Selection> {
    select(&score(canonical, candidates), primary)
}
