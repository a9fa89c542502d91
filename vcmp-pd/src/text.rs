//! Text normalisation shared by the scorer, the cache key and duplicate
//! suppression

use once_cell::sync::Lazy;
use regex::Regex;

/// Bracketed decorations added by uploaders: "(Official Video)", "[Lyrics]", "(HD)"
static DECORATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\s*[\(\[][^\)\]]*\b(official|video|audio|lyrics?|visuali[sz]er|hd|hq|4k|mv|music video)\b[^\)\]]*[\)\]]",
    )
    .expect("decoration regex is valid")
});

/// Channel suffixes that are not part of the artist name
static CHANNEL_SUFFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*(-\s*topic|vevo|official)\s*$").expect("channel suffix regex is valid")
});

/// Lowercase, drop apostrophes, turn every other non-alphanumeric into a
/// space and collapse runs of whitespace
pub fn normalize(text: &str) -> String {
    let mapped: String = text
        .chars()
        .filter(|c| *c != '\'' && *c != '\u{2019}')
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_lowercase().next().unwrap_or(c)
            } else {
                ' '
            }
        })
        .collect();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalised whitespace-separated tokens
pub fn tokens(text: &str) -> Vec<String> {
    normalize(text)
        .split(' ')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whole-word containment on already-normalised strings
pub fn contains_phrase(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    format!(" {} ", haystack).contains(&format!(" {} ", needle))
}

/// Split an artist credit into individual aliases on commas, ampersands and
/// "feat." markers
pub fn artist_aliases(artist: &str) -> Vec<String> {
    let mut aliases = Vec::new();
    for part in artist.split([',', '&']) {
        let part = part
            .split(" feat. ")
            .flat_map(|p| p.split(" ft. "))
            .map(normalize)
            .filter(|a| !a.is_empty());
        for alias in part {
            if !aliases.contains(&alias) {
                aliases.push(alias);
            }
        }
    }
    aliases
}

/// Strip uploader decorations from a title
pub fn clean_title(title: &str) -> String {
    DECORATION_RE.replace_all(title, "").trim().to_string()
}

/// Strip channel suffixes ("Artist - Topic", "ArtistVEVO") from an author
pub fn clean_artist(author: &str) -> String {
    let cleaned = CHANNEL_SUFFIX_RE.replace(author, "").trim().to_string();
    if cleaned.is_empty() {
        author.trim().to_string()
    } else {
        cleaned
    }
}

/// Key used to decide whether two titles name the same song
pub fn title_key(title: &str) -> String {
    normalize(&clean_title(title))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Don't Stop -- ME!! "), "dont stop me");
        assert_eq!(normalize("Beyoncé (Live)"), "beyoncé live");
    }

    #[test]
    fn test_contains_phrase_respects_word_boundaries() {
        assert!(contains_phrase("song x remix", "song x"));
        assert!(!contains_phrase("lives", "live"));
        assert!(!contains_phrase("anything", ""));
    }

    #[test]
    fn test_artist_aliases() {
        assert_eq!(
            artist_aliases("Artist A, B & The Cs"),
            vec!["artist a", "b", "the cs"]
        );
        assert_eq!(artist_aliases("Main feat. Guest"), vec!["main", "guest"]);
    }

    #[test]
    fn test_clean_title_and_artist() {
        assert_eq!(clean_title("Song X (Official Music Video)"), "Song X");
        assert_eq!(clean_title("Song X [Lyrics] (Remix)"), "Song X (Remix)");
        assert_eq!(clean_artist("Artist A - Topic"), "Artist A");
        assert_eq!(clean_artist("ArtistVEVO"), "Artist");
        assert_eq!(clean_artist("VEVO"), "VEVO");
    }

    #[test]
    fn test_title_key_ignores_decorations() {
        assert_eq!(title_key("Song A (Official Audio)"), title_key("song a"));
    }
}
