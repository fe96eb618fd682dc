//! Content category inference and category affinity.

use memory_types::text::tokenize;
use memory_types::DEFAULT_CATEGORY;

/// Keyword table, checked in order; the first category with a matching
/// keyword wins.
const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "technology",
        &[
            "ai",
            "artificial intelligence",
            "machine learning",
            "deep learning",
            "algorithm",
            "software",
            "programming",
        ],
    ),
    (
        "business",
        &[
            "business",
            "enterprise",
            "startup",
            "investment",
            "market",
            "strategy",
            "management",
        ],
    ),
    (
        "science",
        &[
            "research",
            "study",
            "experiment",
            "discovery",
            "theory",
            "hypothesis",
        ],
    ),
    (
        "culture",
        &["art", "music", "literature", "history", "philosophy", "culture"],
    ),
    (
        "politics",
        &["politics", "government", "policy", "election", "democracy"],
    ),
];

/// Affinity between distinct categories. Symmetric; pairs not listed score
/// [`UNRELATED_AFFINITY`].
const CATEGORY_AFFINITY: &[(&str, &str, f32)] = &[
    ("technology", "science", 0.8),
    ("technology", "business", 0.6),
    ("technology", "culture", 0.2),
    ("technology", "politics", 0.1),
    ("business", "politics", 0.5),
    ("business", "science", 0.3),
    ("business", "culture", 0.2),
    ("science", "culture", 0.4),
    ("science", "politics", 0.2),
    ("culture", "politics", 0.3),
];

pub const UNRELATED_AFFINITY: f32 = 0.1;

/// Infer a category from content keywords. Keywords match on word
/// boundaries; multi-word keywords match as phrases.
pub fn infer_category(content: &str) -> &'static str {
    let tokens = tokenize(content);
    if tokens.is_empty() {
        return DEFAULT_CATEGORY;
    }
    let padded = format!(" {} ", tokens.join(" "));
    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| {
            keywords
                .iter()
                .any(|k| padded.contains(&format!(" {k} ")))
        })
        .map(|(name, _)| *name)
        .unwrap_or(DEFAULT_CATEGORY)
}

/// Affinity of two categories in `[0, 1]`.
pub fn category_similarity(a: &str, b: &str) -> f32 {
    if a == b {
        return 1.0;
    }
    CATEGORY_AFFINITY
        .iter()
        .find(|(x, y, _)| (*x == a && *y == b) || (*x == b && *y == a))
        .map(|(_, _, s)| *s)
        .unwrap_or(UNRELATED_AFFINITY)
}

/// Best affinity between `category` and any of `preferred`; 0 when empty.
pub fn best_match(category: &str, preferred: &[String]) -> f32 {
    preferred
        .iter()
        .map(|p| category_similarity(category, p))
        .fold(0.0, f32::max)
}
