use serde::{Deserialize, Serialize};

pub const DEFAULT_THRESHOLD: f64 = 0.8;
const TOKEN_OVERLAP_RATIO: f64 = 0.7;
const MIN_TOKEN_LEN: usize = 4;

/// How two event titles are compared when looking for duplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityPolicy {
    /// Normalized Levenshtein similarity above the threshold.
    #[default]
    EditDistance,
    /// Equality, containment, or most long words shared.
    TokenOverlap,
}

#[derive(Debug, Clone, Copy)]
pub struct TitleSimilarity {
    policy: SimilarityPolicy,
    threshold: f64,
}

impl Default for TitleSimilarity {
    fn default() -> Self {
        Self::new(SimilarityPolicy::EditDistance)
    }
}

impl TitleSimilarity {
    pub fn new(policy: SimilarityPolicy) -> Self {
        Self { policy, threshold: DEFAULT_THRESHOLD }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn policy(&self) -> SimilarityPolicy {
        self.policy
    }

    pub fn similar(&self, a: &str, b: &str) -> bool {
        let a = normalize_title(a);
        let b = normalize_title(b);
        match self.policy {
            SimilarityPolicy::EditDistance => edit_similarity(&a, &b) > self.threshold,
            SimilarityPolicy::TokenOverlap => token_overlap(&a, &b),
        }
    }
}

fn fold_turkish(c: char) -> char {
    match c {
        'ç' | 'Ç' => 'c',
        'ğ' | 'Ğ' => 'g',
        'ı' | 'İ' => 'i',
        'ö' | 'Ö' => 'o',
        'ş' | 'Ş' => 's',
        'ü' | 'Ü' => 'u',
        'â' | 'Â' => 'a',
        'î' | 'Î' => 'i',
        'û' | 'Û' => 'u',
        other => other,
    }
}

/// Lowercase ASCII letters, digits and single spaces only.
pub fn normalize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(fold_turkish)
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace() { c } else { '\0' })
        .filter(|c| *c != '\0')
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `1 - distance / max_len` over already-normalized strings.
/// An empty side counts as identical.
pub fn edit_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() || a == b {
        return 1.0;
    }
    let max_len = a.chars().count().max(b.chars().count());
    1.0 - levenshtein_distance(a, b) as f64 / max_len as f64
}

fn levenshtein_distance(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b_chars.len()).collect();
    let mut current = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            current[j + 1] = (previous[j + 1] + 1).min(current[j] + 1).min(previous[j] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b_chars.len()]
}

fn token_overlap(a: &str, b: &str) -> bool {
    if a.is_empty() || b.is_empty() || a == b || a.contains(b) || b.contains(a) {
        return true;
    }

    let (shorter, longer) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let longer_words: Vec<&str> = longer.split(' ').collect();
    let significant: Vec<&str> = shorter.split(' ').filter(|w| w.len() >= MIN_TOKEN_LEN).collect();
    if significant.is_empty() {
        return false;
    }

    let shared = significant.iter().filter(|w| longer_words.contains(w)).count();
    shared as f64 / significant.len() as f64 >= TOKEN_OVERLAP_RATIO
}
