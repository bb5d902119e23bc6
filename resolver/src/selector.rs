/// Quality-based choice among media candidates.
use terarelay_shared::models::MediaCandidate;

/// Picks one candidate by walking an ordered list of quality tags.
#[derive(Debug, Clone)]
pub struct QualitySelector {
    preferences: Vec<String>,
}

impl QualitySelector {
    pub fn new(preferences: &[String]) -> Self {
        Self {
            preferences: preferences.to_vec(),
        }
    }

    /// Select the best candidate.
    ///
    /// The first preference tag contained in any URL decides the tier; ties
    /// and the no-tag fallback go to the lexicographically smallest URL, so
    /// the choice depends only on the set of candidates. Returns `None` only
    /// for empty input.
    pub fn select<'a>(&self, candidates: &'a [MediaCandidate]) -> Option<&'a MediaCandidate> {
        for tag in &self.preferences {
            let best = candidates
                .iter()
                .filter(|c| c.url.contains(tag.as_str()))
                .min_by(|a, b| a.url.cmp(&b.url));
            if best.is_some() {
                return best;
            }
        }
        candidates.iter().min_by(|a, b| a.url.cmp(&b.url))
    }
}
