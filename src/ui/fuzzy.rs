//! Fuzzy ranking for the entry picker

/// How well a candidate matches; lower is better
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum MatchKind {
  Exact,
  Prefix,
  WordPrefix,
  Contains,
  Subsequence,
}

fn match_kind(candidate: &str, query: &str) -> Option<MatchKind> {
  let candidate = candidate.to_lowercase();

  if candidate == query {
    return Some(MatchKind::Exact);
  }
  if candidate.starts_with(query) {
    return Some(MatchKind::Prefix);
  }
  if candidate
    .split(|c: char| !c.is_alphanumeric())
    .any(|word| !word.is_empty() && word.starts_with(query))
  {
    return Some(MatchKind::WordPrefix);
  }
  if candidate.contains(query) {
    return Some(MatchKind::Contains);
  }

  // Every query character in order, gaps allowed
  let mut chars = candidate.chars();
  query
    .chars()
    .filter(|c| !c.is_whitespace())
    .all(|q| chars.any(|c| c == q))
    .then_some(MatchKind::Subsequence)
}

/// Candidates matching `query`, best first. Ties keep the input order.
pub fn rank<'a>(query: &str, candidates: &[&'a str]) -> Vec<&'a str> {
  let query = query.trim().to_lowercase();

  if query.is_empty() {
    return candidates.to_vec();
  }

  let mut matches: Vec<(&str, MatchKind)> = candidates
    .iter()
    .filter_map(|c| match_kind(c, &query).map(|kind| (*c, kind)))
    .collect();

  // Stable sort
  matches.sort_by_key(|(_, kind)| *kind);

  matches.into_iter().map(|(c, _)| c).collect()
}
