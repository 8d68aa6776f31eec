//! Turns raw detected text into the sorted, de-duplicated word list stored in metadata.
use std::collections::BTreeSet;

/// Characters stripped from both ends of every word.
const DEFAULT_PUNCTUATION: &str =
  "`~!@#$%^&*()_+[]\\{}|;':\",./<>?¡™£¢∞§¶•ªº–—=±“”‘’…æÆ≤¯≥˘÷¿Œ∑„´‰†¥ˆøπƒ©˚¬≈∫";

/// An immutable set of characters to trim from word boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Punctuation {
  chars: BTreeSet<char>,
}

impl Punctuation {
  pub fn new(chars: impl IntoIterator<Item = char>) -> Self {
    Self {
      chars: chars.into_iter().collect(),
    }
  }

  pub fn contains(&self, c: char) -> bool {
    self.chars.contains(&c)
  }

  /// Strips leading and trailing characters that belong to the set.
  pub fn trim<'a>(&self, word: &'a str) -> &'a str {
    word.trim_matches(|c: char| self.contains(c))
  }
}

impl Default for Punctuation {
  fn default() -> Self {
    Self::new(DEFAULT_PUNCTUATION.chars())
  }
}

/// Sanitizes detected lines into lowercase words, de-duplicated and sorted byte-wise.
///
/// Lines are trimmed and split on single spaces, so runs of spaces or a blank
/// line produce an empty word. Empty words are kept; use [`describe_words`]
/// to drop them when composing a description.
pub fn sanitize_words<I, S>(lines: I, punctuation: &Punctuation) -> Vec<String>
where
  I: IntoIterator<Item = S>,
  S: AsRef<str>,
{
  let mut words = BTreeSet::new();

  for line in lines {
    for token in line.as_ref().trim().split(' ') {
      let lowered = token.to_lowercase();
      words.insert(punctuation.trim(&lowered).to_string());
    }
  }

  words.into_iter().collect()
}

/// Joins the non-empty words with single spaces.
pub fn describe_words<S: AsRef<str>>(words: &[S]) -> String {
  words
    .iter()
    .map(AsRef::as_ref)
    .filter(|w| !w.is_empty())
    .collect::<Vec<_>>()
    .join(" ")
}
