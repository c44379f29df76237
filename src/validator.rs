use crate::dictionary::Dictionary;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Why a submitted word was rejected, in checking order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvalidReason {
    Empty,
    InvalidCharacters,
    TooShort,
    WrongStartingLetter { expected: char },
    AlreadyUsed,
    NotInDictionary,
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidReason::Empty => write!(f, "empty"),
            InvalidReason::InvalidCharacters => write!(f, "invalid characters"),
            InvalidReason::TooShort => write!(f, "too short"),
            InvalidReason::WrongStartingLetter { expected } => {
                write!(f, "must start with '{}'", expected)
            }
            InvalidReason::AlreadyUsed => write!(f, "already used"),
            InvalidReason::NotInDictionary => write!(f, "not in dictionary"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Valid(ValidWord),
    Invalid(InvalidReason),
}

/// An accepted word together with what the dictionary knows about it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidWord {
    pub word: String,
    pub alias: Option<String>,
    pub rare: bool,
}

/// Letters, plus the separators that appear inside place names
pub(crate) fn is_word_char(c: char) -> bool {
    c.is_alphabetic() || matches!(c, ' ' | '-' | '\'')
}

/// Canonical form of raw chat input
pub fn normalize(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn first_letter(word: &str) -> Option<char> {
    word.chars().find(|c| c.is_alphabetic())
}

pub fn last_letter(word: &str) -> Option<char> {
    word.chars().rev().find(|c| c.is_alphabetic())
}

/// Stateless word legality checks over a shared dictionary snapshot
#[derive(Debug, Clone)]
pub struct WordValidator {
    dictionary: Arc<Dictionary>,
}

impl WordValidator {
    pub fn new(dictionary: Arc<Dictionary>) -> Self {
        WordValidator { dictionary }
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    /// Check `word` against the chaining letter and the words already played.
    /// The first failing check decides the reason.
    pub fn validate(
        &self,
        word: &str,
        required_letter: Option<char>,
        used_words: &HashSet<String>,
    ) -> Validation {
        let word = normalize(word);

        if word.is_empty() {
            return Validation::Invalid(InvalidReason::Empty);
        }

        if !word.chars().all(is_word_char) {
            return Validation::Invalid(InvalidReason::InvalidCharacters);
        }

        if word.chars().filter(|c| c.is_alphabetic()).count() < 2 {
            return Validation::Invalid(InvalidReason::TooShort);
        }

        if let Some(expected) = required_letter {
            let expected = expected.to_lowercase().next().unwrap_or(expected);
            if first_letter(&word) != Some(expected) {
                return Validation::Invalid(InvalidReason::WrongStartingLetter { expected });
            }
        }

        let alias = self.dictionary.alias_of(&word).map(str::to_string);

        let repeated = used_words.contains(&word)
            || alias.as_ref().is_some_and(|a| used_words.contains(a));
        if repeated {
            return Validation::Invalid(InvalidReason::AlreadyUsed);
        }

        let known = self.dictionary.contains(&word)
            || alias.as_ref().is_some_and(|a| self.dictionary.contains(a));
        if !known {
            return Validation::Invalid(InvalidReason::NotInDictionary);
        }

        let rare = self.dictionary.is_rare(&word)
            || alias.as_ref().is_some_and(|a| self.dictionary.is_rare(a));

        Validation::Valid(ValidWord { word, alias, rare })
    }
}
