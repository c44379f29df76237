use crate::Result;
use crate::config::DictionaryConfig;
use crate::validator::is_word_char;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;
use tracing::{info, warn};
use url::Url;

/// On-disk dictionary format. All entries are lowercase.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DictionaryData {
    #[serde(default)]
    pub valid_words: BTreeSet<String>,
    #[serde(default)]
    pub rare_words: BTreeSet<String>,
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

/// Kind of place name being imported; decides the rare-word length threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceKind {
    Country,
    City,
}

impl PlaceKind {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "country" | "countries" => PlaceKind::Country,
            _ => PlaceKind::City,
        }
    }

    /// Names strictly longer than this many characters are flagged rare
    pub fn default_rare_over(&self) -> usize {
        match self {
            PlaceKind::Country => 8,
            PlaceKind::City => 12,
        }
    }
}

/// Entry of the public countries/cities datasets (`[{"name": ...}, ...]`)
#[derive(Debug, Deserialize)]
struct NamedPlace {
    #[serde(default)]
    name: String,
}

/// Read-only snapshot of valid words, rare words and one-hop aliases.
///
/// Shared between all rooms behind an `Arc`; nothing in the game engine
/// mutates it after construction.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    valid_words: HashSet<String>,
    rare_words: HashSet<String>,
    aliases: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictionaryStats {
    pub total_words: usize,
    pub rare_words: usize,
    pub alias_pairs: usize,
}

const FALLBACK_COUNTRIES: &[&str] = &[
    "afghanistan", "albania", "algeria", "angola", "argentina", "armenia", "australia",
    "austria", "azerbaijan", "bangladesh", "belgium", "bhutan", "brazil", "burma", "canada",
    "chile", "china", "colombia", "cuba", "denmark", "egypt", "england", "estonia", "ethiopia",
    "fiji", "finland", "france", "germany", "ghana", "greece", "hungary", "iceland", "india",
    "indonesia", "iran", "iraq", "ireland", "israel", "italy", "jamaica", "japan", "jordan",
    "kazakhstan", "kenya", "kyrgyzstan", "laos", "latvia", "lebanon", "libya", "luxembourg",
    "malaysia", "maldives", "mexico", "monaco", "mongolia", "morocco", "myanmar", "nepal",
    "netherlands", "nigeria", "norway", "oman", "pakistan", "panama", "peru", "poland",
    "portugal", "qatar", "romania", "russia", "rwanda", "singapore", "spain", "sudan", "sweden",
    "syria", "taiwan", "tajikistan", "thailand", "togo", "tunisia", "turkey", "uganda",
    "ukraine", "uruguay", "uzbekistan", "vanuatu", "venezuela", "vietnam", "yemen", "zambia",
    "zimbabwe",
];

const FALLBACK_CITIES: &[&str] = &[
    "agra", "ahmedabad", "amsterdam", "ankara", "athens", "bangalore", "bangkok", "barcelona",
    "beijing", "berlin", "bhubaneswar", "bombay", "boston", "cairo", "calcutta", "chennai",
    "chicago", "delhi", "dhaka", "dubai", "edinburgh", "goa", "hyderabad", "istanbul", "jaipur",
    "kabul", "karachi", "kolkata", "lahore", "lisbon", "london", "lucknow", "madras", "madrid",
    "manila", "mumbai", "nagpur", "nairobi", "oslo", "paris", "peking", "prague", "pune",
    "quito", "rome", "seoul", "sydney", "thiruvananthapuram", "tokyo", "toronto", "udaipur",
    "varanasi", "vienna", "visakhapatnam", "warsaw", "yokohama", "zurich",
];

const FALLBACK_RARE: &[&str] = &[
    "azerbaijan", "bhubaneswar", "kazakhstan", "kyrgyzstan", "luxembourg", "tajikistan",
    "thiruvananthapuram", "uzbekistan", "vanuatu", "visakhapatnam",
];

const FALLBACK_ALIASES: &[(&str, &str)] = &[
    ("mumbai", "bombay"),
    ("kolkata", "calcutta"),
    ("chennai", "madras"),
    ("beijing", "peking"),
    ("myanmar", "burma"),
];

fn key(word: &str) -> String {
    word.trim().to_lowercase()
}

impl Dictionary {
    /// Build a dictionary from raw word lists; entries are lowercased and
    /// aliases are made symmetric.
    pub fn from_parts<W, R, A, S>(valid: W, rare: R, aliases: A) -> Self
    where
        W: IntoIterator<Item = S>,
        R: IntoIterator<Item = S>,
        A: IntoIterator<Item = (S, S)>,
        S: AsRef<str>,
    {
        let mut dictionary = Dictionary::default();
        for word in valid {
            dictionary.add_word(word.as_ref(), false);
        }
        for word in rare {
            let word = key(word.as_ref());
            if !word.is_empty() {
                dictionary.rare_words.insert(word);
            }
        }
        for (a, b) in aliases {
            dictionary.add_alias(a.as_ref(), b.as_ref());
        }
        dictionary
    }

    pub fn from_data(data: DictionaryData) -> Self {
        Self::from_parts(data.valid_words, data.rare_words, data.aliases)
    }

    /// Minimal built-in word set used when no dictionary source is available
    pub fn builtin() -> Self {
        Self::from_parts(
            FALLBACK_COUNTRIES.iter().chain(FALLBACK_CITIES.iter()).copied(),
            FALLBACK_RARE.iter().copied(),
            FALLBACK_ALIASES.iter().copied(),
        )
    }

    /// Load the configured dictionary file, degrading to the built-in set
    pub fn load_or_fallback(config: &DictionaryConfig) -> Self {
        match Self::load_from_file(&config.file_path) {
            Ok(dictionary) if !dictionary.is_empty() => {
                let stats = dictionary.stats();
                info!(
                    "loaded dictionary from {}: {} words, {} rare, {} alias pairs",
                    config.file_path, stats.total_words, stats.rare_words, stats.alias_pairs
                );
                dictionary
            }
            Ok(_) => {
                warn!("dictionary {} is empty, using built-in word set", config.file_path);
                Self::builtin()
            }
            Err(e) => {
                warn!("failed to load dictionary {}: {}, using built-in word set", config.file_path, e);
                Self::builtin()
            }
        }
    }

    /// Load a dictionary from a JSON file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read dictionary file {}", path.display()))?;

        let data: DictionaryData = serde_json::from_str(&content)
            .with_context(|| format!("malformed dictionary file {}", path.display()))?;

        Ok(Self::from_data(data))
    }

    /// Save the dictionary to a JSON file, sorted for stable diffs
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content =
            serde_json::to_string_pretty(&self.to_data()).context("failed to serialize dictionary")?;

        std::fs::write(path, content)
            .with_context(|| format!("failed to write dictionary file {}", path.display()))?;

        Ok(())
    }

    pub fn to_data(&self) -> DictionaryData {
        DictionaryData {
            valid_words: self.valid_words.iter().cloned().collect(),
            rare_words: self.rare_words.iter().cloned().collect(),
            aliases: self
                .aliases
                .iter()
                .map(|(a, b)| (a.clone(), b.clone()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.valid_words.is_empty()
    }

    pub fn contains(&self, word: &str) -> bool {
        self.valid_words.contains(word)
    }

    pub fn is_rare(&self, word: &str) -> bool {
        self.rare_words.contains(word)
    }

    /// The alternate spelling of `word`, if it has one
    pub fn alias_of(&self, word: &str) -> Option<&str> {
        self.aliases.get(word).map(String::as_str)
    }

    pub fn add_word(&mut self, word: &str, rare: bool) {
        let word = key(word);
        if word.is_empty() {
            return;
        }
        if rare {
            self.rare_words.insert(word.clone());
        }
        self.valid_words.insert(word);
    }

    /// Register `a` and `b` as interchangeable spellings (one hop, both ways)
    pub fn add_alias(&mut self, a: &str, b: &str) {
        let (a, b) = (key(a), key(b));
        if a.is_empty() || b.is_empty() || a == b {
            return;
        }
        self.aliases.insert(a.clone(), b.clone());
        self.aliases.insert(b, a);
    }

    /// Remove a word together with its rare flag and alias links
    pub fn remove_word(&mut self, word: &str) -> bool {
        let word = key(word);
        let removed = self.valid_words.remove(&word);
        self.rare_words.remove(&word);
        if let Some(other) = self.aliases.remove(&word) {
            if self.aliases.get(&other) == Some(&word) {
                self.aliases.remove(&other);
            }
        }
        removed
    }

    /// Add place names, skipping anything that could never be played.
    /// Returns the number of newly added words.
    pub fn import_names<I>(&mut self, names: I, rare_over: usize) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        let mut added = 0;
        for name in names {
            let name = key(&name);
            if name.chars().count() < 2 || !name.chars().all(is_word_char) {
                continue;
            }
            let rare = name.chars().count() > rare_over;
            if !self.valid_words.contains(&name) {
                added += 1;
            }
            self.add_word(&name, rare);
        }
        added
    }

    pub fn stats(&self) -> DictionaryStats {
        DictionaryStats {
            total_words: self.valid_words.len(),
            rare_words: self.rare_words.len(),
            alias_pairs: self.aliases.len() / 2,
        }
    }

    /// Integrity report; an empty list means the dictionary is consistent
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        let mut rare: Vec<_> = self
            .rare_words
            .iter()
            .filter(|w| !self.valid_words.contains(*w))
            .collect();
        rare.sort();
        for word in rare {
            errors.push(format!("rare word '{}' is not a valid word", word));
        }

        let mut aliases: Vec<_> = self.aliases.iter().collect();
        aliases.sort();
        for (from, to) in aliases {
            if !self.valid_words.contains(from) && !self.valid_words.contains(to) {
                errors.push(format!("alias '{}' -> '{}' has no valid spelling", from, to));
            }
            if self.aliases.get(to) != Some(from) {
                errors.push(format!("alias '{}' -> '{}' is not symmetric", from, to));
            }
        }

        errors
    }
}

/// Parse a `[{"name": ...}]` place list
pub fn parse_places(json: &str) -> Result<Vec<String>> {
    let places: Vec<NamedPlace> =
        serde_json::from_str(json).context("malformed place list")?;
    Ok(places.into_iter().map(|p| p.name).collect())
}

/// Download a `[{"name": ...}]` place list
pub async fn fetch_places(raw_url: &str) -> Result<Vec<String>> {
    let url = Url::parse(raw_url)
        .map_err(|e| crate::Error::Dictionary(format!("invalid url {}: {}", raw_url, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(crate::Error::Dictionary(format!(
            "unsupported url scheme: {}",
            url.scheme()
        )));
    }

    let places: Vec<NamedPlace> = reqwest::get(url.clone())
        .await
        .with_context(|| format!("failed to download {}", url))?
        .error_for_status()
        .with_context(|| format!("bad response from {}", url))?
        .json()
        .await
        .with_context(|| format!("malformed place list from {}", url))?;

    Ok(places.into_iter().map(|p| p.name).collect())
}
