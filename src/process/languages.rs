//! Language codes and stopwords.
//!
//! Language indices stored in messages point into [`LANGUAGE_CODES`], the
//! label set of the fastText `lid.176` model, with index 0 reserved for text
//! whose language is unknown.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Index of the "unknown language" entry.
pub const UNKNOWN_LANGUAGE: u8 = 0;

// `lid.176` labels, sorted
#[rustfmt::skip]
pub const LANGUAGE_CODES: [&str; 177] = [
    "unknown",
    "af","als","am","an","ar","arz","as","ast","av","az","azb","ba","bar","bcl","be","bg","bh","bn","bo",
    "bpy","br","bs","bxr","ca","cbk","ce","ceb","ckb","co","cs","cv","cy","da","de","diq","dsb","dty","dv",
    "el","eml","en","eo","es","et","eu","fa","fi","fr","frr","fy","ga","gd","gl","gn","gom","gu","gv","he",
    "hi","hif","hr","hsb","ht","hu","hy","ia","id","ie","ilo","io","is","it","ja","jbo","jv","ka","kk","km",
    "kn","ko","krc","ku","kv","kw","ky","la","lb","lez","li","lmo","lo","lrc","lt","lv","mai","mg","mhr",
    "min","mk","ml","mn","mr","mrj","ms","mt","mwl","my","myv","mzn","nah","nap","nds","ne","new","nl","nn",
    "no","oc","or","os","pa","pam","pfl","pl","pms","pnb","ps","pt","qu","rm","ro","ru","rue","sa","sah",
    "sc","scn","sco","sd","sh","si","sk","sl","so","sq","sr","su","sv","sw","ta","te","tg","th","tk","tl",
    "tr","tt","tyv","ug","uk","ur","uz","vec","vep","vi","vls","vo","wa","war","wuu","xal","xmf","yi","yo",
    "yue","zh",
];

/// Returns the index of an ISO 639 code, `None` if it is not in the table.
pub fn language_index(code: &str) -> Option<u8> {
    LANGUAGE_CODES
        .iter()
        .position(|c| c.eq_ignore_ascii_case(code))
        .map(|i| i as u8)
}

pub fn language_code(index: u8) -> Option<&'static str> {
    LANGUAGE_CODES.get(index as usize).copied()
}

/// Picks the languages worth keeping from per-language message counts.
///
/// `counts[i]` is the number of messages detected as `LANGUAGE_CODES[i]`.
/// Returns `(index, share)` for every language whose share of all tagged
/// messages is at least `min_share`, sorted by share, largest first.
pub fn detect_languages(counts: &[u64], min_share: f64) -> Vec<(u8, f64)> {
    let total: u64 = counts.iter().sum();
    if total == 0 {
        return Vec::new();
    }
    let mut kept: Vec<(u8, f64)> = counts
        .iter()
        .enumerate()
        .filter(|&(_, &count)| count > 0)
        .map(|(i, &count)| (i as u8, count as f64 / total as f64))
        .filter(|&(_, share)| share >= min_share)
        .collect();
    kept.sort_by(|a, b| b.1.total_cmp(&a.1));
    kept
}

/// Stopword lists per language.
///
/// Words are compared lowercase.
///
/// # Example
///
/// ```rust
/// use chatdb::process::Stopwords;
///
/// let stopwords = Stopwords::from_json_str(r#"{"en": ["The", "and"], "es": ["el"]}"#)?;
/// assert!(stopwords.is_stopword("the", &["en"]));
/// assert!(!stopwords.is_stopword("the", &["es"]));
/// assert!(stopwords.is_stopword("EL", &["en", "es"]));
/// # Ok::<(), chatdb::ChatDbError>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Stopwords {
    by_lang: HashMap<String, HashSet<String>>,
}

impl Stopwords {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the stopwords-iso layout, `{ "<lang>": ["word", ...] }`.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: HashMap<String, Vec<String>> = serde_json::from_str(json)?;
        let mut stopwords = Self::new();
        for (lang, words) in raw {
            stopwords.extend(&lang, words);
        }
        Ok(stopwords)
    }

    /// Adds `words` to the list of `lang`.
    pub fn extend<I, S>(&mut self, lang: &str, words: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set = self.by_lang.entry(lang.to_lowercase()).or_default();
        set.extend(words.into_iter().map(|w| w.as_ref().to_lowercase()));
    }

    /// Whether `word` is a stopword in any of `langs`.
    pub fn is_stopword(&self, word: &str, langs: &[&str]) -> bool {
        let word = word.to_lowercase();
        langs
            .iter()
            .filter_map(|lang| self.by_lang.get(*lang))
            .any(|set| set.contains(&word))
    }

    pub fn num_languages(&self) -> usize {
        self.by_lang.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_table() {
        assert_eq!(language_code(UNKNOWN_LANGUAGE), Some("unknown"));
        assert_eq!(language_index("en"), Some(41));
        assert_eq!(language_code(41), Some("en"));
        assert_eq!(language_index("EN"), Some(41));
        assert_eq!(language_index("tlh"), None);
        assert_eq!(language_code(200), None);
        // must fit TextStats::lang_index
        assert!(LANGUAGE_CODES.len() <= 256);
    }

    #[test]
    fn test_detect_languages() {
        let mut counts = vec![0u64; LANGUAGE_CODES.len()];
        counts[41] = 90; // en
        counts[43] = 8; // es
        counts[48] = 2; // fr
        let langs = detect_languages(&counts, 0.03);
        assert_eq!(langs.len(), 2);
        assert_eq!(langs[0].0, 41);
        assert!((langs[0].1 - 0.9).abs() < 1e-9);
        assert_eq!(langs[1].0, 43);

        assert!(detect_languages(&[0, 0], 0.03).is_empty());
    }

    #[test]
    fn test_stopwords_json() {
        let sw = Stopwords::from_json_str(r#"{"EN": ["I", "you"]}"#).unwrap();
        assert_eq!(sw.num_languages(), 1);
        assert!(sw.is_stopword("You", &["en"]));
        assert!(!sw.is_stopword("they", &["en"]));
        assert!(!sw.is_stopword("you", &[]));

        let err = Stopwords::from_json_str("[1, 2]").unwrap_err();
        assert!(err.is_structural());
    }
}
