use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use super::model::OnnxError;

/// Optional `config.json` shipped next to the graph.
#[derive(Debug, Default, Deserialize)]
pub struct ModelConfig {
    pub sample_rate: Option<u32>,
    /// Single-character strings mapped to token IDs.
    pub vocab: Option<HashMap<String, i64>>,
}

pub fn load_model_config(config_path: &Path) -> Result<ModelConfig, OnnxError> {
    let content = std::fs::read_to_string(config_path)?;
    serde_json::from_str(&content)
        .map_err(|e| OnnxError::Config(format!("Failed to parse JSON: {e}")))
}

/// Convert the `vocab` table of a config into a char map.
pub fn char_vocab(vocab: &HashMap<String, i64>) -> Result<HashMap<char, i64>, OnnxError> {
    let mut map = HashMap::with_capacity(vocab.len());
    for (k, &id) in vocab {
        let mut chars = k.chars();
        let (Some(ch), None) = (chars.next(), chars.next()) else {
            return Err(OnnxError::Config(format!(
                "vocab keys must be single characters, got {k:?}"
            )));
        };
        map.insert(ch, id);
    }
    Ok(map)
}

/// Fallback character vocabulary: punctuation, space and lowercase letters.
///
/// Only used when config.json carries no `vocab`.
pub fn hardcoded_vocab() -> HashMap<char, i64> {
    let punctuation: &[(char, i64)] = &[
        (';', 1),
        (':', 2),
        (',', 3),
        ('.', 4),
        ('!', 5),
        ('?', 6),
        ('\'', 7),
        ('-', 8),
        (' ', 16),
    ];
    punctuation
        .iter()
        .copied()
        .chain(('a'..='z').zip(43..))
        .collect()
}

/// Map text to token IDs. Text is lowercased; characters missing from the
/// vocab are dropped.
pub fn tokenize(text: &str, vocab: &HashMap<char, i64>) -> Vec<i64> {
    text.chars()
        .flat_map(char::to_lowercase)
        .filter_map(|ch| vocab.get(&ch).copied())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{char_vocab, hardcoded_vocab, load_model_config, tokenize};
    use std::collections::HashMap;

    #[test]
    fn fallback_vocab_covers_letters_and_pauses() {
        let vocab = hardcoded_vocab();
        assert_eq!(vocab[&'a'], 43);
        assert_eq!(vocab[&'z'], 68);
        assert_eq!(tokenize("Hi, you!", &vocab), vec![50, 51, 3, 16, 67, 57, 63, 5]);
    }

    #[test]
    fn unknown_characters_are_dropped() {
        let vocab = hardcoded_vocab();
        assert_eq!(tokenize("ok 🙂", &vocab), vec![57, 53, 16]);
    }

    #[test]
    fn config_vocab_requires_single_characters() {
        let mut raw = HashMap::new();
        raw.insert("a".to_string(), 1);
        assert_eq!(char_vocab(&raw).unwrap()[&'a'], 1);

        raw.insert("ab".to_string(), 2);
        assert!(char_vocab(&raw).is_err());
    }

    #[test]
    fn reads_config_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "sample_rate": 22050, "vocab": { "x": 9 } }"#).unwrap();

        let config = load_model_config(&path).unwrap();
        assert_eq!(config.sample_rate, Some(22050));
        assert_eq!(config.vocab.unwrap()["x"], 9);
    }
}
