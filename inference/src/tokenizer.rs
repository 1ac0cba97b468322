use crate::encoder::{EOS_ID, PAD_ID};
use crate::{InferenceError, LoadError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

pub const UNK_TOKEN: &str = "<unk>";
pub const EOS_TOKEN: &str = "<eos>";
pub const PAD_TOKEN: &str = "<pad>";

/// On-disk vocabulary layout: the index-to-string table built at training time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocabularyFile {
    pub itos: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_index: Option<u32>,
}

/// Fixed token-to-id table with reserved unknown, end-of-sequence and padding ids.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    stoi: HashMap<String, u32>,
    itos: Vec<String>,
    unk_id: u32,
}

impl Vocabulary {
    pub fn from_file(path: &Path) -> std::result::Result<Self, LoadError> {
        let display = path.display().to_string();
        tracing::info!("Loading vocabulary from: {:?}", path);

        if !path.exists() {
            return Err(LoadError::VocabularyNotFound { path: display });
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| LoadError::vocabulary_format(&display, e))?;
        let file: VocabularyFile = serde_json::from_str(&content)
            .map_err(|e| LoadError::vocabulary_format(&display, e))?;

        let vocab = Self::build(file, &display)?;
        tracing::info!("Loaded vocabulary with {} tokens", vocab.len());
        Ok(vocab)
    }

    pub fn from_tokens(tokens: Vec<String>) -> std::result::Result<Self, LoadError> {
        Self::build(
            VocabularyFile {
                itos: tokens,
                default_index: None,
            },
            "<in-memory>",
        )
    }

    fn build(file: VocabularyFile, origin: &str) -> std::result::Result<Self, LoadError> {
        let mut stoi = HashMap::with_capacity(file.itos.len());
        for (idx, token) in file.itos.iter().enumerate() {
            let id = u32::try_from(idx)
                .map_err(|_| LoadError::vocabulary_format(origin, "vocabulary exceeds u32 ids"))?;
            if stoi.insert(token.clone(), id).is_some() {
                return Err(LoadError::vocabulary_format(
                    origin,
                    format!("duplicate token '{token}' at index {idx}"),
                ));
            }
        }

        // The model was trained with these sentinels at fixed positions.
        for (token, expected) in [(EOS_TOKEN, EOS_ID), (PAD_TOKEN, PAD_ID)] {
            match stoi.get(token) {
                Some(&id) if id == expected => {}
                Some(&id) => {
                    return Err(LoadError::vocabulary_format(
                        origin,
                        format!("'{token}' must have id {expected}, found {id}"),
                    ))
                }
                None => {
                    return Err(LoadError::vocabulary_format(
                        origin,
                        format!("missing reserved token '{token}'"),
                    ))
                }
            }
        }

        let unk_id = match (stoi.get(UNK_TOKEN), file.default_index) {
            (Some(&id), _) => id,
            (None, Some(id)) if (id as usize) < file.itos.len() => id,
            (None, Some(id)) => {
                return Err(LoadError::vocabulary_format(
                    origin,
                    format!("default_index {id} is out of range"),
                ))
            }
            (None, None) => {
                return Err(LoadError::vocabulary_format(
                    origin,
                    format!("missing '{UNK_TOKEN}' and no default_index"),
                ))
            }
        };

        Ok(Self {
            stoi,
            itos: file.itos,
            unk_id,
        })
    }

    pub fn lookup(&self, token: &str) -> u32 {
        self.stoi.get(token).copied().unwrap_or(self.unk_id)
    }

    pub fn len(&self) -> usize {
        self.itos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.itos.is_empty()
    }

    pub fn unk_id(&self) -> u32 {
        self.unk_id
    }

    pub fn eos_id(&self) -> u32 {
        EOS_ID
    }

    pub fn pad_id(&self) -> u32 {
        PAD_ID
    }

    pub fn to_file(&self) -> VocabularyFile {
        VocabularyFile {
            itos: self.itos.clone(),
            default_index: Some(self.unk_id),
        }
    }
}

/// "basic_english" word splitter plus vocabulary lookup.
pub struct Tokenizer {
    vocab: Vocabulary,
    rules: Vec<(Regex, &'static str)>,
}

impl Tokenizer {
    pub fn new(vocab: Vocabulary) -> Result<Self> {
        const RULES: [(&str, &str); 12] = [
            (r"'", " '  "),
            (r#"""#, ""),
            (r"\.", " . "),
            (r"<br />", " "),
            (r",", " , "),
            (r"\(", " ( "),
            (r"\)", " ) "),
            (r"!", " ! "),
            (r"\?", " ? "),
            (r";", " "),
            (r":", " "),
            (r"\s+", " "),
        ];

        let rules = RULES
            .iter()
            .map(|&(pattern, replacement)| {
                Regex::new(pattern)
                    .map(|re| (re, replacement))
                    .map_err(|e| InferenceError::Tokenization(format!("Invalid rule '{pattern}': {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { vocab, rules })
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    /// Lowercases, isolates punctuation and splits on whitespace.
    pub fn basic_english(&self, text: &str) -> Vec<String> {
        let mut line = text.to_lowercase();
        for (re, replacement) in &self.rules {
            line = re.replace_all(&line, *replacement).into_owned();
        }
        line.split_whitespace().map(str::to_string).collect()
    }

    /// Never fails: words outside the vocabulary map to the unknown id.
    pub fn tokenize_and_map(&self, text: &str) -> Vec<u32> {
        self.basic_english(text)
            .iter()
            .map(|token| self.vocab.lookup(token))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab(words: &[&str]) -> Vocabulary {
        let mut tokens = vec![UNK_TOKEN, EOS_TOKEN, PAD_TOKEN];
        tokens.extend_from_slice(words);
        Vocabulary::from_tokens(tokens.into_iter().map(String::from).collect()).unwrap()
    }

    #[test]
    fn test_basic_english_splits_punctuation() {
        let tokenizer = Tokenizer::new(vocab(&[])).unwrap();
        assert_eq!(
            tokenizer.basic_english("I love this product! It's amazing!"),
            vec!["i", "love", "this", "product", "!", "it", "'", "s", "amazing", "!"]
        );
        assert_eq!(
            tokenizer.basic_english("Well,(really)? \"yes\": fine;<br />done."),
            vec!["well", ",", "(", "really", ")", "?", "yes", "fine", "done", "."]
        );
    }

    #[test]
    fn test_empty_and_blank_text_yield_no_tokens() {
        let tokenizer = Tokenizer::new(vocab(&["hello"])).unwrap();
        assert!(tokenizer.tokenize_and_map("").is_empty());
        assert!(tokenizer.tokenize_and_map(" \t\n ").is_empty());
    }

    #[test]
    fn test_unknown_words_map_to_unk() {
        let tokenizer = Tokenizer::new(vocab(&["hello", "world"])).unwrap();
        assert_eq!(tokenizer.tokenize_and_map("Hello there WORLD"), vec![3, 0, 4]);
    }

    #[test]
    fn test_vocabulary_requires_fixed_sentinels() {
        let swapped = vec![UNK_TOKEN, PAD_TOKEN, EOS_TOKEN]
            .into_iter()
            .map(String::from)
            .collect();
        let err = Vocabulary::from_tokens(swapped).unwrap_err();
        assert!(matches!(err, LoadError::VocabularyFormat { .. }));
        assert!(err.to_string().contains("<eos>"));
    }

    #[test]
    fn test_vocabulary_rejects_duplicates() {
        let tokens = vec![UNK_TOKEN, EOS_TOKEN, PAD_TOKEN, "a", "a"]
            .into_iter()
            .map(String::from)
            .collect();
        assert!(Vocabulary::from_tokens(tokens).is_err());
    }

    #[test]
    fn test_default_index_stands_in_for_missing_unk() {
        let file = VocabularyFile {
            itos: vec!["<oov>", EOS_TOKEN, PAD_TOKEN, "x"]
                .into_iter()
                .map(String::from)
                .collect(),
            default_index: Some(0),
        };
        let vocab = Vocabulary::build(file, "test").unwrap();
        assert_eq!(vocab.lookup("nope"), 0);
        assert_eq!(vocab.lookup("x"), 3);
    }
}
