use lazy_static::lazy_static;
use ndarray::Array2;
use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeSet;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref TOKEN_PATTERN: Regex = Regex::new(r"\b\w\w+\b").unwrap();

    /// Common English words that carry no topic signal.
    static ref STOP_WORDS: FxHashSet<&'static str> = [
        "a", "about", "above", "across", "after", "afterwards", "again", "against",
        "all", "almost", "alone", "along", "already", "also", "although", "always",
        "am", "among", "amongst", "amoungst", "amount", "an", "and", "another",
        "any", "anyhow", "anyone", "anything", "anyway", "anywhere", "are",
        "around", "as", "at", "back", "be", "became", "because", "become",
        "becomes", "becoming", "been", "before", "beforehand", "behind", "being",
        "below", "beside", "besides", "between", "beyond", "bill", "both",
        "bottom", "but", "by", "call", "can", "cannot", "cant", "co", "con",
        "could", "couldnt", "cry", "de", "describe", "detail", "do", "done",
        "down", "due", "during", "each", "eg", "eight", "either", "eleven", "else",
        "elsewhere", "empty", "enough", "etc", "even", "ever", "every", "everyone",
        "everything", "everywhere", "except", "few", "fifteen", "fifty", "fill",
        "find", "fire", "first", "five", "for", "former", "formerly", "forty",
        "found", "four", "from", "front", "full", "further", "get", "give", "go",
        "had", "has", "hasnt", "have", "he", "hence", "her", "here", "hereafter",
        "hereby", "herein", "hereupon", "hers", "herself", "him", "himself", "his",
        "how", "however", "hundred", "i", "ie", "if", "in", "inc", "indeed",
        "interest", "into", "is", "it", "its", "itself", "keep", "last", "latter",
        "latterly", "least", "less", "ltd", "made", "many", "may", "me",
        "meanwhile", "might", "mill", "mine", "more", "moreover", "most", "mostly",
        "move", "much", "must", "my", "myself", "name", "namely", "neither",
        "never", "nevertheless", "next", "nine", "no", "nobody", "none", "noone",
        "nor", "not", "nothing", "now", "nowhere", "of", "off", "often", "on",
        "once", "one", "only", "onto", "or", "other", "others", "otherwise", "our",
        "ours", "ourselves", "out", "over", "own", "part", "per", "perhaps",
        "please", "put", "rather", "re", "same", "see", "seem", "seemed",
        "seeming", "seems", "serious", "several", "she", "should", "show", "side",
        "since", "sincere", "six", "sixty", "so", "some", "somehow", "someone",
        "something", "sometime", "sometimes", "somewhere", "still", "such",
        "system", "take", "ten", "than", "that", "the", "their", "them",
        "themselves", "then", "thence", "there", "thereafter", "thereby",
        "therefore", "therein", "thereupon", "these", "they", "thick", "thin",
        "third", "this", "those", "though", "three", "through", "throughout",
        "thru", "thus", "to", "together", "too", "top", "toward", "towards",
        "twelve", "twenty", "two", "un", "under", "until", "up", "upon", "us",
        "very", "via", "was", "we", "well", "were", "what", "whatever", "when",
        "whence", "whenever", "where", "whereafter", "whereas", "whereby",
        "wherein", "whereupon", "wherever", "whether", "which", "while", "whither",
        "who", "whoever", "whole", "whom", "whose", "why", "will", "with",
        "within", "without", "would", "yet", "you", "your", "yours", "yourself",
        "yourselves",
    ]
    .into_iter()
    .collect();
}

/// TF-IDF weighting fitted on one corpus.
///
/// Terms are lowercased word runs of two or more characters, stop words
/// removed. Weights are raw counts times the smoothed idf
/// `ln((1 + n) / (1 + df)) + 1`, and every row is scaled to unit length.
#[derive(Debug, Clone, Default)]
pub struct TfidfVectorizer {
    vocabulary: Vec<String>,
    idf: Vec<f64>,
}

impl TfidfVectorizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sorted vocabulary; column `i` of the fitted matrix is `vocabulary()[i]`.
    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    #[cfg(test)]
    pub fn idf(&self) -> &[f64] {
        &self.idf
    }

    /// Learns the vocabulary and idf weights from `documents` and returns
    /// one row per document.
    pub fn fit_transform<S: AsRef<str>>(&mut self, documents: &[S]) -> Array2<f64> {
        let tokenized: Vec<Vec<String>> = documents
            .iter()
            .map(|doc| tokenize(doc.as_ref()))
            .collect();

        let terms: BTreeSet<&str> = tokenized
            .iter()
            .flat_map(|tokens| tokens.iter().map(String::as_str))
            .collect();
        self.vocabulary = terms.into_iter().map(str::to_string).collect();

        let index: FxHashMap<&str, usize> = self
            .vocabulary
            .iter()
            .enumerate()
            .map(|(i, term)| (term.as_str(), i))
            .collect();

        let mut counts = Array2::<f64>::zeros((documents.len(), self.vocabulary.len()));
        let mut doc_freq = vec![0usize; self.vocabulary.len()];
        for (row, tokens) in tokenized.iter().enumerate() {
            for token in tokens {
                let col = index[token.as_str()];
                if counts[[row, col]] == 0.0 {
                    doc_freq[col] += 1;
                }
                counts[[row, col]] += 1.0;
            }
        }

        let n = documents.len() as f64;
        self.idf = doc_freq
            .iter()
            .map(|&df| ((1.0 + n) / (1.0 + df as f64)).ln() + 1.0)
            .collect();

        for mut row in counts.rows_mut() {
            for (value, idf) in row.iter_mut().zip(&self.idf) {
                *value *= idf;
            }
            let norm = row.dot(&row).sqrt();
            if norm > 0.0 {
                row.mapv_inplace(|v| v / norm);
            }
        }

        counts
    }
}

fn tokenize(text: &str) -> Vec<String> {
    let text = text.nfc().collect::<String>().to_lowercase();
    TOKEN_PATTERN
        .find_iter(&text)
        .map(|m| m.as_str())
        .filter(|token| !STOP_WORDS.contains(token))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_drops_stop_words_and_short_tokens() {
        assert_eq!(
            tokenize("Hello there, I need a Rust tutorial!"),
            vec!["hello", "need", "rust", "tutorial"]
        );
    }

    #[test]
    fn test_vocabulary_sorted_and_idf_smoothed() {
        let mut vectorizer = TfidfVectorizer::new();
        let matrix = vectorizer.fit_transform(&["hello world", "hello there", "goodbye"]);

        assert_eq!(vectorizer.vocabulary(), ["goodbye", "hello", "world"]);
        assert_eq!(matrix.dim(), (3, 3));

        let idf = vectorizer.idf();
        assert!((idf[1] - ((4.0f64 / 3.0).ln() + 1.0)).abs() < 1e-12);
        assert!((idf[2] - (2.0f64.ln() + 1.0)).abs() < 1e-12);

        // "there" is a stop word, leaving "hello" alone in the second row.
        assert_eq!(matrix[[1, 1]], 1.0);
        assert_eq!(matrix[[2, 0]], 1.0);
    }

    #[test]
    fn test_rows_unit_length() {
        let mut vectorizer = TfidfVectorizer::new();
        let matrix = vectorizer.fit_transform(&["rust borrow checker", "rust rust async runtime"]);
        for row in matrix.rows() {
            assert!((row.dot(&row) - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_all_stop_words_gives_zero_row() {
        let mut vectorizer = TfidfVectorizer::new();
        let matrix = vectorizer.fit_transform(&["what is this", "compile errors"]);
        assert!(matrix.row(0).iter().all(|v| *v == 0.0));
        assert_eq!(vectorizer.vocabulary(), ["compile", "errors"]);
    }
}
