// ============================================================
// Layer 6 — Embedding Store
// ============================================================
// Loads pretrained word vectors from GloVe-style text files:
// one word per line followed by its whitespace-separated
// components. The table reserves id 0 for padding and id 1 for
// unknown words (both zero vectors); real words start at id 2.

use anyhow::{bail, Context, Result};
use std::{
    collections::HashMap,
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use burn::prelude::*;

use crate::domain::traits::EmbeddingSource;

pub const PADDING_ID: usize = 0;
pub const UNKNOWN_ID: usize = 1;
const RESERVED_IDS: usize = 2;

/// Pretrained word vectors plus their vocabulary.
#[derive(Debug, Clone)]
pub struct EmbeddingTable {
    dim: usize,
    ids: HashMap<String, usize>,
    /// Row-major [vocab_size, dim], reserved rows included as zeros
    vectors: Vec<f32>,
}

impl EmbeddingTable {
    /// Load a GloVe-style text file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("cannot open embedding file '{}'", path.display()))?;
        let table = Self::from_reader(BufReader::new(file))?;
        tracing::info!(
            "Loaded {} word vectors of dimension {} from '{}'",
            table.vocab_size() - RESERVED_IDS,
            table.dim(),
            path.display(),
        );
        Ok(table)
    }

    /// Parse `word v1 v2 ... vD` lines. Every line must agree on D;
    /// duplicate words keep their first vector.
    pub fn from_reader(reader: impl BufRead) -> Result<Self> {
        let mut ids = HashMap::new();
        let mut vectors: Vec<f32> = Vec::new();
        let mut dim = 0usize;

        for (line_no, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("embedding line {}", line_no + 1))?;
            if line.trim().is_empty() {
                continue;
            }

            let mut parts = line.split_whitespace();
            let word = parts
                .next()
                .with_context(|| format!("embedding line {} has no word", line_no + 1))?;
            let values = parts
                .map(|v| {
                    v.parse::<f32>().with_context(|| {
                        format!("bad vector component '{v}' on line {}", line_no + 1)
                    })
                })
                .collect::<Result<Vec<f32>>>()?;

            if values.is_empty() {
                bail!("embedding line {} has a word but no vector", line_no + 1);
            }
            if dim == 0 {
                dim = values.len();
                // Reserved zero rows for padding and unknown
                vectors.resize(RESERVED_IDS * dim, 0.0);
            } else if values.len() != dim {
                bail!(
                    "embedding line {} has {} components, expected {dim}",
                    line_no + 1,
                    values.len(),
                );
            }

            if ids.contains_key(word) {
                continue;
            }
            ids.insert(word.to_string(), RESERVED_IDS + ids.len());
            vectors.extend_from_slice(&values);
        }

        if dim == 0 {
            bail!("embedding file contains no vectors");
        }
        Ok(Self { dim, ids, vectors })
    }

    /// The full table as a [vocab_size, dim] tensor for the word
    /// embedding lookup.
    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2> {
        Tensor::<B, 1>::from_floats(self.vectors.as_slice(), device)
            .reshape([self.vocab_size(), self.dim])
    }

    /// Encode tokens into word ids, unknown words included.
    pub fn encode(&self, tokens: &[String]) -> Vec<u32> {
        tokens
            .iter()
            .map(|t| self.id_or_unknown(t) as u32)
            .collect()
    }

    /// Iterate over the known words (for building a char vocabulary).
    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.ids.keys().map(String::as_str)
    }
}

impl EmbeddingSource for EmbeddingTable {
    fn dim(&self) -> usize {
        self.dim
    }

    fn vocab_size(&self) -> usize {
        RESERVED_IDS + self.ids.len()
    }

    fn id_of(&self, word: &str) -> Option<usize> {
        self.ids.get(word).copied()
    }

    fn id_or_unknown(&self, word: &str) -> usize {
        self.id_of(word).unwrap_or(UNKNOWN_ID)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    type TB = burn::backend::NdArray;

    const SAMPLE: &str = "\
the 0.1 0.2 0.3
cat 0.4 0.5 0.6
sat 0.7 0.8 0.9
";

    #[test]
    fn test_parses_words_and_vectors() {
        let table = EmbeddingTable::from_reader(SAMPLE.as_bytes()).unwrap();

        assert_eq!(table.dim(), 3);
        // Three words plus padding and unknown
        assert_eq!(table.vocab_size(), 5);
        assert_eq!(table.id_of("the"), Some(2));
        assert_eq!(table.id_of("dog"), None);
        assert_eq!(table.id_or_unknown("dog"), UNKNOWN_ID);
    }

    #[test]
    fn test_reserved_rows_are_zero() {
        let table = EmbeddingTable::from_reader(SAMPLE.as_bytes()).unwrap();
        let tensor = table.to_tensor::<TB>(&Default::default());

        assert_eq!(tensor.dims(), [5, 3]);
        let values = tensor.into_data().to_vec::<f32>().unwrap();
        assert_eq!(&values[0..6], &[0.0; 6]);
        assert!((values[6] - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_encode_maps_unknown_words() {
        let table = EmbeddingTable::from_reader(SAMPLE.as_bytes()).unwrap();
        let ids = table.encode(&["the".into(), "dog".into(), "sat".into()]);
        assert_eq!(ids, vec![2, UNKNOWN_ID as u32, 4]);
    }

    #[test]
    fn test_rejects_ragged_dimensions() {
        let broken = "a 0.1 0.2\nb 0.3\n";
        assert!(EmbeddingTable::from_reader(broken.as_bytes()).is_err());
    }

    #[test]
    fn test_rejects_empty_file() {
        assert!(EmbeddingTable::from_reader("".as_bytes()).is_err());
    }
}
