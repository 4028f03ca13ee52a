//! Deterministic hashed embedding
//!
//! Known limitation: this is NOT a semantic embedding. Each whitespace token
//! is hashed into one slot of a fixed-length vector, so identical text gives
//! identical vectors and texts sharing exact tokens score as "similar", but
//! synonyms, word order and meaning are invisible to it. Relevance scores
//! computed against these vectors must not be presented as semantic
//! similarity. Configure `ollama` or `openai` for real nearest-neighbour search.

/// Vector length used when no dimension is configured
pub const DEFAULT_DIMENSION: usize = 384;

/// Amount added to a slot per token occurrence, wrapping at 1.0
const SLOT_INCREMENT: f32 = 0.1;

#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        for token in text.to_lowercase().split_whitespace() {
            let slot = token_hash(token) as usize % self.dimension;
            vector[slot] = (vector[slot] + SLOT_INCREMENT) % 1.0;
        }

        vector
    }
}

/// Rolling `h * 31 + c` over the token's code points, modulo 2^32
fn token_hash(token: &str) -> u32 {
    token
        .chars()
        .fold(0u32, |hash, c| hash.wrapping_mul(31).wrapping_add(c as u32))
}
