//! Embedding capability and the built-in Harmonic Token Projection model.
//!
//! The gateway only sees the [`Embedder`] and [`ModelLoader`] traits, so any
//! model can sit behind it. The default model is HTP:
//! "Harmonic Token Projection: A Vocabulary-Free, Training-Free,
//!  Deterministic, and Reversible Embedding Methodology"
//! https://arxiv.org/html/2511.20665
//!
//! Key properties:
//! - No neural network required
//! - Deterministic (same input → same output)
//! - Unicode-based (multilingual support)

use std::f64::consts::PI;
use std::sync::Arc;

/// Embedding dimension (2 * number of coprime moduli)
/// Using 192 moduli → 384 dimensions (matching all-MiniLM-L6-v2)
pub const EMBEDDING_DIM: usize = 384;

/// Number of coprime moduli for harmonic projection
const NUM_MODULI: usize = EMBEDDING_DIM / 2;

/// Maximum token length (Unicode code points)
const MAX_TOKEN_LENGTH: usize = 64;

/// Coprime moduli for modular decomposition
/// Using first NUM_MODULI primes for guaranteed coprimality
static COPRIME_MODULI: &[u64] = &[
    2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71,
    73, 79, 83, 89, 97, 101, 103, 107, 109, 113, 127, 131, 137, 139, 149, 151,
    157, 163, 167, 173, 179, 181, 191, 193, 197, 199, 211, 223, 227, 229, 233,
    239, 241, 251, 257, 263, 269, 271, 277, 281, 283, 293, 307, 311, 313, 317,
    331, 337, 347, 349, 353, 359, 367, 373, 379, 383, 389, 397, 401, 409, 419,
    421, 431, 433, 439, 443, 449, 457, 461, 463, 467, 479, 487, 491, 499, 503,
    509, 521, 523, 541, 547, 557, 563, 569, 571, 577, 587, 593, 599, 601, 607,
    613, 617, 619, 631, 641, 643, 647, 653, 659, 661, 673, 677, 683, 691, 701,
    709, 719, 727, 733, 739, 743, 751, 757, 761, 769, 773, 787, 797, 809, 811,
    821, 823, 827, 829, 839, 853, 857, 859, 863, 877, 881, 883, 887, 907, 911,
    919, 929, 937, 941, 947, 953, 967, 971, 977, 983, 991, 997, 1009, 1013,
    1019, 1021, 1031, 1033, 1039, 1049, 1051, 1061, 1063, 1069, 1087, 1091,
    1093, 1097, 1103, 1109, 1117, 1123, 1129, 1151, 1153, 1163, 1171, 1181,
];

/// Error type for embedding operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EmbedError {
    #[error("Model initialization failed: {0}")]
    ModelInit(String),

    #[error("Embedding generation failed: {0}")]
    Inference(String),
}

/// A loaded embedding model.
///
/// Implementations need not be reentrant; the gateway serializes calls.
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    fn dimensions(&self) -> usize;

    /// Mean-pooled, L2-normalized embedding of `text`.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
}

/// Builds the model on first use. Loading may be slow.
pub trait ModelLoader: Send + Sync {
    fn load(&self) -> Result<Arc<dyn Embedder>, EmbedError>;
}

/// HTP Embedding Model
pub struct HtpEmbedder {
    moduli: Vec<u64>,
}

impl HtpEmbedder {
    pub const NAME: &'static str = "htp-384";

    pub fn new() -> Self {
        Self {
            moduli: COPRIME_MODULI[..NUM_MODULI].to_vec(),
        }
    }

    /// Embed a single token using Harmonic Token Projection
    ///
    /// Steps:
    /// 1. Convert token to Unicode code points
    /// 2. Encode as base-2^16 integer N
    /// 3. For each modulus m_i, compute r_i = N mod m_i
    /// 4. Project to unit circle: E_i = [sin(2πr_i/m_i), cos(2πr_i/m_i)]
    fn embed_token(&self, token: &str) -> Vec<f64> {
        let n = token_to_integer(token);

        let mut embedding = Vec::with_capacity(EMBEDDING_DIM);
        for &m in &self.moduli {
            let theta = 2.0 * PI * ((n % m) as f64) / (m as f64);
            embedding.push(theta.sin());
            embedding.push(theta.cos());
        }

        embedding
    }
}

impl Default for HtpEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl Embedder for HtpEmbedder {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn dimensions(&self) -> usize {
        EMBEDDING_DIM
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return Err(EmbedError::Inference("input has no tokens".to_string()));
        }

        let mut pooled = vec![0.0f64; EMBEDDING_DIM];
        for token in &tokens {
            for (acc, val) in pooled.iter_mut().zip(self.embed_token(token)) {
                *acc += val;
            }
        }

        let count = tokens.len() as f64;
        for val in &mut pooled {
            *val /= count;
        }

        Ok(l2_normalize(&pooled))
    }
}

/// Loader for the built-in HTP model.
#[derive(Debug, Default, Clone, Copy)]
pub struct HtpLoader;

impl ModelLoader for HtpLoader {
    fn load(&self) -> Result<Arc<dyn Embedder>, EmbedError> {
        Ok(Arc::new(HtpEmbedder::new()))
    }
}

/// N = Σ u_j * B^(L-j) where B = 2^16, wrapping on overflow
fn token_to_integer(token: &str) -> u64 {
    token
        .chars()
        .take(MAX_TOKEN_LENGTH)
        .fold(0u64, |n, c| n.wrapping_mul(65536).wrapping_add(c as u64))
}

/// Splits text into lowercase words
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
        .collect()
}

fn l2_normalize(values: &[f64]) -> Vec<f32> {
    let norm = values.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        values.iter().map(|x| (x / norm) as f32).collect()
    } else {
        values.iter().map(|x| *x as f32).collect()
    }
}

/// Cosine similarity between two embeddings.
///
/// Computed as dot / (|a| * |b|) even for normalized input. Returns `None`
/// when the lengths differ; a zero-norm side scores 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() {
        return None;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a > 0.0 && norm_b > 0.0 {
        Some(dot / (norm_a * norm_b))
    } else {
        Some(0.0)
    }
}
