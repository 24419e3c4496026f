//! Test fixtures and builders for common embedding scenarios.

use cinevec_core::EmbeddingVector;

use crate::types::{EmbedRequest, EmbedResponse};

/// Deterministic unit-length pseudo-embedding for `text`.
///
/// Identical text always maps to the identical vector; different text maps
/// to (almost surely) different vectors. Carries no semantics.
pub fn hashed_embedding(text: &str, dimensions: usize) -> Vec<f32> {
    // FNV-1a seed, then xorshift per component.
    let mut state: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in text.bytes() {
        state ^= u64::from(byte);
        state = state.wrapping_mul(0x0100_0000_01b3);
    }
    if state == 0 {
        state = 1;
    }

    let mut values = Vec::with_capacity(dimensions);
    for _ in 0..dimensions {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        values.push(((state >> 40) as f32 / (1u64 << 24) as f32) * 2.0 - 1.0);
    }

    normalize(&mut values);
    values
}

/// Scale `values` to unit length in place. Zero vectors are left alone.
pub fn normalize(values: &mut [f32]) {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in values.iter_mut() {
            *v /= norm;
        }
    }
}

/// A vector with a single non-zero component.
pub fn unit_vector(dimensions: usize, axis: usize) -> EmbeddingVector {
    let mut values = vec![0.0; dimensions];
    if let Some(v) = values.get_mut(axis) {
        *v = 1.0;
    }
    EmbeddingVector::new(values)
}

/// A simple single-input request against the mock model.
pub fn simple_request(text: &str, dimensions: usize) -> EmbedRequest {
    EmbedRequest::new([text], "mock-model", dimensions)
}

/// A response holding one hashed embedding per input of `request`.
pub fn hashed_response(request: &EmbedRequest) -> EmbedResponse {
    EmbedResponse::new(
        request
            .inputs
            .iter()
            .map(|text| EmbeddingVector::new(hashed_embedding(text, request.output_dimension)))
            .collect(),
        request.model.clone(),
    )
}
