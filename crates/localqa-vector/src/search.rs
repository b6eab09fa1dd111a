//! Exact nearest-neighbour ranking over one generation.

use localqa_core::types::SearchHit;
use localqa_core::{Error, Result};

use crate::snapshot::IndexGeneration;

pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// The `k` entries closest to `query`, ascending by squared L2 distance.
/// Equal distances keep index order.
pub fn nearest(generation: &IndexGeneration, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
    if query.len() != generation.dim {
        return Err(Error::Index(format!(
            "query dimension {} does not match index dimension {}",
            query.len(),
            generation.dim
        )));
    }
    let mut scored: Vec<(f32, usize)> = generation
        .entries
        .iter()
        .enumerate()
        .map(|(i, e)| (squared_l2(&e.vector, query), i))
        .collect();
    scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    scored.truncate(k);
    Ok(scored
        .into_iter()
        .map(|(distance, i)| SearchHit {
            chunk: generation.entries[i].chunk.clone(),
            distance,
            generation: generation.generation,
        })
        .collect())
}
