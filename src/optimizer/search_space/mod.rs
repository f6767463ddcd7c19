#[cfg(test)]
mod tests;

use itertools::{Itertools, iproduct};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SearchSpaceConfig;
use crate::embeddings::ChunkingConfig;
use crate::rag::PromptTemplate;

/// One point of the search space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub embedding_model: String,
    pub embedding_cost_per_million: f64,
    pub top_k: usize,
    pub prompt_template: PromptTemplate,
}

impl TrialConfig {
    #[inline]
    pub fn chunking(&self) -> ChunkingConfig {
        ChunkingConfig::new(self.chunk_size, self.chunk_overlap)
    }

    /// Compact one-line description for logs and tables
    #[inline]
    pub fn label(&self) -> String {
        format!(
            "size={} overlap={} model={} k={} prompt={}",
            self.chunk_size, self.chunk_overlap, self.embedding_model, self.top_k, self.prompt_template
        )
    }
}

/// Every valid combination, in a fixed order (chunk size, overlap, model, top-k, template)
#[inline]
pub fn full_grid(space: &SearchSpaceConfig) -> Vec<TrialConfig> {
    let chunk_sizes: Vec<usize> = space.chunk_sizes.iter().copied().unique().collect();
    let overlaps: Vec<usize> = space.chunk_overlaps.iter().copied().unique().collect();
    let models: Vec<_> = space
        .embedding_models
        .iter()
        .unique_by(|m| m.name.as_str())
        .collect();
    let top_ks: Vec<usize> = space.top_k.iter().copied().unique().collect();
    let templates: Vec<PromptTemplate> = space.prompt_templates.iter().copied().unique().collect();

    iproduct!(&chunk_sizes, &overlaps, &models, &top_ks, &templates)
        .filter(|(size, overlap, _, _, _)| overlap < size)
        .map(|(&chunk_size, &chunk_overlap, model, &top_k, &prompt_template)| TrialConfig {
            chunk_size,
            chunk_overlap,
            embedding_model: model.name.clone(),
            embedding_cost_per_million: model.cost_per_million_tokens,
            top_k,
            prompt_template,
        })
        .collect()
}

/// The grid, or an evenly spaced seeded sample of it when larger than `max_trials`
#[inline]
pub fn select_trials(space: &SearchSpaceConfig, max_trials: usize, seed: u64) -> Vec<TrialConfig> {
    let grid = full_grid(space);
    if grid.len() <= max_trials {
        debug!("Using the full grid of {} configurations", grid.len());
        return grid;
    }

    let indices = sample_indices(grid.len(), max_trials, seed);
    debug!(
        "Sampled {} of {} configurations (seed {})",
        indices.len(),
        grid.len(),
        seed
    );

    let mut grid: Vec<Option<TrialConfig>> = grid.into_iter().map(Some).collect();
    indices
        .into_iter()
        .filter_map(|i| grid.get_mut(i).and_then(Option::take))
        .collect()
}

/// `count` strictly increasing indices below `len`, one per equal-width stride,
/// all shifted by the same seeded offset
fn sample_indices(len: usize, count: usize, seed: u64) -> Vec<usize> {
    if count == 0 || len == 0 {
        return Vec::new();
    }
    if count >= len {
        return (0..len).collect();
    }

    let stride = len as f64 / count as f64;
    let mut rng = StdRng::seed_from_u64(seed);
    let offset: f64 = rng.gen_range(0.0..stride);

    (0..count)
        .map(|i| ((i as f64).mul_add(stride, offset) as usize).min(len - 1))
        .dedup()
        .collect()
}
