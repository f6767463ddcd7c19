use super::*;
use crate::config::EmbeddingModelSpec;

fn space() -> SearchSpaceConfig {
    SearchSpaceConfig {
        chunk_sizes: vec![128, 256, 512],
        chunk_overlaps: vec![0, 32, 256],
        top_k: vec![3, 5],
        prompt_templates: vec![PromptTemplate::Default, PromptTemplate::Concise],
        embedding_models: vec![
            EmbeddingModelSpec::default(),
            EmbeddingModelSpec {
                name: "nomic-embed-text:latest".to_string(),
                cost_per_million_tokens: 0.02,
            },
        ],
    }
}

#[test]
fn grid_drops_overlaps_not_smaller_than_size() {
    let grid = full_grid(&space());

    // sizes x overlaps valid pairs: 128:{0,32} 256:{0,32} 512:{0,32,256} = 7
    assert_eq!(grid.len(), 7 * 2 * 2 * 2);
    assert!(grid.iter().all(|t| t.chunk_overlap < t.chunk_size));
}

#[test]
fn grid_order_is_stable() {
    let grid = full_grid(&space());
    let first = &grid[0];
    assert_eq!(first.chunk_size, 128);
    assert_eq!(first.chunk_overlap, 0);
    assert_eq!(first.embedding_model, "all-minilm:latest");
    assert_eq!(first.top_k, 3);
    assert_eq!(first.prompt_template, PromptTemplate::Default);
    assert_eq!(grid[1].prompt_template, PromptTemplate::Concise);
    assert_eq!(grid, full_grid(&space()));
}

#[test]
fn duplicate_candidates_are_ignored() {
    let mut space = space();
    space.chunk_sizes.push(128);
    space.top_k.push(3);
    space.embedding_models.push(EmbeddingModelSpec::default());

    assert_eq!(full_grid(&space).len(), 7 * 2 * 2 * 2);
}

#[test]
fn small_grid_is_used_whole() {
    let trials = select_trials(&SearchSpaceConfig::default(), 100, 42);
    assert_eq!(trials, full_grid(&SearchSpaceConfig::default()));
}

#[test]
fn sample_respects_limit_without_repeats() {
    for limit in [1, 5, 20, 55] {
        let trials = select_trials(&space(), limit, 7);
        assert_eq!(trials.len(), limit);
        for (i, a) in trials.iter().enumerate() {
            for b in &trials[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}

#[test]
fn sample_is_deterministic_per_seed() {
    let a = select_trials(&space(), 10, 42);
    let b = select_trials(&space(), 10, 42);
    assert_eq!(a, b);

    let spread: Vec<usize> = sample_indices(56, 10, 42);
    assert_eq!(spread.len(), 10);
    assert!(spread.windows(2).all(|w| w[0] < w[1]));
    assert!(spread.iter().all(|&i| i < 56));
}

#[test]
fn chunking_and_label() {
    let trial = &full_grid(&space())[0];
    assert_eq!(trial.chunking(), ChunkingConfig::new(128, 0));
    assert_eq!(
        trial.label(),
        "size=128 overlap=0 model=all-minilm:latest k=3 prompt=default"
    );
}
