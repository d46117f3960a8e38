use super::{Chunk, DispatchResult};

/// Flattens dispatch results into the final page order: unit order first,
/// then the order each unit's chunks came back in.
pub fn assemble(results: Vec<DispatchResult>) -> Vec<Chunk> {
    results
        .into_iter()
        .flat_map(|(_, chunks)| chunks)
        .filter(|chunk| !chunk.text.trim().is_empty())
        .collect()
}
