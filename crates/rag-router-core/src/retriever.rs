//! Knowledge-base retrieval boundary.

use anyhow::Result;
use async_trait::async_trait;

/// Number of passages fetched per knowledge-base lookup unless configured otherwise.
pub const DEFAULT_TOP_K: usize = 2;

/// Separator placed between concatenated passages.
pub const PASSAGE_SEPARATOR: &str = "\n\n";

/// Source of knowledge-base passages.
///
/// Implementations return the top-`k` passages for `query` concatenated
/// with [`PASSAGE_SEPARATOR`]. Zero matches is `Ok("")`, never an error.
/// An `Err` means the index itself is unavailable; the orchestrator logs it
/// and treats the lookup as empty.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str, k: usize) -> Result<String>;
}

/// Join passages the way every retriever is expected to.
pub fn join_passages<I, S>(passages: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    passages
        .into_iter()
        .map(|p| p.as_ref().trim().to_string())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(PASSAGE_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_skips_blank_passages() {
        let joined = join_passages(["  first ", "", "second"]);
        assert_eq!(joined, "first\n\nsecond");
    }

    #[test]
    fn test_join_empty() {
        let joined = join_passages(Vec::<String>::new());
        assert!(joined.is_empty());
    }
}
