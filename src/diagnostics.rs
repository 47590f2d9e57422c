//! Map-reduce telemetry.
//!
//! [`ReduceDiagnostics`] records how much work a summarization took: how many
//! chunks were summarized, how many merge calls were needed, and over how
//! many rounds the work-list shrank to a single result.

/// Records what happened during one map-reduce summarization.
///
/// # Example
///
/// ```
/// use podcast_pipeline::diagnostics::ReduceDiagnostics;
///
/// let diag = ReduceDiagnostics::default();
/// assert_eq!(diag.completion_calls(), 0);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReduceDiagnostics {
    /// Per-chunk summarization calls.
    pub map_calls: usize,

    /// Coordinator calls across all rounds, one per group.
    pub reduce_calls: usize,

    /// Number of reduce rounds until one result remained.
    pub rounds: usize,

    /// Rounds that ended with as many items as they started with, because
    /// every group held a single oversized summary.
    pub stalled_rounds: usize,
}

impl ReduceDiagnostics {
    /// Total completion calls spent.
    pub fn completion_calls(&self) -> usize {
        self.map_calls + self.reduce_calls
    }

    pub(crate) fn absorb(&mut self, other: ReduceDiagnostics) {
        self.map_calls += other.map_calls;
        self.reduce_calls += other.reduce_calls;
        self.rounds = self.rounds.max(other.rounds);
        self.stalled_rounds += other.stalled_rounds;
    }
}
