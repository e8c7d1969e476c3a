use serde::Serialize;

use arcrosse_cache::CacheStats;
use arcrosse_persist::PersistStats;
use arcrosse_signatures::KindCounts;

/// Teardown statistics report, serialised to JSON.
///
/// Emission is best-effort: the report is written even when the run ended
/// on an error path, so consumers must tolerate partial numbers.
#[derive(Debug, Clone, Serialize)]
pub struct TranslatorStats {
    pub binary_id: String,
    pub execution_stats: ExecutionStatsReport,
    pub top_blocks: Vec<TopBlock>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionStatsReport {
    pub blocks: BlockStatsReport,
    pub cache: CacheReport,
    pub signatures: SignatureReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct BlockStatsReport {
    pub total_blocks: usize,
    pub hot_blocks: usize,
    pub total_executions: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheReport {
    pub l1_hits: u64,
    pub l2_hits: u64,
    pub misses: u64,
    pub cache_entries: usize,
    pub hit_rate: f64,
    pub failed_write_jobs: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignatureReport {
    pub total_signatures: usize,
    pub function_signatures: usize,
    pub loop_signatures: usize,
    pub simd_signatures: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopBlock {
    pub address: u64,
    pub executions: u64,
}

impl CacheReport {
    pub(crate) fn from_counters(cache: CacheStats, persist: PersistStats) -> Self {
        let hits = cache.l1_hits + cache.l2_hits;
        let total = hits + cache.misses;
        Self {
            l1_hits: cache.l1_hits,
            l2_hits: cache.l2_hits,
            misses: cache.misses,
            cache_entries: cache.entries,
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
            failed_write_jobs: persist.failed,
        }
    }
}

impl SignatureReport {
    pub(crate) fn from_counts(total: usize, counts: KindCounts) -> Self {
        Self {
            total_signatures: total,
            function_signatures: counts.function,
            loop_signatures: counts.loops,
            simd_signatures: counts.simd,
        }
    }
}
