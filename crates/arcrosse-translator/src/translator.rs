use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use arcrosse_cache::{CacheConfig, Lookup, TranslationCache, TranslationRecord};
use arcrosse_decoder::{decode_at, scan_block, GuestDefs};
use arcrosse_hash::fingerprint;
use arcrosse_persist::{PersistConfig, PersistenceEngine};
use arcrosse_rules::{HostDefs, RuleSet};
use arcrosse_signatures::{analysis, SignatureStore, SIGNATURES_DB_FILE};

use crate::arena::HostArena;
use crate::cpu::{CpuState, Dispatcher};
use crate::stats::{
    BlockStatsReport, CacheReport, ExecutionStatsReport, SignatureReport, TopBlock,
    TranslatorStats,
};
use crate::{
    Result, TranslatorConfig, TranslatorError, HOT_BLOCK_MIN_EXECUTIONS,
    MAX_BLOCKS_TO_OPTIMIZE, TOP_BLOCKS_IN_STATS,
};

/// Per-loaded-binary state. The host arena cursor lives here, so each
/// loaded binary starts with a fresh arena.
struct BinaryContext {
    binary_id: String,
    guest: Vec<u8>,
    entry_point: u64,
    host_arena: HostArena,
    exec_counts: HashMap<u64, u64>,
    dispatched_blocks: u64,
}

/// The translator facade.
///
/// Owns the arenas, the definition tables, the signature store, the cache,
/// and (shared with the cache) the persistence engine. Runs entirely on the
/// caller's thread; only persistence happens in the background.
pub struct Translator {
    config: TranslatorConfig,
    guest_defs: GuestDefs,
    host_defs: HostDefs,
    rules: RuleSet,
    signatures: SignatureStore,
    cache: TranslationCache,
    engine: Arc<PersistenceEngine>,
    cpu: CpuState,
    ctx: Option<BinaryContext>,
    next_binary_seq: u64,
}

impl Translator {
    pub fn new(config: TranslatorConfig) -> Result<Self> {
        let guest_defs = GuestDefs::load_or_seed(&config.defs_dir);
        let host_defs = HostDefs::load_or_seed(&config.defs_dir);
        let rules = RuleSet::load_or_seed(&config.defs_dir);

        let engine = Arc::new(PersistenceEngine::new(PersistConfig {
            cache_dir: config.cache_dir.clone(),
            ..PersistConfig::default()
        })?);
        let cache = TranslationCache::new(
            CacheConfig {
                directory: config.cache_dir.clone(),
            },
            Arc::clone(&engine),
        )?;

        let mut signatures = SignatureStore::new();
        let db_path = config.cache_dir.join(SIGNATURES_DB_FILE);
        match signatures.load(&db_path) {
            Ok(loaded) => info!(loaded, "signature database loaded"),
            Err(err) if db_path.exists() => {
                warn!(path = %db_path.display(), error = %err, "could not load signature database");
            }
            Err(_) => {}
        }

        info!(
            guest_defs = guest_defs.len(),
            host_defs = host_defs.len(),
            rules = rules.len(),
            "translator ready"
        );

        Ok(Self {
            config,
            guest_defs,
            host_defs,
            rules,
            signatures,
            cache,
            engine,
            cpu: CpuState::default(),
            ctx: None,
            next_binary_seq: 0,
        })
    }

    pub fn config(&self) -> &TranslatorConfig {
        &self.config
    }

    pub fn host_defs(&self) -> &HostDefs {
        &self.host_defs
    }

    pub fn cpu(&self) -> &CpuState {
        &self.cpu
    }

    /// Load a guest binary: copy it into the guest arena, derive its
    /// binary id, register its cache file, and run the static analyser.
    pub fn load_binary(&mut self, bytes: &[u8], entry_point: u64) -> Result<String> {
        if bytes.len() > self.config.guest_arena_bytes {
            return Err(TranslatorError::GuestArenaExhausted {
                needed: bytes.len(),
                capacity: self.config.guest_arena_bytes,
            });
        }

        let binary_fp = fingerprint(bytes);
        let seq = self.next_binary_seq;
        self.next_binary_seq += 1;
        let binary_id = format!("{binary_fp:x}_{seq}");

        self.cache.register_binary(&binary_id, binary_fp);

        let derived = analysis::analyze(bytes, entry_point);
        let mut inserted = 0usize;
        for sig in derived {
            if self.signatures.insert(sig) {
                inserted += 1;
            }
        }
        info!(
            binary_id = %binary_id,
            bytes = bytes.len(),
            entry_point = format_args!("{entry_point:#x}"),
            signatures = inserted,
            "binary loaded"
        );

        self.cpu.rip = entry_point;
        self.ctx = Some(BinaryContext {
            binary_id: binary_id.clone(),
            guest: bytes.to_vec(),
            entry_point,
            host_arena: HostArena::new(self.config.host_arena_bytes),
            exec_counts: HashMap::new(),
            dispatched_blocks: 0,
        });

        Ok(binary_id)
    }

    /// Resolve the basic block at `guest_addr`: tier-1 hit, tier-2 hit
    /// with arena re-bind, or a fresh translation.
    ///
    /// `Ok(None)` means the block cannot be admitted (host arena exhausted
    /// or nothing decodable at the address); the run loop halts on it.
    pub fn find_or_translate_block(
        &mut self,
        guest_addr: u64,
    ) -> Result<Option<TranslationRecord>> {
        let ctx = self.ctx.as_mut().ok_or(TranslatorError::NoBinaryLoaded)?;

        let offset = guest_addr
            .checked_sub(ctx.entry_point)
            .filter(|&o| o < ctx.guest.len() as u64)
            .ok_or(TranslatorError::AddressOutOfRange { guest_addr })?
            as usize;

        let block_len = scan_block(&self.guest_defs, &ctx.guest[offset..]);
        if block_len == 0 {
            warn!(guest_addr = format_args!("{guest_addr:#x}"), "undecodable block");
            return Ok(None);
        }
        let guest_bytes = &ctx.guest[offset..offset + block_len];

        match self.cache.lookup(&ctx.binary_id, guest_addr, guest_bytes) {
            Lookup::Tier1(record) => Ok(Some(record)),
            Lookup::Tier2 { record, host_bytes } => {
                let Some(host_offset) = ctx.host_arena.alloc(&host_bytes) else {
                    warn!("host arena exhausted during tier-2 promotion");
                    return Ok(None);
                };
                self.cache.bind_host(&record, host_offset);
                debug!(
                    guest_addr = format_args!("{guest_addr:#x}"),
                    "tier-2 translation promoted"
                );
                Ok(Some(TranslationRecord {
                    host_offset: Some(host_offset),
                    ..record
                }))
            }
            Lookup::Miss => {
                // A recognised signature only selects diagnostics today; the
                // kind hint is reserved for typed optimisation paths.
                if let Some(sig) = self.signatures.find(guest_bytes) {
                    debug!(
                        guest_addr = format_args!("{guest_addr:#x}"),
                        kind = ?sig.kind,
                        "block matches a known signature"
                    );
                }

                let mut words = Vec::new();
                let mut decoded = 0usize;
                while decoded < block_len {
                    let inst = decode_at(&self.guest_defs, guest_bytes, decoded);
                    if !inst.is_valid() {
                        break;
                    }
                    self.rules.apply(&inst, &mut words);
                    decoded += inst.len;
                }

                let Some(host_offset) = ctx.host_arena.alloc_words(&words) else {
                    warn!("host arena exhausted, refusing new translation");
                    return Ok(None);
                };
                let host_size = (words.len() * 4) as u32;
                self.cache
                    .store(&ctx.binary_id, guest_addr, guest_bytes, host_offset, host_size);

                Ok(Some(TranslationRecord {
                    guest_addr,
                    fingerprint: fingerprint(guest_bytes),
                    guest_size: block_len as u32,
                    host_size,
                    host_offset: Some(host_offset),
                }))
            }
        }
    }

    /// Run guest code from `entry_point` until the program pointer reaches
    /// `entry_point + length` or a block cannot be admitted.
    pub fn run(
        &mut self,
        dispatcher: &mut dyn Dispatcher,
        entry_point: u64,
        length: u64,
    ) -> Result<()> {
        self.cpu.rip = entry_point;
        let end = entry_point + length;

        while self.cpu.rip < end {
            let pc = self.cpu.rip;
            let Some(record) = self.find_or_translate_block(pc)? else {
                warn!(pc = format_args!("{pc:#x}"), "halting run loop");
                break;
            };
            let Some(host_offset) = record.host_offset else {
                break;
            };
            if record.guest_size == 0 {
                break;
            }

            let checkpoint_due;
            {
                let Some(ctx) = self.ctx.as_mut() else { break };
                *ctx.exec_counts.entry(pc).or_insert(0) += 1;
                ctx.dispatched_blocks += 1;
                checkpoint_due = ctx.dispatched_blocks % self.config.checkpoint_every == 0;

                let code = ctx.host_arena.as_executable(host_offset);
                dispatcher.execute(code, record.host_size as usize, &mut self.cpu);
            }

            self.cpu.rip = pc + u64::from(record.guest_size);

            if checkpoint_due {
                if let Err(err) = self.checkpoint() {
                    warn!(error = %err, "periodic checkpoint failed");
                }
            }
        }

        Ok(())
    }

    /// Queue a checkpoint of the current tier-1 set and host arena. Returns
    /// once the write job is queued; durability comes with [`Self::flush`].
    pub fn checkpoint(&self) -> Result<()> {
        let ctx = self.ctx.as_ref().ok_or(TranslatorError::NoBinaryLoaded)?;
        self.cache
            .checkpoint(&ctx.binary_id, ctx.host_arena.used_bytes())?;
        Ok(())
    }

    /// Block until every queued persistence write has hit the disk.
    pub fn flush(&self) -> Result<()> {
        self.engine.flush()?;
        Ok(())
    }

    /// Hand the hottest blocks to the optimisation hook: the top
    /// [`MAX_BLOCKS_TO_OPTIMIZE`] by execution count, counting only blocks
    /// at or above [`HOT_BLOCK_MIN_EXECUTIONS`]. Returns their addresses.
    pub fn optimize_hot_blocks(&mut self) -> Vec<u64> {
        let Some(ctx) = self.ctx.as_ref() else {
            return Vec::new();
        };

        let mut blocks: Vec<(u64, u64)> = ctx
            .exec_counts
            .iter()
            .map(|(&addr, &count)| (addr, count))
            .filter(|&(_, count)| count >= HOT_BLOCK_MIN_EXECUTIONS)
            .collect();
        blocks.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        blocks.truncate(MAX_BLOCKS_TO_OPTIMIZE);

        let addrs: Vec<u64> = blocks.iter().map(|&(addr, _)| addr).collect();
        for &(addr, count) in &blocks {
            self.optimize_block(addr, count);
        }
        addrs
    }

    /// Optimisation hook, reserved for re-translation at higher quality.
    fn optimize_block(&mut self, guest_addr: u64, executions: u64) {
        debug!(
            guest_addr = format_args!("{guest_addr:#x}"),
            executions, "optimisation hook invoked"
        );
    }

    /// Snapshot the statistics report without tearing anything down.
    pub fn stats(&self) -> TranslatorStats {
        let (binary_id, exec_counts): (String, Vec<(u64, u64)>) = match &self.ctx {
            Some(ctx) => (
                ctx.binary_id.clone(),
                ctx.exec_counts.iter().map(|(&a, &c)| (a, c)).collect(),
            ),
            None => (String::new(), Vec::new()),
        };

        let total_blocks = exec_counts.len();
        let total_executions: u64 = exec_counts.iter().map(|&(_, c)| c).sum();
        let hot_blocks = exec_counts
            .iter()
            .filter(|&&(_, c)| c >= HOT_BLOCK_MIN_EXECUTIONS)
            .count();

        let mut top: Vec<(u64, u64)> = exec_counts;
        top.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        top.truncate(TOP_BLOCKS_IN_STATS);

        TranslatorStats {
            binary_id,
            execution_stats: ExecutionStatsReport {
                blocks: BlockStatsReport {
                    total_blocks,
                    hot_blocks,
                    total_executions,
                },
                cache: CacheReport::from_counters(self.cache.stats(), self.engine.stats()),
                signatures: SignatureReport::from_counts(
                    self.signatures.len(),
                    self.signatures.kind_counts(),
                ),
            },
            top_blocks: top
                .into_iter()
                .map(|(address, executions)| TopBlock {
                    address,
                    executions,
                })
                .collect(),
        }
    }

    /// Tear down: final checkpoint, flush, signature DB save, statistics
    /// emission. Statistics are best-effort and emitted even when earlier
    /// steps failed.
    pub fn shutdown(self) -> Result<TranslatorStats> {
        if self.ctx.is_some() {
            if let Err(err) = self.checkpoint() {
                warn!(error = %err, "final checkpoint failed");
            }
        }
        if let Err(err) = self.engine.flush() {
            warn!(error = %err, "final flush failed");
        }

        let db_path = self.config.cache_dir.join(SIGNATURES_DB_FILE);
        if let Err(err) = self.signatures.save(&db_path) {
            warn!(path = %db_path.display(), error = %err, "could not save signature database");
        }

        let stats = self.stats();
        if let Some(path) = &self.config.stats_path {
            match serde_json::to_string_pretty(&stats) {
                Ok(json) => {
                    if let Err(err) = std::fs::write(path, json) {
                        warn!(path = %path.display(), error = %err, "could not write statistics");
                    }
                }
                Err(err) => warn!(error = %err, "could not serialise statistics"),
            }
        }

        Ok(stats)
    }
}
