#[derive(Clone, Debug)]
pub struct BlockCfg {
    /// Upper bound on txs per block; `real_block_size` rounds up to a
    /// permitted size no larger than this.
    pub max_block_size: usize,
    /// Seal a non-empty block after this many milliseconds even if under
    /// the size bound.
    pub max_wait_ms: u64,
}

impl Default for BlockCfg {
    fn default() -> Self {
        Self {
            max_block_size: 16,
            max_wait_ms: 10_000,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TreeCacheCfg {
    /// Maximum asset trees kept in memory at once.
    pub capacity: usize,
}

impl Default for TreeCacheCfg {
    fn default() -> Self {
        Self { capacity: 4096 }
    }
}

#[derive(Clone, Debug)]
pub struct ExpiryCfg {
    /// How far in the future an L2 tx may set `expired_at` (ms).
    pub max_expiry_window_ms: i64,
}

impl Default for ExpiryCfg {
    fn default() -> Self {
        Self {
            max_expiry_window_ms: 7 * 24 * 3600 * 1000,
        }
    }
}
