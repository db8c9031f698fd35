use std::path::PathBuf;

/// Mirrors `DataBaseConfig` (§4.3): where the map lives and the
/// thresholds governing auto-resize and durability.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    /// Initial memory map size. Grows in `growth_step` increments.
    pub initial_map_size: usize,
    /// Resize is triggered once estimated free space drops below this.
    pub resize_threshold: usize,
    /// How much to grow the map by once `resize_threshold` is crossed.
    pub growth_step: usize,
    /// Force a synchronous flush every `sync_every` dirty write batches.
    pub sync_every: u64,
    pub max_named_databases: u32,
}

impl StoreConfig {
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            initial_map_size: 1 << 30, // 1 GiB
            resize_threshold: 16 << 20, // 16 MiB
            growth_step: 128 << 20,    // 128 MiB
            sync_every: 100_000,
            max_named_databases: 32,
        }
    }
}
