//! Engine configuration options.

/// Engine configuration. Protocol economics live in `ProtocolConfig`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of events to retain in memory.
    pub max_events: usize,
    /// Log every event at info level instead of debug.
    pub verbose: bool,
    /// Record rolled back operations in the event log.
    pub record_rejections: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_events: 100_000,
            verbose: false,
            record_rejections: true,
        }
    }
}
