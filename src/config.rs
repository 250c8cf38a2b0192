/// Engine configuration with tunable thresholds.
///
/// The gap thresholds drive the tracking state machine; the rest parameterize
/// the pipeline stages and the smart-guess engine. Defaults reflect observed
/// product behavior and are expected to be tuned per deployment.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Gaps below this are continuous presence (no slot change).
    pub short_gap_secs: u64,

    /// Gaps in `[short_gap, long_gap)` reclassify the open slot as commute;
    /// gaps at or above `long_gap` close it and open a new slot.
    pub long_gap_secs: u64,

    /// Interior commute slots shorter than this collapse into matching
    /// neighbors.
    pub short_commute_max_secs: u64,

    /// Merge drops events older than the newest persisted slot start minus
    /// this tolerance.
    pub clock_skew_tolerance_secs: u64,

    /// Minimum hit count before a smart guess is trusted.
    pub guess_min_hits: u32,

    /// Grid cell edge for location signatures, in degrees (~110 m per 0.001).
    pub guess_cell_size_deg: f64,

    /// Minimum sustained pace for a biometric motion window (m/s).
    pub motion_min_pace: f64,

    /// Minimum span of a motion window before it hints commute.
    pub motion_min_span_secs: u64,

    /// Maximum gap between distance samples inside one motion window.
    pub motion_max_sample_gap_secs: u64,

    /// Offset from UTC defining local midnight, in seconds east.
    pub utc_offset_secs: i32,

    /// Capacity of each source's push channel.
    pub source_queue_depth: usize,

    /// Days of history hydrated from storage at startup.
    pub hydrate_days: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            short_gap_secs: 15 * 60,
            long_gap_secs: 30 * 60,
            short_commute_max_secs: 5 * 60,
            clock_skew_tolerance_secs: 5 * 60,
            guess_min_hits: 2,
            guess_cell_size_deg: 0.001,
            motion_min_pace: 1.0,
            motion_min_span_secs: 5 * 60,
            motion_max_sample_gap_secs: 5 * 60,
            utc_offset_secs: 0,
            source_queue_depth: 256,
            hydrate_days: 35,
        }
    }
}
