//! Archive configuration.

use crate::alignment::AlignmentRules;
use crate::file_use_map::PositionAlgorithm;

/// Default deflate level for new entries.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Options for opening a [`ZFile`](crate::ZFile).
///
/// # Example
///
/// ```
/// use zedit_zfile::{AlignmentRule, AlignmentRules, ZFileOptions};
///
/// let options = ZFileOptions::default()
///     .with_alignment_rules(
///         AlignmentRules::new().with_rule(AlignmentRule::new("*.so", 4096)?),
///     )
///     .with_no_timestamps(true);
/// assert_eq!(options.compression_level, 6);
/// # Ok::<(), zedit_zfile::Error>(())
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ZFileOptions {
    /// Where entry data must start, by entry name.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub alignment_rules: AlignmentRules,
    /// Deflate level, 0 to 9.
    pub compression_level: u32,
    /// Write zero timestamps and skip timestamp checks when reading.
    pub no_timestamps: bool,
    /// Re-lay entries in name order on every update.
    pub auto_sort_files: bool,
    /// How free space is picked for new entries.
    pub position_algorithm: PositionAlgorithm,
}

impl Default for ZFileOptions {
    fn default() -> Self {
        Self {
            alignment_rules: AlignmentRules::default(),
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            no_timestamps: false,
            auto_sort_files: false,
            position_algorithm: PositionAlgorithm::default(),
        }
    }
}

impl ZFileOptions {
    pub fn with_alignment_rules(mut self, rules: AlignmentRules) -> Self {
        self.alignment_rules = rules;
        self
    }

    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level;
        self
    }

    pub fn with_no_timestamps(mut self, no_timestamps: bool) -> Self {
        self.no_timestamps = no_timestamps;
        self
    }

    pub fn with_auto_sort_files(mut self, auto_sort: bool) -> Self {
        self.auto_sort_files = auto_sort;
        self
    }

    pub fn with_position_algorithm(mut self, algorithm: PositionAlgorithm) -> Self {
        self.position_algorithm = algorithm;
        self
    }
}
