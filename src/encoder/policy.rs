//! Encoder parameter policy: resolution-tier defaults merged with overrides.

use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::config::model::EncodingConfig;
use crate::error::ParameterError;

/// Quality values HandBrake accepts for x265 constant-quality encodes.
pub const QUALITY_RANGE: RangeInclusive<i32> = -12..=51;

/// Known x265 speed presets, fastest first.
pub const SPEED_PRESETS: &[&str] = &[
    "ultrafast", "superfast", "veryfast", "faster", "fast",
    "medium", "slow", "slower", "veryslow", "placebo",
];

/// Ordinal bucket derived from source pixel height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResolutionClass {
    /// Below 720 lines.
    Sd,
    /// 720 up to 1080 lines.
    Hd,
    /// 1080 up to 2160 lines.
    Fhd,
    /// 2160 lines and above.
    Uhd,
}

/// One row of the resolution table.
struct ResolutionTier {
    min_height: u32,
    class: ResolutionClass,
    quality: i32,
    options: &'static str,
}

/// Resolution defaults, ordered by ascending height threshold.
const RESOLUTION_TABLE: [ResolutionTier; 4] = [
    ResolutionTier {
        min_height: 0,
        class: ResolutionClass::Sd,
        quality: 18,
        options: "ctu=32:qg-size=16",
    },
    ResolutionTier {
        min_height: 720,
        class: ResolutionClass::Hd,
        quality: 20,
        options: "ctu=32:qg-size=32",
    },
    ResolutionTier {
        min_height: 1080,
        class: ResolutionClass::Fhd,
        quality: 21,
        options: "ctu=64:qg-size=64",
    },
    ResolutionTier {
        min_height: 2160,
        class: ResolutionClass::Uhd,
        quality: 24,
        options: "ctu=64:qg-size=64",
    },
];

impl ResolutionClass {
    /// Classifies a source by its pixel height.
    pub fn from_height(height: u32) -> Self {
        RESOLUTION_TABLE
            .iter()
            .rev()
            .find(|tier| height >= tier.min_height)
            .map_or(Self::Sd, |tier| tier.class)
    }

    fn tier(self) -> &'static ResolutionTier {
        // Every class has exactly one row, so the fallback is never taken.
        RESOLUTION_TABLE
            .iter()
            .find(|tier| tier.class == self)
            .unwrap_or(&RESOLUTION_TABLE[0])
    }

    /// Default encoder quality for this class.
    pub fn default_quality(self) -> i32 {
        self.tier().quality
    }

    /// Default x265 options for this class.
    pub fn default_options(self) -> &'static str {
        self.tier().options
    }
}

impl fmt::Display for ResolutionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sd => write!(f, "SD"),
            Self::Hd => write!(f, "HD"),
            Self::Fhd => write!(f, "FHD"),
            Self::Uhd => write!(f, "UHD"),
        }
    }
}

/// HandBrake preset selected from the imported preset file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PresetName {
    Default,
    Baseline,
    Best,
}

impl fmt::Display for PresetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "Default"),
            Self::Baseline => write!(f, "Baseline"),
            Self::Best => write!(f, "Best"),
        }
    }
}

/// Command-line overrides applied on top of the resolution defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodeOverrides {
    /// Explicit quality value.
    pub quality: Option<i32>,
    /// Explicit speed preset.
    pub speed_preset: Option<String>,
    /// Use the Baseline HandBrake preset.
    pub baseline: bool,
    /// Use the Best HandBrake preset.
    pub best: bool,
    /// Append the small-output tuning tokens.
    pub small: bool,
}

impl EncodeOverrides {
    /// Checks the overrides without needing a source file.
    pub fn validate(&self) -> Result<(), ParameterError> {
        if self.baseline && self.best {
            return Err(ParameterError::ConflictingPresetNames);
        }

        if let Some(quality) = self.quality {
            if !QUALITY_RANGE.contains(&quality) {
                return Err(ParameterError::QualityOutOfRange {
                    quality,
                    min: *QUALITY_RANGE.start(),
                    max: *QUALITY_RANGE.end(),
                });
            }
        }

        if let Some(preset) = &self.speed_preset {
            normalize_speed_preset(preset)?;
        }

        Ok(())
    }

    fn preset_name(&self) -> PresetName {
        if self.best {
            PresetName::Best
        } else if self.baseline {
            PresetName::Baseline
        } else {
            PresetName::Default
        }
    }
}

/// Fully resolved encoder parameters for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingParameters {
    /// Constant-quality value.
    pub quality: i32,
    /// HandBrake preset name.
    pub preset_name: PresetName,
    /// x265 speed preset, lowercase.
    pub speed_preset: String,
    /// Colon-separated x265 options.
    pub options: String,
    /// Whether the small-output tokens were appended.
    pub small: bool,
}

impl EncodingParameters {
    /// Filename suffix identifying this configuration.
    ///
    /// Order is fixed: quality, speed preset, Baseline/Best tag, Small tag.
    pub fn file_decorator(&self) -> String {
        let mut decorator = format!("_RF{}_{}", self.quality, capitalize(&self.speed_preset));

        match self.preset_name {
            PresetName::Baseline => decorator.push_str("_Baseline"),
            PresetName::Best => decorator.push_str("_Best"),
            PresetName::Default => {}
        }

        if self.small {
            decorator.push_str("_Small");
        }

        decorator
    }

    /// Verifies that every field is resolved.
    pub fn validate(&self) -> Result<(), ParameterError> {
        if self.speed_preset.trim().is_empty() {
            return Err(ParameterError::Unresolved {
                field: "speed_preset",
            });
        }
        if self.options.trim().is_empty() {
            return Err(ParameterError::Unresolved { field: "options" });
        }
        if !QUALITY_RANGE.contains(&self.quality) {
            return Err(ParameterError::QualityOutOfRange {
                quality: self.quality,
                min: *QUALITY_RANGE.start(),
                max: *QUALITY_RANGE.end(),
            });
        }
        Ok(())
    }
}

/// Resolves encoder parameters for a resolution class.
///
/// Merge order: resolution defaults, preset name, explicit quality, small flag.
pub fn resolve(
    class: ResolutionClass,
    overrides: &EncodeOverrides,
    encoding: &EncodingConfig,
) -> Result<EncodingParameters, ParameterError> {
    overrides.validate()?;

    let mut options = class.default_options().to_string();
    let speed_preset = match &overrides.speed_preset {
        Some(preset) => normalize_speed_preset(preset)?,
        None => normalize_speed_preset(&encoding.default_speed_preset)?,
    };
    let preset_name = overrides.preset_name();
    let quality = overrides.quality.unwrap_or_else(|| class.default_quality());

    if overrides.small {
        let extra = encoding.small_options.trim().trim_start_matches(':');
        if !extra.is_empty() {
            options.push(':');
            options.push_str(extra);
        }
    }

    let parameters = EncodingParameters {
        quality,
        preset_name,
        speed_preset,
        options,
        small: overrides.small,
    };
    parameters.validate()?;

    Ok(parameters)
}

/// Returns the whitelisted preset closest to `input` by Levenshtein distance.
///
/// Ties go to a preset that contains `input` as a subsequence, so dropped
/// letters (`slowr`) resolve to the longer name.
pub fn closest_speed_preset(input: &str) -> &'static str {
    SPEED_PRESETS
        .iter()
        .min_by_key(|p| (strsim::levenshtein(input, p), !is_subsequence(input, p)))
        .copied()
        .unwrap_or("medium")
}

fn is_subsequence(needle: &str, haystack: &str) -> bool {
    let mut rest = haystack.chars();
    needle.chars().all(|c| rest.any(|h| h == c))
}

fn normalize_speed_preset(preset: &str) -> Result<String, ParameterError> {
    let lowered = preset.trim().to_lowercase();
    if SPEED_PRESETS.contains(&lowered.as_str()) {
        Ok(lowered)
    } else {
        Err(ParameterError::UnknownPreset {
            preset: preset.to_string(),
            suggestion: closest_speed_preset(&lowered).to_string(),
        })
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
