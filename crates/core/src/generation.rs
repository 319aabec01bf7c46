//! Generation request validation and provider profiles.
//!
//! Incoming jobs are validated here before any I/O happens. Bad input
//! (short prompt, unknown model) is rejected with
//! [`CoreError::Validation`]; out-of-range values (variation count,
//! reference count, resolution, aspect ratio) are clamped or downgraded to
//! what the selected provider profile supports.

use serde::Deserialize;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Minimum prompt length in characters, after trimming whitespace.
pub const MIN_PROMPT_LEN: usize = 3;
/// Fewest variations a job may request.
pub const MIN_VARIATIONS: u8 = 1;
/// Most variations a job may request.
pub const MAX_VARIATIONS: u8 = 4;
/// Aspect ratio used when the requested one is missing or unsupported.
pub const DEFAULT_ASPECT_RATIO: &str = "1:1";
/// Profile selected when the request names no model.
pub const DEFAULT_MODEL: &str = "standard";

// ---------------------------------------------------------------------------
// Resolution tiers
// ---------------------------------------------------------------------------

/// Output resolution tier, ordered from lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Resolution {
    OneK,
    TwoK,
    FourK,
}

impl Resolution {
    /// Parse a tier label such as `"2K"` (case-insensitive).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "1K" => Some(Self::OneK),
            "2K" => Some(Self::TwoK),
            "4K" => Some(Self::FourK),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneK => "1K",
            Self::TwoK => "2K",
            Self::FourK => "4K",
        }
    }
}

// ---------------------------------------------------------------------------
// Provider profiles
// ---------------------------------------------------------------------------

/// Capabilities of one generation model offered by the provider.
#[derive(Debug)]
pub struct ProviderProfile {
    /// Model name as sent by clients (`model` field).
    pub name: &'static str,
    /// Most reference images the model accepts per call.
    pub max_references: usize,
    /// Supported resolution tiers, ascending.
    pub resolutions: &'static [Resolution],
    /// Tier used when the request does not name a valid one.
    pub default_resolution: Resolution,
    /// Supported aspect ratios.
    pub aspect_ratios: &'static [&'static str],
}

const COMMON_ASPECT_RATIOS: &[&str] = &["1:1", "3:4", "4:3", "9:16", "16:9"];

/// All profiles known to the orchestrator.
pub const PROFILES: &[ProviderProfile] = &[
    ProviderProfile {
        name: "standard",
        max_references: 4,
        resolutions: &[Resolution::OneK, Resolution::TwoK],
        default_resolution: Resolution::OneK,
        aspect_ratios: COMMON_ASPECT_RATIOS,
    },
    ProviderProfile {
        name: "pro",
        max_references: 8,
        resolutions: &[Resolution::OneK, Resolution::TwoK, Resolution::FourK],
        default_resolution: Resolution::TwoK,
        aspect_ratios: &["1:1", "2:3", "3:2", "3:4", "4:3", "9:16", "16:9", "21:9"],
    },
];

/// Look up a profile by model name. `None` selects [`DEFAULT_MODEL`].
pub fn find_profile(model: Option<&str>) -> Result<&'static ProviderProfile, CoreError> {
    let name = model
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(DEFAULT_MODEL);

    PROFILES.iter().find(|p| p.name == name).ok_or_else(|| {
        let known: Vec<&str> = PROFILES.iter().map(|p| p.name).collect();
        CoreError::Validation(format!(
            "Unknown model '{name}'. Must be one of: {}",
            known.join(", ")
        ))
    })
}

/// Map a requested resolution to the highest supported tier not above it.
///
/// If every supported tier is above the request, the lowest supported tier
/// is used. Missing or unparseable requests get the profile default.
pub fn downgrade_resolution(profile: &ProviderProfile, requested: Option<&str>) -> Resolution {
    let Some(wanted) = requested.and_then(Resolution::parse) else {
        return profile.default_resolution;
    };

    profile
        .resolutions
        .iter()
        .copied()
        .filter(|r| *r <= wanted)
        .max()
        .or_else(|| profile.resolutions.iter().copied().min())
        .unwrap_or(profile.default_resolution)
}

/// Return the requested aspect ratio if the profile supports it, else
/// [`DEFAULT_ASPECT_RATIO`].
pub fn resolve_aspect_ratio(profile: &ProviderProfile, requested: Option<&str>) -> String {
    match requested.map(str::trim) {
        Some(ratio) if profile.aspect_ratios.contains(&ratio) => ratio.to_string(),
        _ => DEFAULT_ASPECT_RATIO.to_string(),
    }
}

/// Clamp a requested variation count into `[MIN_VARIATIONS, MAX_VARIATIONS]`.
pub fn clamp_variations(requested: Option<i64>) -> u8 {
    let n = requested.unwrap_or(i64::from(MIN_VARIATIONS));
    n.clamp(i64::from(MIN_VARIATIONS), i64::from(MAX_VARIATIONS)) as u8
}

/// Validate that the prompt meets the minimum length.
pub fn validate_prompt(prompt: &str) -> Result<String, CoreError> {
    let trimmed = prompt.trim();
    if trimmed.chars().count() < MIN_PROMPT_LEN {
        return Err(CoreError::Validation(format!(
            "Prompt must be at least {MIN_PROMPT_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}

// ---------------------------------------------------------------------------
// Job input
// ---------------------------------------------------------------------------

/// A generation request as submitted by a caller.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInput {
    pub prompt: String,
    pub model: Option<String>,
    pub resolution: Option<String>,
    pub aspect_ratio: Option<String>,
    pub num_images: Option<i64>,
    #[serde(default)]
    pub style_images: Vec<String>,
    pub negative_prompt: Option<String>,
    pub seed: Option<i64>,
}

/// Resolved constraints forwarded with every provider call of a job.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConstraints {
    pub model: &'static str,
    pub resolution: Resolution,
    pub aspect_ratio: String,
    pub negative_prompt: Option<String>,
    pub seed: Option<i64>,
}

/// A job that passed validation; every value is within provider limits.
#[derive(Debug, Clone)]
pub struct ValidatedJob {
    pub prompt: String,
    pub variation_count: u8,
    pub references: Vec<String>,
    /// Number of references dropped by the profile's reference limit.
    pub dropped_references: usize,
    pub constraints: GenerationConstraints,
}

/// Validate and normalise a [`JobInput`].
///
/// Fails only for input that cannot be repaired (prompt too short,
/// unknown model). Everything else is clamped or downgraded.
pub fn validate_job(input: &JobInput) -> Result<ValidatedJob, CoreError> {
    let prompt = validate_prompt(&input.prompt)?;
    let profile = find_profile(input.model.as_deref())?;

    let mut references: Vec<String> = input
        .style_images
        .iter()
        .map(|r| r.trim())
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .collect();
    let dropped_references = references.len().saturating_sub(profile.max_references);
    references.truncate(profile.max_references);

    let negative_prompt = input
        .negative_prompt
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string);

    Ok(ValidatedJob {
        prompt,
        variation_count: clamp_variations(input.num_images),
        references,
        dropped_references,
        constraints: GenerationConstraints {
            model: profile.name,
            resolution: downgrade_resolution(profile, input.resolution.as_deref()),
            aspect_ratio: resolve_aspect_ratio(profile, input.aspect_ratio.as_deref()),
            negative_prompt,
            seed: input.seed,
        },
    })
}

/// Seed for the `index`-th variation: `seed + index` so variations of a
/// seeded job differ from each other but stay reproducible.
pub fn variation_seed(seed: Option<i64>, index: usize) -> Option<i64> {
    seed.map(|s| s.wrapping_add(index as i64))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn input(prompt: &str) -> JobInput {
        JobInput {
            prompt: prompt.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn short_prompt_is_rejected() {
        assert_matches!(validate_job(&input("  a ")), Err(CoreError::Validation(_)));
    }

    #[test]
    fn prompt_is_trimmed() {
        let job = validate_job(&input("  a red fox  ")).unwrap();
        assert_eq!(job.prompt, "a red fox");
    }

    #[test]
    fn variation_count_is_clamped() {
        assert_eq!(clamp_variations(None), 1);
        assert_eq!(clamp_variations(Some(0)), 1);
        assert_eq!(clamp_variations(Some(-3)), 1);
        assert_eq!(clamp_variations(Some(3)), 3);
        assert_eq!(clamp_variations(Some(9)), 4);
    }

    #[test]
    fn unknown_model_is_rejected() {
        let mut req = input("a red fox");
        req.model = Some("imaginary".into());
        assert_matches!(validate_job(&req), Err(CoreError::Validation(msg)) if msg.contains("imaginary"));
    }

    #[test]
    fn missing_model_selects_default_profile() {
        let job = validate_job(&input("a red fox")).unwrap();
        assert_eq!(job.constraints.model, DEFAULT_MODEL);
    }

    #[test]
    fn references_are_clamped_to_profile_maximum() {
        let mut req = input("a red fox");
        req.style_images = (0..6).map(|i| format!("asset-{i}")).collect();
        let job = validate_job(&req).unwrap();
        assert_eq!(job.references.len(), 4);
        assert_eq!(job.dropped_references, 2);
        assert_eq!(job.references[0], "asset-0");
        assert_eq!(job.references[3], "asset-3");
    }

    #[test]
    fn blank_references_are_ignored() {
        let mut req = input("a red fox");
        req.style_images = vec!["".into(), "  ".into(), "asset-1".into()];
        let job = validate_job(&req).unwrap();
        assert_eq!(job.references, vec!["asset-1".to_string()]);
        assert_eq!(job.dropped_references, 0);
    }

    #[test]
    fn resolution_is_downgraded_to_supported_tier() {
        let standard = find_profile(Some("standard")).unwrap();
        assert_eq!(downgrade_resolution(standard, Some("4K")), Resolution::TwoK);
        assert_eq!(downgrade_resolution(standard, Some("1k")), Resolution::OneK);
        assert_eq!(downgrade_resolution(standard, Some("8K")), Resolution::OneK);
        assert_eq!(downgrade_resolution(standard, None), Resolution::OneK);

        let pro = find_profile(Some("pro")).unwrap();
        assert_eq!(downgrade_resolution(pro, Some("4K")), Resolution::FourK);
        assert_eq!(downgrade_resolution(pro, None), Resolution::TwoK);
    }

    #[test]
    fn unsupported_aspect_ratio_falls_back() {
        let standard = find_profile(None).unwrap();
        assert_eq!(resolve_aspect_ratio(standard, Some("16:9")), "16:9");
        assert_eq!(resolve_aspect_ratio(standard, Some("21:9")), DEFAULT_ASPECT_RATIO);
        assert_eq!(resolve_aspect_ratio(standard, None), DEFAULT_ASPECT_RATIO);
    }

    #[test]
    fn variation_seeds_are_offset_by_index() {
        assert_eq!(variation_seed(Some(100), 0), Some(100));
        assert_eq!(variation_seed(Some(100), 3), Some(103));
        assert_eq!(variation_seed(None, 2), None);
    }

    #[test]
    fn job_input_deserializes_camel_case() {
        let json = r#"{"prompt":"a red fox","numImages":3,"styleImages":["a"],"aspectRatio":"4:3","negativePrompt":"blur","seed":7}"#;
        let parsed: JobInput = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.num_images, Some(3));
        assert_eq!(parsed.style_images, vec!["a".to_string()]);
        assert_eq!(parsed.aspect_ratio.as_deref(), Some("4:3"));
        assert_eq!(parsed.negative_prompt.as_deref(), Some("blur"));
        assert_eq!(parsed.seed, Some(7));
    }
}
