//! Deep validation for x265 option strings and speed presets.

use std::collections::HashSet;

use crate::encoder::policy::{closest_speed_preset, SPEED_PRESETS};

use super::{ValidationIssue, ValidationResult};

/// Known x265 parameters accepted through `--encopts`.
const X265_PARAMS: &[&str] = &[
    "ctu", "qg-size", "tu-intra-depth", "tu-inter-depth", "max-tu-size",
    "min-cu-size", "limit-tu", "limit-modes", "rect", "amp", "rd", "rdoq-level",
    "psy-rd", "psy-rdoq", "aq-mode", "aq-strength", "cutree", "keyint",
    "min-keyint", "scenecut", "bframes", "b-adapt", "b-pyramid", "ref",
    "limit-refs", "deblock", "sao", "no-sao", "selective-sao", "strong-intra-smoothing",
    "rc-lookahead", "lookahead-slices", "me", "subme", "merange", "max-merge",
    "weightp", "weightb", "early-skip", "fast-intra", "b-intra", "tskip",
    "tskip-fast", "rskip", "open-gop", "frame-threads", "pools", "wpp",
    "pmode", "pme", "vbv-bufsize", "vbv-maxrate", "colorprim", "transfer",
    "colormatrix", "range", "hdr10", "hdr10-opt", "master-display", "max-cll",
    "repeat-headers", "aud", "hrd", "profile", "level-idc", "high-tier",
    "nr-intra", "nr-inter", "ipratio", "pbratio", "qcomp", "qpmin", "qpmax",
];

/// Validates a speed preset name against the x265 whitelist.
pub fn validate_speed_preset(preset: &str, path: &str) -> ValidationResult {
    let mut result = ValidationResult::new();
    let lowered = preset.to_lowercase();

    if !SPEED_PRESETS.contains(&lowered.as_str()) {
        result.add(
            ValidationIssue::error(path, format!("Invalid x265 preset: '{}'", preset))
                .with_suggestion(format!(
                    "Did you mean '{}'? Valid presets: {}",
                    closest_speed_preset(&lowered),
                    SPEED_PRESETS.join(", ")
                )),
        );
    }

    result
}

/// Validates a colon-separated `key=value` option string.
///
/// Malformed tokens are errors; unknown keys are warnings with a suggestion.
pub fn validate_options(options: &str, path: &str) -> ValidationResult {
    let mut result = ValidationResult::new();

    if options.trim().is_empty() {
        return result;
    }

    let known: HashSet<&str> = X265_PARAMS.iter().copied().collect();

    for (index, token) in options.split(':').enumerate() {
        let token_path = format!("{}[{}]", path, index);

        let Some(param) = parse_token(token) else {
            result.add(
                ValidationIssue::error(&token_path, format!("Malformed option token: '{}'", token))
                    .with_suggestion("Options should be in 'key=value:key=value' format"),
            );
            continue;
        };

        if !known.contains(param.name) {
            let suggestion = find_similar_param(param.name, &known);
            result.add(
                ValidationIssue::warning(
                    &token_path,
                    format!("Unknown x265 parameter: '{}'", param.name),
                )
                .with_suggestion(format!("Did you mean '{}'?", suggestion)),
            );
            continue;
        }

        validate_param_value(&param, &token_path, &mut result);
    }

    result
}

/// A parsed `key=value` token.
struct ParsedParam<'a> {
    name: &'a str,
    value: &'a str,
}

/// Parses a single option token. Returns `None` for anything but `key=value`.
fn parse_token(token: &str) -> Option<ParsedParam<'_>> {
    let (name, value) = token.split_once('=')?;
    let name = name.trim();
    let value = value.trim();

    if name.is_empty() || value.is_empty() || value.contains('=') {
        return None;
    }

    Some(ParsedParam { name, value })
}

/// Validates values for the parameters the resolution table relies on.
fn validate_param_value(param: &ParsedParam<'_>, path: &str, result: &mut ValidationResult) {
    match param.name {
        "ctu" => {
            if !matches!(param.value, "16" | "32" | "64") {
                result.add(
                    ValidationIssue::error(path, format!("Invalid ctu size: '{}'", param.value))
                        .with_suggestion("ctu must be 16, 32 or 64"),
                );
            }
        }
        "qg-size" => {
            if !matches!(param.value, "8" | "16" | "32" | "64") {
                result.add(
                    ValidationIssue::error(path, format!("Invalid qg-size: '{}'", param.value))
                        .with_suggestion("qg-size must be 8, 16, 32 or 64"),
                );
            }
        }
        "tu-intra-depth" | "tu-inter-depth" => match param.value.parse::<u8>() {
            Ok(depth) if (1..=4).contains(&depth) => {}
            _ => {
                result.add(
                    ValidationIssue::error(
                        path,
                        format!("Invalid {}: '{}'", param.name, param.value),
                    )
                    .with_suggestion("Transform unit depth must be between 1 and 4"),
                );
            }
        },
        _ => {}
    }
}

/// Finds the most similar parameter name using Levenshtein distance.
fn find_similar_param<'a>(input: &str, known: &HashSet<&'a str>) -> &'a str {
    known
        .iter()
        .min_by_key(|p| strsim::levenshtein(input, p))
        .copied()
        .unwrap_or("ctu")
}
