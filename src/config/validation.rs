//! Config validation: unknown-key detection with Levenshtein suggestions
//! and plausibility checks on the rate-limit plan.
//!
//! The raw TOML is first walked as a `toml::Value` tree and every key is
//! compared against the known field names; unknown keys become warnings with
//! a "did you mean?" suggestion. Warnings never reject a config.

use std::collections::HashSet;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for `LapseConfig`.
///
/// Maintained by hand; a new field in lapse_config.rs must be listed here.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [protect]
        "protect",
        "protect.host",
        "protect.port",
        "protect.api_key",
        "protect.verify_ssl",
        "protect.request_timeout_secs",
        "protect.high_quality_snapshots",
        // [cameras]
        "cameras",
        "cameras.selection_mode",
        "cameras.whitelist",
        "cameras.blacklist",
        "cameras.refresh_interval_secs",
        // [capture]
        "capture",
        "capture.intervals",
        "capture.top_of_the_minute",
        "capture.optimize_interval_fetching",
        "capture.max_retries",
        "capture.retry_delay_secs",
        "capture.timeout_percentage",
        "capture.reuse_wait_timeout_secs",
        "capture.registry_window_secs",
        // [rate_limit]
        "rate_limit",
        "rate_limit.requests_per_second",
        "rate_limit.safety_buffer",
        "rate_limit.max_concurrent_override",
        // [distribution]
        "distribution",
        "distribution.enabled",
        "distribution.strategy",
        "distribution.min_cameras",
        "distribution.window_secs",
        "distribution.min_offset_secs",
        "distribution.max_offset_secs",
        "distribution.fixed_offset_secs",
        // [summary]
        "summary",
        "summary.enabled",
        "summary.interval_secs",
        "summary.reset_on_emit",
        // [output]
        "output",
        "output.image_path",
        "output.video_path",
        // [timelapse]
        "timelapse",
        "timelapse.enabled",
        "timelapse.creation_time",
        "timelapse.days_ago",
        "timelapse.frame_rate",
        "timelapse.quality_preset",
        "timelapse.custom_crf",
        "timelapse.custom_preset",
        "timelapse.custom_pix_fmt",
        "timelapse.custom_color_settings",
        "timelapse.overwrite",
        "timelapse.delete_images_after_success",
        "timelapse.concurrent_creation",
        "timelapse.ffmpeg_binary",
    ];
    keys.iter().copied().collect()
}

/// Recursively collect dotted key paths from a TOML value.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
///
/// Ties resolve to the lexicographically smallest key so output is stable.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|&k| (levenshtein(unknown, k), k))
        .filter(|(dist, _)| *dist <= 3)
        .min()
        .map(|(_, k)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // reported by serde afterwards
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Plausibility Checks
// ============================================================================

/// Checks that do not make a config invalid but usually indicate a mistake.
pub fn plausibility_warnings(config: &super::LapseConfig) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    if let Some(over) = config.rate_limit.max_concurrent_override {
        #[allow(clippy::cast_precision_loss)]
        let over_rate = over as f64;
        if over_rate > config.rate_limit.requests_per_second {
            warnings.push(ValidationWarning {
                field: "rate_limit.max_concurrent_override".to_string(),
                message: format!(
                    "max_concurrent_override ({over}) exceeds requests_per_second ({})",
                    config.rate_limit.requests_per_second
                ),
                suggestion: None,
            });
        }
    }

    if config.capture.optimize_interval_fetching && !config.capture.top_of_the_minute {
        let has_chain = config.capture.intervals.iter().any(|&c| {
            config
                .capture
                .intervals
                .iter()
                .any(|&d| d > 0 && d < c && c % d == 0)
        });
        if has_chain && config.capture.intervals.iter().any(|&i| i % 60 != 0) {
            warnings.push(ValidationWarning {
                field: "capture.top_of_the_minute".to_string(),
                message: "interval reuse without top-of-minute alignment ties ticks to the start time"
                    .to_string(),
                suggestion: None,
            });
        }
    }

    if config.cameras.selection_mode == super::SelectionMode::Whitelist
        && config.cameras.whitelist.is_empty()
    {
        warnings.push(ValidationWarning {
            field: "cameras.whitelist".to_string(),
            message: "whitelist mode with an empty whitelist captures nothing".to_string(),
            suggestion: None,
        });
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_identical() {
        assert_eq!(levenshtein("interval", "interval"), 0);
    }

    #[test]
    fn test_levenshtein_one_edit() {
        assert_eq!(levenshtein("intervls", "intervals"), 1);
    }

    #[test]
    fn test_levenshtein_empty() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
    }

    #[test]
    fn test_walk_toml_keys_nested() {
        let toml: toml::Value = r#"
            [capture]
            intervals = [60]
        "#
        .parse()
        .unwrap();
        let keys = walk_toml_keys(&toml, "");
        assert!(keys.contains(&"capture".to_string()));
        assert!(keys.contains(&"capture.intervals".to_string()));
    }

    #[test]
    fn test_typo_key_produces_warning_with_suggestion() {
        let warnings = validate_unknown_keys("[capture]\nintervls = [60]\n");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "capture.intervls");
        assert_eq!(warnings[0].suggestion.as_deref(), Some("capture.intervals"));
    }

    #[test]
    fn test_all_valid_keys_produce_zero_warnings() {
        let toml_str = r#"
[protect]
host = "10.0.0.1"

[rate_limit]
requests_per_second = 10.0
safety_buffer = 0.8

[timelapse]
quality_preset = "high"
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert!(warnings.is_empty(), "Expected 0 warnings, got: {:?}", warnings);
    }

    #[test]
    fn test_completely_unknown_key_has_no_suggestion() {
        let warnings = validate_unknown_keys("[zzzzzzzz]\nqqqqqq = 1\n");
        assert!(!warnings.is_empty());
        assert!(warnings.iter().all(|w| w.suggestion.is_none()));
    }

    #[test]
    fn test_empty_whitelist_warns() {
        let mut config = super::super::LapseConfig::default();
        config.cameras.selection_mode = super::super::SelectionMode::Whitelist;
        let warnings = plausibility_warnings(&config);
        assert!(warnings.iter().any(|w| w.field == "cameras.whitelist"));
    }
}
