//! Config Validation Tests
//!
//! Typo detection, range validation and file loading, exercised through the
//! public config API without touching the process environment.

use std::io::Write;

use camlapse::config::validation::{
    known_config_keys, plausibility_warnings, suggest_correction, validate_unknown_keys,
};
use camlapse::config::{ConfigError, DistributionStrategy, LapseConfig, QualityPreset, SelectionMode};

// ============================================================================
// Typo Detection
// ============================================================================

#[test]
fn typo_in_capture_section_warns_with_suggestion() {
    let toml_str = r#"
[capture]
max_retires = 5
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 1, "Expected exactly 1 warning");
    assert!(warnings[0].field.contains("max_retires"));
    assert_eq!(warnings[0].suggestion.as_deref(), Some("capture.max_retries"));
}

#[test]
fn typo_in_section_name_warns() {
    let toml_str = r#"
[timelaps]
enabled = false
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert!(warnings.iter().any(|w| w.field == "timelaps"));
    assert!(warnings
        .iter()
        .any(|w| w.suggestion.as_deref() == Some("timelapse")));
}

#[test]
fn full_valid_config_produces_zero_warnings() {
    let toml_str = r#"
[protect]
host = "192.168.1.1"
port = 443
api_key = "secret"
verify_ssl = false
high_quality_snapshots = true

[cameras]
selection_mode = "blacklist"
blacklist = ["Garage"]

[capture]
intervals = [60, 180, 900]
top_of_the_minute = true
optimize_interval_fetching = true
max_retries = 2
timeout_percentage = 0.75

[rate_limit]
requests_per_second = 10.0
safety_buffer = 0.8

[distribution]
enabled = true
strategy = "fixed"
fixed_offset_secs = 0.2

[summary]
interval_secs = 1800

[output]
image_path = "/data/images"
video_path = "/data/videos"

[timelapse]
creation_time = "02:30"
quality_preset = "custom"
custom_crf = 20
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert!(warnings.is_empty(), "Expected 0 warnings, got: {warnings:?}");

    let config = LapseConfig::from_toml_str(toml_str).unwrap();
    assert_eq!(config.cameras.selection_mode, SelectionMode::Blacklist);
    assert_eq!(config.distribution.strategy, DistributionStrategy::Fixed);
    assert_eq!(config.timelapse.quality_preset, QualityPreset::Custom);
    assert_eq!(config.capture.intervals, vec![60, 180, 900]);
}

#[test]
fn suggestion_is_none_for_distant_keys() {
    let known = known_config_keys();
    assert!(suggest_correction("completely.unrelated.key", &known).is_none());
    assert_eq!(
        suggest_correction("output.imag_path", &known).as_deref(),
        Some("output.image_path")
    );
}

// ============================================================================
// Range Validation
// ============================================================================

fn validation_errors(toml_str: &str) -> Vec<String> {
    match LapseConfig::from_toml_str(toml_str) {
        Err(ConfigError::Validation(errors)) => errors,
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn empty_interval_list_is_rejected() {
    let errors = validation_errors("[capture]\nintervals = []\n");
    assert!(errors.iter().any(|e| e.contains("intervals")));
}

#[test]
fn zero_interval_is_rejected() {
    let errors = validation_errors("[capture]\nintervals = [0, 60]\n");
    assert!(errors.iter().any(|e| e.contains("intervals")));
}

#[test]
fn out_of_range_rate_settings_are_rejected() {
    let errors = validation_errors(
        r#"
[rate_limit]
requests_per_second = 0.0
safety_buffer = 1.5
"#,
    );
    assert!(errors.len() >= 2, "Expected both fields reported: {errors:?}");
}

#[test]
fn non_finite_distribution_values_are_rejected() {
    for (key, value) in [
        ("window_secs", "nan"),
        ("min_offset_secs", "-inf"),
        ("max_offset_secs", "nan"),
        ("fixed_offset_secs", "inf"),
    ] {
        let errors = validation_errors(&format!("[distribution]\n{key} = {value}\n"));
        assert!(
            errors.iter().any(|e| e.contains(key) && e.contains("finite")),
            "{key} = {value} not reported: {errors:?}"
        );
    }
}

#[test]
fn bad_creation_time_is_rejected() {
    let errors = validation_errors("[timelapse]\ncreation_time = \"25:99\"\n");
    assert!(errors.iter().any(|e| e.contains("creation_time")));
}

#[test]
fn malformed_toml_is_a_parse_error() {
    let err = LapseConfig::from_toml_str("[capture\nintervals = [60]").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(..)));
}

// ============================================================================
// Loading
// ============================================================================

#[test]
fn load_from_file_applies_partial_overrides() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[capture]\nintervals = [30, 60]\n\n[summary]\nenabled = false").unwrap();

    let config = LapseConfig::load_from_file(file.path()).unwrap();
    assert_eq!(config.capture.intervals, vec![30, 60]);
    assert!(!config.summary.enabled);
    // Untouched sections keep their defaults.
    assert_eq!(config.protect.port, 443);
    assert!((config.rate_limit.safety_buffer - 0.8).abs() < f64::EPSILON);
}

#[test]
fn missing_file_is_an_io_error() {
    let err = LapseConfig::load_from_file(std::path::Path::new("/nonexistent/camlapse.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(..)));
}

#[test]
fn serialized_config_loads_back() {
    let mut config = LapseConfig::default();
    config.capture.intervals = vec![10, 20, 40];
    config.timelapse.frame_rate = 24;
    let text = config.to_toml().unwrap();

    let loaded = LapseConfig::from_toml_str(&text).unwrap();
    assert_eq!(loaded.capture.intervals, vec![10, 20, 40]);
    assert_eq!(loaded.timelapse.frame_rate, 24);
}

// ============================================================================
// Plausibility
// ============================================================================

#[test]
fn override_above_rate_limit_warns() {
    let config = LapseConfig::from_toml_str(
        r#"
[rate_limit]
requests_per_second = 5.0
max_concurrent_override = 20
"#,
    )
    .unwrap();
    let warnings = plausibility_warnings(&config);
    assert!(warnings
        .iter()
        .any(|w| w.field == "rate_limit.max_concurrent_override"));
}

#[test]
fn default_config_is_plausible() {
    assert!(plausibility_warnings(&LapseConfig::default()).is_empty());
}
