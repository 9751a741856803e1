//! # Engine Output Classification
//!
//! Translates the engine's combined stdout/stderr into the typed error
//! taxonomy, and extracts the change summary from successful runs.
//!
//! The substring markers below are tied to the engine's output format. They
//! are grouped by the engine release line they were taken from so that a
//! format change shows up as a failing test here instead of as silently
//! misclassified failures.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

use crate::error::ProvisionerError;

/// Engine release line the markers were captured from
pub const MARKER_VERSION: &str = "terraform-1.x";

/// Known output markers
pub mod markers {
    /// Printed by a successful `init`
    pub const INIT_SUCCESS: &str = "has been successfully initialized";

    /// Printed by `plan`/`apply` when nothing needs to change
    pub const NO_CHANGES: &[&str] = &[
        "No changes. Your infrastructure matches the configuration.",
        "No changes. Infrastructure is up-to-date.",
    ];

    /// Prior state could not be read or refreshed
    pub const STATE_REFRESH_ERRORS: &[&str] = &[
        "Error refreshing state",
        "Failed to load state",
        "Error loading state",
        "Unsupported state file format",
        "state snapshot was created by Terraform",
    ];

    /// Configuration failed syntax or semantic validation
    pub const INVALID_CONFIG_ERRORS: &[&str] = &[
        "Error parsing",
        "Error: Invalid",
        "Error: Unsupported argument",
        "Error: Unsupported block type",
        "Error: Missing required argument",
        "Error: Argument or block definition required",
        "Error: Reference to undeclared",
        "Error: Duplicate",
        "Error: Extraneous JSON object property",
    ];

    pub const APPLY_COMPLETE_PATTERN: &str =
        r"Apply complete! Resources: (\d+) added, (\d+) changed, (\d+) destroyed\.";

    pub const DESTROY_COMPLETE_PATTERN: &str = r"Destroy complete! Resources: (\d+) destroyed\.";
}

static APPLY_COMPLETE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(markers::APPLY_COMPLETE_PATTERN).expect("apply pattern is a valid regex")
});

static DESTROY_COMPLETE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(markers::DESTROY_COMPLETE_PATTERN).expect("destroy pattern is a valid regex")
});

/// Longest excerpt of engine output carried into an error message
const MAX_EXCERPT_CHARS: usize = 2000;

/// One engine invocation in the orchestration sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStep {
    Init,
    Plan,
    Apply,
    Destroy,
    Version,
}

impl EngineStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Plan => "plan",
            Self::Apply => "apply",
            Self::Destroy => "destroy",
            Self::Version => "version",
        }
    }
}

impl fmt::Display for EngineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource counts reported by a completed apply or destroy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChangeSummary {
    pub added: u32,
    pub changed: u32,
    pub destroyed: u32,
    pub no_changes: bool,
}

impl fmt::Display for ChangeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.no_changes {
            write!(f, "No changes. Infrastructure is up-to-date.")
        } else {
            write!(
                f,
                "Resources: {} added, {} changed, {} destroyed.",
                self.added, self.changed, self.destroyed
            )
        }
    }
}

fn contains_any(output: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| output.contains(needle))
}

/// The diagnostic part of the output: from the first `Error` line onward,
/// bounded in length. Falls back to the output tail.
pub fn error_excerpt(output: &str) -> String {
    let trimmed = output.trim();
    let start = trimmed.find("Error").unwrap_or(0);
    let excerpt = trimmed[start..].trim();

    if excerpt.chars().count() <= MAX_EXCERPT_CHARS {
        return excerpt.to_string();
    }
    let truncated: String = excerpt.chars().take(MAX_EXCERPT_CHARS).collect();
    format!("{truncated}...")
}

/// Classify a failed engine invocation into the typed taxonomy
pub fn classify_failure(step: EngineStep, output: &str) -> ProvisionerError {
    let excerpt = error_excerpt(output);

    if contains_any(output, markers::STATE_REFRESH_ERRORS) {
        return ProvisionerError::StateRefreshError(excerpt);
    }
    if contains_any(output, markers::INVALID_CONFIG_ERRORS) {
        return ProvisionerError::InvalidEngineConfig(excerpt);
    }
    if excerpt.is_empty() {
        return ProvisionerError::EngineError(format!("{step} failed without output"));
    }
    ProvisionerError::EngineError(format!("{step} failed: {excerpt}"))
}

/// Whether `init` reported a successful initialization
pub fn is_initialized(output: &str) -> bool {
    output.contains(markers::INIT_SUCCESS)
}

/// Whether the engine reported that nothing needed to change
pub fn is_up_to_date(output: &str) -> bool {
    contains_any(output, markers::NO_CHANGES)
}

/// Parse the completion line of a successful apply (also used for applying a
/// destroy plan, which prints the destroy form)
pub fn parse_change_summary(output: &str) -> Option<ChangeSummary> {
    if let Some(caps) = APPLY_COMPLETE.captures(output) {
        let count = |i: usize| caps[i].parse::<u32>().unwrap_or(0);
        return Some(ChangeSummary {
            added: count(1),
            changed: count(2),
            destroyed: count(3),
            no_changes: false,
        });
    }
    if let Some(caps) = DESTROY_COMPLETE.captures(output) {
        return Some(ChangeSummary {
            destroyed: caps[1].parse::<u32>().unwrap_or(0),
            ..ChangeSummary::default()
        });
    }
    if is_up_to_date(output) {
        return Some(ChangeSummary {
            no_changes: true,
            ..ChangeSummary::default()
        });
    }
    None
}

/// Human-readable outcome for a successful apply or destroy
pub fn outcome_message(step: EngineStep, output: &str) -> String {
    let verb = match step {
        EngineStep::Destroy => "Destroy complete!",
        _ => "Apply complete!",
    };
    match parse_change_summary(output) {
        Some(summary) if summary.no_changes => summary.to_string(),
        Some(summary)
            if step == EngineStep::Destroy && summary.added == 0 && summary.changed == 0 =>
        {
            format!("{verb} Resources: {} destroyed.", summary.destroyed)
        }
        Some(summary) => format!("{verb} {summary}"),
        None => verb.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const INIT_OUTPUT: &str = "Initializing the backend...\n\nInitializing provider plugins...\n- Finding latest version of hashicorp/google...\n\nTerraform has been successfully initialized!\n";

    const APPLY_OUTPUT: &str = "google_container_cluster.primary: Creating...\ngoogle_container_cluster.primary: Creation complete after 5m2s\n\nApply complete! Resources: 2 added, 0 changed, 0 destroyed.\n\nOutputs:\n\nendpoint = \"10.0.0.1\"\n";

    const DESTROY_OUTPUT: &str = "google_container_cluster.primary: Destroying...\n\nDestroy complete! Resources: 2 destroyed.\n";

    #[test]
    fn test_init_marker() {
        assert!(is_initialized(INIT_OUTPUT));
        assert!(!is_initialized("Initializing the backend...\n"));
    }

    #[test]
    fn test_apply_summary() {
        let summary = parse_change_summary(APPLY_OUTPUT).unwrap();
        assert_eq!(summary.added, 2);
        assert_eq!(summary.changed, 0);
        assert_eq!(summary.destroyed, 0);
        assert_eq!(
            outcome_message(EngineStep::Apply, APPLY_OUTPUT),
            "Apply complete! Resources: 2 added, 0 changed, 0 destroyed."
        );
    }

    #[test]
    fn test_destroy_summary() {
        let summary = parse_change_summary(DESTROY_OUTPUT).unwrap();
        assert_eq!(summary.destroyed, 2);
        assert_eq!(
            outcome_message(EngineStep::Destroy, DESTROY_OUTPUT),
            "Destroy complete! Resources: 2 destroyed."
        );
    }

    #[test]
    fn test_up_to_date() {
        let output = "No changes. Your infrastructure matches the configuration.\n";
        assert!(is_up_to_date(output));
        assert_eq!(
            outcome_message(EngineStep::Apply, output),
            "No changes. Infrastructure is up-to-date."
        );
    }

    #[test]
    fn test_state_refresh_classification() {
        let output = "Error refreshing state: state snapshot was created by Terraform v1.9.0, which is newer than current v1.5.7";
        assert!(matches!(
            classify_failure(EngineStep::Plan, output),
            ProvisionerError::StateRefreshError(_)
        ));
    }

    #[test]
    fn test_invalid_config_classification() {
        let output = "Initializing the backend...\n\nError: Unsupported block type\n\n  on main.tf.json line 1:\n  Blocks of type \"resourc\" are not expected here.\n";
        match classify_failure(EngineStep::Init, output) {
            ProvisionerError::InvalidEngineConfig(excerpt) => {
                assert!(excerpt.starts_with("Error: Unsupported block type"));
            }
            other => panic!("unexpected classification: {other:?}"),
        }
    }

    #[test]
    fn test_generic_failure_classification() {
        let output = "Error: googleapi: Error 403: Permission denied";
        match classify_failure(EngineStep::Apply, output) {
            ProvisionerError::EngineError(msg) => {
                assert!(msg.starts_with("apply failed:"));
                assert!(msg.contains("Permission denied"));
            }
            other => panic!("unexpected classification: {other:?}"),
        }
        assert_eq!(
            classify_failure(EngineStep::Init, "   "),
            ProvisionerError::EngineError("init failed without output".to_string())
        );
    }

    #[test]
    fn test_excerpt_is_bounded() {
        let output = format!("Error: {}", "x".repeat(5000));
        let excerpt = error_excerpt(&output);
        assert!(excerpt.ends_with("..."));
        assert!(excerpt.chars().count() <= MAX_EXCERPT_CHARS + 3);
    }

    proptest! {
        #[test]
        fn apply_counts_round_trip(added in 0u32..500, changed in 0u32..500, destroyed in 0u32..500) {
            let line = format!("Apply complete! Resources: {added} added, {changed} changed, {destroyed} destroyed.");
            let summary = parse_change_summary(&line).unwrap();
            prop_assert_eq!(summary, ChangeSummary { added, changed, destroyed, no_changes: false });
        }

        #[test]
        fn plain_output_is_never_a_typed_engine_error(output in "[a-z .]{0,80}") {
            let classified = classify_failure(EngineStep::Plan, &output);
            let is_generic = matches!(classified, ProvisionerError::EngineError(_));
            prop_assert!(is_generic);
        }
    }
}
