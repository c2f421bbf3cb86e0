use serde::Deserialize;

/// Type-specific keys of `action:` items
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionConfig {
    pub command: String,
    #[serde(default)]
    pub expected_return_code: i32,
}
