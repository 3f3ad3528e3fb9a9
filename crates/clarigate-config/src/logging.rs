//! Log output formats understood by the CLI telemetry layer.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How tracing events are written to standard error.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per event, fields flattened.
    #[default]
    Json,
    /// Compact single-line text.
    Compact,
}
