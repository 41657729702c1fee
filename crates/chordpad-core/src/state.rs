//! Save status shared by editor front ends.

use serde::Serialize;

/// Status indicator for one editor's save pipeline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveStatus {
    #[default]
    Idle,
    Saving,
    Saved,
    Error,
    Conflict,
    Disabled,
}

impl SaveStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Saving => "saving",
            Self::Saved => "saved",
            Self::Error => "error",
            Self::Conflict => "conflict",
            Self::Disabled => "disabled",
        }
    }
}
