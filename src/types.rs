use std::str::FromStr;
use serde::Deserialize;

/// Behaviour when a run is started under a name that already has an active run.
///
/// - `Replace`: abort the active run and start the new one once the old one
///   has reached its terminal state (default behaviour).
/// - `Reject`: leave the active run alone and refuse the new start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplacePolicy {
    Replace,
    Reject,
}

impl Default for ReplacePolicy {
    fn default() -> Self {
        ReplacePolicy::Replace
    }
}

impl FromStr for ReplacePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "replace" => Ok(ReplacePolicy::Replace),
            "reject" => Ok(ReplacePolicy::Reject),
            other => Err(format!(
                "invalid replace_policy: {other} (expected \"replace\" or \"reject\")"
            )),
        }
    }
}

/// Which pipe a chunk of process output was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamKind::Stdout => "stdout",
            StreamKind::Stderr => "stderr",
        }
    }
}
