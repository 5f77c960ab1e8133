//! Registry of metric families supported by the evaluation engine.

use serde::{Deserialize, Serialize};

/// A metric family the evaluation engine can compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MetricKind {
    #[serde(rename = "HOTA")]
    Hota,
    #[serde(rename = "CLEAR")]
    Clear,
    #[serde(rename = "Identity")]
    Identity,
    #[serde(rename = "VACE")]
    Vace,
}

impl MetricKind {
    /// Every supported family, in evaluation order.
    pub const ALL: [MetricKind; 4] = [
        MetricKind::Hota,
        MetricKind::Clear,
        MetricKind::Identity,
        MetricKind::Vace,
    ];

    /// Engine-side name; also the metric class name in TrackEval.
    pub fn name(&self) -> &'static str {
        match self {
            MetricKind::Hota => "HOTA",
            MetricKind::Clear => "CLEAR",
            MetricKind::Identity => "Identity",
            MetricKind::Vace => "VACE",
        }
    }

    /// Exact-match lookup by engine name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Resolve requested names against the registry.
    ///
    /// The result follows registry order and contains each family at most
    /// once; unknown names are skipped.
    pub fn resolve<S: AsRef<str>>(names: &[S]) -> Vec<MetricKind> {
        Self::ALL
            .into_iter()
            .filter(|kind| names.iter().any(|n| n.as_ref() == kind.name()))
            .collect()
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
