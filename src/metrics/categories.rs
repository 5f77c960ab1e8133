//! Partitioning of a flat summary into fixed metric categories.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{MetricSummary, MetricValue};

/// One of the five result buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetricCategory {
    Hota,
    Clear,
    Identity,
    Vace,
    Count,
}

const HOTA_KEYS: &[&str] = &[
    "HOTA", "DetA", "AssA", "DetRe", "DetPr", "AssRe", "AssPr", "LocA", "OWTA", "HOTA(0)",
    "LocA(0)", "HOTALocA(0)",
];

const CLEAR_KEYS: &[&str] = &[
    "MOTA", "MOTP", "MODA", "CLR_Re", "CLR_Pr", "MTR", "PTR", "MLR", "sMOTA", "CLR_TP", "CLR_FN",
    "CLR_FP", "IDSW", "MT", "PT", "ML", "Frag",
];

const IDENTITY_KEYS: &[&str] = &["IDF1", "IDR", "IDP", "IDTP", "IDFN", "IDFP"];

const VACE_KEYS: &[&str] = &["SFDA", "ATA"];

const COUNT_KEYS: &[&str] = &["Dets", "GT_Dets", "IDs", "GT_IDs"];

impl MetricCategory {
    pub const ALL: [MetricCategory; 5] = [
        MetricCategory::Hota,
        MetricCategory::Clear,
        MetricCategory::Identity,
        MetricCategory::Vace,
        MetricCategory::Count,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MetricCategory::Hota => "HOTA",
            MetricCategory::Clear => "CLEAR",
            MetricCategory::Identity => "Identity",
            MetricCategory::Vace => "VACE",
            MetricCategory::Count => "COUNT",
        }
    }

    /// Summary names that belong to this category.
    pub fn keys(&self) -> &'static [&'static str] {
        match self {
            MetricCategory::Hota => HOTA_KEYS,
            MetricCategory::Clear => CLEAR_KEYS,
            MetricCategory::Identity => IDENTITY_KEYS,
            MetricCategory::Vace => VACE_KEYS,
            MetricCategory::Count => COUNT_KEYS,
        }
    }

    /// Category owning a summary name, if any.
    pub fn of(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.keys().contains(&name))
    }
}

/// Summary values grouped by category. All five buckets are always present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategorizedResult {
    #[serde(rename = "HOTA")]
    pub hota: BTreeMap<String, MetricValue>,
    #[serde(rename = "CLEAR")]
    pub clear: BTreeMap<String, MetricValue>,
    #[serde(rename = "Identity")]
    pub identity: BTreeMap<String, MetricValue>,
    #[serde(rename = "VACE")]
    pub vace: BTreeMap<String, MetricValue>,
    #[serde(rename = "COUNT")]
    pub count: BTreeMap<String, MetricValue>,
}

impl CategorizedResult {
    /// Partition `summary`. Names outside every category are left out of the
    /// result and reported at debug level.
    pub fn from_summary(summary: &MetricSummary) -> Self {
        let mut result = Self::default();
        let mut uncategorized = Vec::new();

        for (name, value) in summary.iter() {
            match MetricCategory::of(name) {
                Some(category) => {
                    result
                        .bucket_mut(category)
                        .insert(name.to_string(), value.clone());
                }
                None => uncategorized.push(name),
            }
        }

        if !uncategorized.is_empty() {
            tracing::debug!(names = ?uncategorized, "summary metrics outside every category dropped");
        }
        result
    }

    pub fn bucket(&self, category: MetricCategory) -> &BTreeMap<String, MetricValue> {
        match category {
            MetricCategory::Hota => &self.hota,
            MetricCategory::Clear => &self.clear,
            MetricCategory::Identity => &self.identity,
            MetricCategory::Vace => &self.vace,
            MetricCategory::Count => &self.count,
        }
    }

    fn bucket_mut(&mut self, category: MetricCategory) -> &mut BTreeMap<String, MetricValue> {
        match category {
            MetricCategory::Hota => &mut self.hota,
            MetricCategory::Clear => &mut self.clear,
            MetricCategory::Identity => &mut self.identity,
            MetricCategory::Vace => &mut self.vace,
            MetricCategory::Count => &mut self.count,
        }
    }

    /// Total number of categorized metrics.
    pub fn len(&self) -> usize {
        MetricCategory::ALL.iter().map(|c| self.bucket(*c).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
