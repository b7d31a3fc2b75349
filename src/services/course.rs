use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::services::profile::ExperienceLevel;

const HOURS_PER_WEEK_UNIT: u32 = 10;
const HOURS_PER_DAY_UNIT: u32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    /// Free text such as "4 weeks" or "12 hours".
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub estimated_duration_hours: Option<f64>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Empty means the course is open to every audience.
    #[serde(default)]
    pub audiences: Vec<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default = "default_true")]
    pub display: bool,
}

fn default_true() -> bool {
    true
}

impl Course {
    pub fn new(id: i64, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            description: String::new(),
            category: None,
            level: None,
            duration: None,
            estimated_duration_hours: None,
            price: None,
            keywords: Vec::new(),
            audiences: Vec::new(),
            is_active: true,
            display: true,
        }
    }

    /// Level on the ordinal scale, `None` when the label does not resolve.
    pub fn experience_level(&self) -> Option<ExperienceLevel> {
        self.level.as_deref().and_then(ExperienceLevel::parse)
    }

    /// Sequencing rank; unknown or missing levels sit with intermediate.
    pub fn difficulty_rank(&self) -> u8 {
        self.experience_level()
            .map(ExperienceLevel::rank)
            .unwrap_or(ExperienceLevel::Intermediate.rank())
    }

    pub fn estimated_hours(&self) -> Option<u32> {
        self.duration.as_deref().and_then(parse_duration_hours)
    }
}

fn duration_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(\d+)\s*(week|day|hour)").expect("duration pattern is valid")
    })
}

/// Estimated study hours for a duration string: weeks count 10 h, days 2 h,
/// hours 1:1. Returns `None` when no `<number> <unit>` pair is present.
pub fn parse_duration_hours(duration: &str) -> Option<u32> {
    let captures = duration_pattern().captures(duration)?;
    let value: u32 = captures.get(1)?.as_str().parse().ok()?;
    let unit = captures.get(2)?.as_str().to_lowercase();

    let hours = if unit.starts_with("week") {
        value.saturating_mul(HOURS_PER_WEEK_UNIT)
    } else if unit.starts_with("day") {
        value.saturating_mul(HOURS_PER_DAY_UNIT)
    } else {
        value
    };
    Some(hours)
}
