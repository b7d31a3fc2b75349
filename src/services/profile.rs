use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperienceLevel {
    Beginner,
    Intermediate,
    Advanced,
    Expert,
}

impl ExperienceLevel {
    pub const ALL: [ExperienceLevel; 4] = [
        ExperienceLevel::Beginner,
        ExperienceLevel::Intermediate,
        ExperienceLevel::Advanced,
        ExperienceLevel::Expert,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            ExperienceLevel::Beginner => "beginner",
            ExperienceLevel::Intermediate => "intermediate",
            ExperienceLevel::Advanced => "advanced",
            ExperienceLevel::Expert => "expert",
        }
    }

    /// Position on the ordinal difficulty scale.
    pub const fn rank(self) -> u8 {
        match self {
            ExperienceLevel::Beginner => 0,
            ExperienceLevel::Intermediate => 1,
            ExperienceLevel::Advanced => 2,
            ExperienceLevel::Expert => 3,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "beginner" => Some(ExperienceLevel::Beginner),
            "intermediate" => Some(ExperienceLevel::Intermediate),
            "advanced" => Some(ExperienceLevel::Advanced),
            "expert" => Some(ExperienceLevel::Expert),
            _ => None,
        }
    }

    /// Qualitative level for a 0..1 proficiency score.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            ExperienceLevel::Expert
        } else if score >= 0.6 {
            ExperienceLevel::Advanced
        } else if score >= 0.4 {
            ExperienceLevel::Intermediate
        } else {
            ExperienceLevel::Beginner
        }
    }
}

impl Default for ExperienceLevel {
    fn default() -> Self {
        ExperienceLevel::Beginner
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LearningStyle {
    #[serde(rename = "visual")]
    Visual,
    #[serde(rename = "reading")]
    Reading,
    #[serde(rename = "hands-on")]
    HandsOn,
    #[serde(rename = "mixed")]
    Mixed,
}

impl LearningStyle {
    pub const fn as_str(self) -> &'static str {
        match self {
            LearningStyle::Visual => "visual",
            LearningStyle::Reading => "reading",
            LearningStyle::HandsOn => "hands-on",
            LearningStyle::Mixed => "mixed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "visual" => Some(LearningStyle::Visual),
            "reading" => Some(LearningStyle::Reading),
            "hands-on" | "hands_on" => Some(LearningStyle::HandsOn),
            "mixed" => Some(LearningStyle::Mixed),
            _ => None,
        }
    }
}

impl Default for LearningStyle {
    fn default() -> Self {
        LearningStyle::Mixed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningGoal {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProficiencyArea {
    pub category: String,
    pub score: f64,
    pub level: ExperienceLevel,
}

impl ProficiencyArea {
    pub fn new(category: impl Into<String>, score: f64) -> Self {
        Self {
            category: category.into(),
            score,
            level: ExperienceLevel::from_score(score),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnerProfile {
    pub id: String,
    pub user_id: String,
    pub profile_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub learning_goals: Vec<LearningGoal>,
    pub target_audience: String,
    pub experience_level: ExperienceLevel,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub job_role: Option<String>,
    #[serde(default)]
    pub company_size: Option<String>,
    #[serde(default)]
    pub years_experience: Option<u32>,
    pub preferred_learning_style: LearningStyle,
    pub available_hours_per_week: u32,
    #[serde(default)]
    pub preferred_schedule: serde_json::Value,
    #[serde(default)]
    pub latest_assessment_id: Option<String>,
    #[serde(default)]
    pub irt_ability_score: Option<f64>,
    #[serde(default)]
    pub proficiency_areas: Option<Vec<ProficiencyArea>>,
    pub is_active: bool,
    pub is_primary: bool,
    pub created_at: String,
}

/// Field set for a profile that has not been persisted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLearnerProfile {
    pub user_id: String,
    pub profile_name: String,
    pub description: Option<String>,
    pub learning_goals: Vec<LearningGoal>,
    pub target_audience: String,
    pub experience_level: ExperienceLevel,
    pub industry: Option<String>,
    pub job_role: Option<String>,
    pub company_size: Option<String>,
    pub years_experience: Option<u32>,
    pub preferred_learning_style: LearningStyle,
    pub available_hours_per_week: u32,
    pub preferred_schedule: serde_json::Value,
    pub latest_assessment_id: Option<String>,
    pub is_primary: bool,
}

impl NewLearnerProfile {
    pub fn into_profile(self, id: String, created_at: String) -> LearnerProfile {
        LearnerProfile {
            id,
            user_id: self.user_id,
            profile_name: self.profile_name,
            description: self.description,
            learning_goals: self.learning_goals,
            target_audience: self.target_audience,
            experience_level: self.experience_level,
            industry: self.industry,
            job_role: self.job_role,
            company_size: self.company_size,
            years_experience: self.years_experience,
            preferred_learning_style: self.preferred_learning_style,
            available_hours_per_week: self.available_hours_per_week,
            preferred_schedule: self.preferred_schedule,
            latest_assessment_id: self.latest_assessment_id,
            irt_ability_score: None,
            proficiency_areas: None,
            is_active: true,
            is_primary: self.is_primary,
            created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryPerformance {
    #[serde(alias = "category_name")]
    pub category: String,
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfilingData {
    #[serde(default)]
    pub audience_type: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub final_score: Option<f64>,
    #[serde(default, alias = "final_irt_ability")]
    pub ability_estimate: Option<f64>,
    #[serde(default)]
    pub augmentation_level: Option<String>,
    /// Raw per-category scores; entries that are not numbers read as 0.5.
    #[serde(default)]
    pub category_scores: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub weak_categories: Vec<CategoryPerformance>,
    #[serde(default)]
    pub strong_categories: Vec<CategoryPerformance>,
    #[serde(default)]
    pub profiling_data: Option<ProfilingData>,
    #[serde(default)]
    pub is_complete: bool,
    #[serde(default)]
    pub completed_at: Option<String>,
}

impl Assessment {
    pub fn new(id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            final_score: None,
            ability_estimate: None,
            augmentation_level: None,
            category_scores: BTreeMap::new(),
            weak_categories: Vec::new(),
            strong_categories: Vec::new(),
            profiling_data: None,
            is_complete: true,
            completed_at: None,
        }
    }

    /// Proficiency extracted from `category_scores`, the shape stored on a
    /// profile when an assessment is linked.
    pub fn category_proficiency(&self) -> Vec<ProficiencyArea> {
        self.category_scores
            .iter()
            .map(|(category, value)| ProficiencyArea::new(category.clone(), value.as_f64().unwrap_or(0.5)))
            .collect()
    }

    /// Every proficiency signal the assessment carries: category scores first,
    /// then weak/strong category lists for categories not already covered.
    pub fn proficiency_areas(&self) -> Vec<ProficiencyArea> {
        let mut areas = self.category_proficiency();
        for perf in self.weak_categories.iter().chain(self.strong_categories.iter()) {
            let known = areas
                .iter()
                .any(|area| area.category.eq_ignore_ascii_case(&perf.category));
            if !known {
                areas.push(ProficiencyArea::new(perf.category.clone(), perf.score));
            }
        }
        areas
    }
}
