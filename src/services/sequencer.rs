use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::services::course::Course;
use crate::services::profile::{Assessment, ExperienceLevel, LearnerProfile, LearningGoal};
use crate::services::scoring::{round2, ScoredCourse, ScoringEngine};

pub const ALGORITHM_VERSION: &str = "v1.0.0";
pub const MODEL_NAME: &str = "irt_gap_analysis";

const DEFAULT_COURSE_HOURS: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleTier {
    Foundation,
    Intermediate,
    Advanced,
}

impl ModuleTier {
    pub const fn as_str(self) -> &'static str {
        match self {
            ModuleTier::Foundation => "foundation",
            ModuleTier::Intermediate => "intermediate",
            ModuleTier::Advanced => "advanced",
        }
    }

    pub const fn module_name(self) -> &'static str {
        match self {
            ModuleTier::Foundation => "Foundation",
            ModuleTier::Intermediate => "Application",
            ModuleTier::Advanced => "Mastery",
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            ModuleTier::Foundation => "Build fundamental knowledge and core concepts",
            ModuleTier::Intermediate => "Apply knowledge through practical projects",
            ModuleTier::Advanced => "Advanced techniques and specialization",
        }
    }

    /// Tier a course lands in. Unknown levels join Application, matching the
    /// intermediate rank they get during sequencing.
    pub fn for_course(course: &Course) -> Self {
        match course.experience_level() {
            Some(ExperienceLevel::Beginner) => ModuleTier::Foundation,
            Some(ExperienceLevel::Advanced) | Some(ExperienceLevel::Expert) => ModuleTier::Advanced,
            Some(ExperienceLevel::Intermediate) | None => ModuleTier::Intermediate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurriculumModule {
    pub module_order: u32,
    pub module_name: String,
    pub module_description: String,
    pub difficulty_level: ModuleTier,
    pub courses: Vec<ScoredCourse>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSnapshot {
    pub experience_level: ExperienceLevel,
    pub learning_goals: Vec<LearningGoal>,
    pub has_assessment: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationMetadata {
    pub algorithm_version: String,
    pub profile_snapshot: ProfileSnapshot,
    pub generation_timestamp: String,
    pub courses_analyzed: usize,
    pub courses_selected: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedCurriculum {
    /// Empty until the curriculum has been saved.
    pub curriculum_id: String,
    pub curriculum_name: String,
    pub description: String,
    pub ai_confidence_score: f64,
    pub estimated_completion_weeks: u32,
    pub estimated_total_hours: u32,
    pub modules: Vec<CurriculumModule>,
    pub total_courses: usize,
    pub generation_metadata: GenerationMetadata,
}

impl GeneratedCurriculum {
    pub fn courses(&self) -> impl Iterator<Item = &ScoredCourse> {
        self.modules.iter().flat_map(|m| m.courses.iter())
    }
}

/// Filters, scores, ranks, sequences and groups a catalog for one learner.
#[derive(Debug, Clone, Default)]
pub struct CurriculumPlanner {
    engine: ScoringEngine,
}

impl CurriculumPlanner {
    pub fn new(engine: ScoringEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &ScoringEngine {
        &self.engine
    }

    pub fn plan(
        &self,
        profile: &LearnerProfile,
        catalog: &[Course],
        assessment: Option<&Assessment>,
    ) -> GeneratedCurriculum {
        tracing::info!(profile_id = %profile.id, profile_name = %profile.profile_name, "planning curriculum");

        let eligible = filter_eligible(catalog, &profile.target_audience);
        tracing::info!(eligible = eligible.len(), catalog = catalog.len(), "eligible courses");

        let scored: Vec<ScoredCourse> = eligible
            .iter()
            .map(|course| self.engine.score_course(course, profile, assessment))
            .collect();

        let selected = select_top(scored, profile.available_hours_per_week);
        tracing::info!(selected = selected.len(), "selected courses");

        let total_hours = total_hours(&selected);
        let weeks = completion_weeks(total_hours, profile.available_hours_per_week);
        let confidence = average_confidence(&selected);
        let total_courses = selected.len();
        let modules = group_into_modules(sequence(selected));

        let goal_labels = profile
            .learning_goals
            .iter()
            .map(|g| g.label.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        GeneratedCurriculum {
            curriculum_id: String::new(),
            curriculum_name: format!("{} Learning Path", profile.profile_name),
            description: format!(
                "Personalized curriculum tailored for {} level with focus on: {}",
                profile.experience_level.as_str(),
                goal_labels
            ),
            ai_confidence_score: confidence,
            estimated_completion_weeks: weeks,
            estimated_total_hours: total_hours,
            modules,
            total_courses,
            generation_metadata: GenerationMetadata {
                algorithm_version: ALGORITHM_VERSION.to_string(),
                profile_snapshot: ProfileSnapshot {
                    experience_level: profile.experience_level,
                    learning_goals: profile.learning_goals.clone(),
                    has_assessment: assessment.is_some(),
                },
                generation_timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                courses_analyzed: eligible.len(),
                courses_selected: total_courses,
            },
        }
    }
}

/// Active, displayed courses whose audience list admits the learner.
/// "business" and "professional" audiences are interchangeable.
pub fn filter_eligible(catalog: &[Course], target_audience: &str) -> Vec<Course> {
    catalog
        .iter()
        .filter(|course| course.is_active && course.display)
        .filter(|course| audience_admits(&course.audiences, target_audience))
        .cloned()
        .collect()
}

fn audience_admits(audiences: &[String], target: &str) -> bool {
    if audiences.is_empty() {
        return true;
    }
    let target = target.trim().to_lowercase();
    let has = |name: &str| audiences.iter().any(|a| a.trim().eq_ignore_ascii_case(name));

    if has(&target) {
        return true;
    }
    match target.as_str() {
        "business" => has("professional"),
        "professional" => has("business"),
        _ => false,
    }
}

pub fn max_courses_for(hours_per_week: u32) -> usize {
    if hours_per_week >= 10 {
        12
    } else if hours_per_week >= 5 {
        8
    } else {
        5
    }
}

/// Highest relevance first; `sort_by` is stable so ties keep catalog order.
pub fn select_top(mut scored: Vec<ScoredCourse>, hours_per_week: u32) -> Vec<ScoredCourse> {
    scored.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
    scored.truncate(max_courses_for(hours_per_week));
    scored
}

/// Easiest first, most relevant first within a level.
pub fn sequence(mut selected: Vec<ScoredCourse>) -> Vec<ScoredCourse> {
    selected.sort_by(|a, b| {
        a.course
            .difficulty_rank()
            .cmp(&b.course.difficulty_rank())
            .then_with(|| b.relevance_score.total_cmp(&a.relevance_score))
    });
    selected
}

pub fn group_into_modules(sequenced: Vec<ScoredCourse>) -> Vec<CurriculumModule> {
    let tiers = [
        ModuleTier::Foundation,
        ModuleTier::Intermediate,
        ModuleTier::Advanced,
    ];
    let mut buckets: [Vec<ScoredCourse>; 3] = [Vec::new(), Vec::new(), Vec::new()];
    for course in sequenced {
        let idx = match ModuleTier::for_course(&course.course) {
            ModuleTier::Foundation => 0,
            ModuleTier::Intermediate => 1,
            ModuleTier::Advanced => 2,
        };
        buckets[idx].push(course);
    }

    let mut modules = Vec::new();
    for (tier, courses) in tiers.into_iter().zip(buckets) {
        if courses.is_empty() {
            continue;
        }
        modules.push(CurriculumModule {
            module_order: modules.len() as u32 + 1,
            module_name: tier.module_name().to_string(),
            module_description: tier.description().to_string(),
            difficulty_level: tier,
            courses,
        });
    }
    modules
}

pub fn total_hours(courses: &[ScoredCourse]) -> u32 {
    courses
        .iter()
        .map(|c| c.course.estimated_hours().unwrap_or(DEFAULT_COURSE_HOURS))
        .fold(0u32, u32::saturating_add)
}

/// Never below one week; zero availability is treated as one hour a week.
pub fn completion_weeks(total_hours: u32, hours_per_week: u32) -> u32 {
    let per_week = hours_per_week.max(1);
    total_hours.div_ceil(per_week).max(1)
}

pub fn average_confidence(courses: &[ScoredCourse]) -> f64 {
    if courses.is_empty() {
        return 0.0;
    }
    let sum: f64 = courses.iter().map(|c| c.relevance_score).sum();
    round2(sum / courses.len() as f64)
}
