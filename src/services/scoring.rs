use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::course::Course;
use crate::services::profile::{Assessment, ExperienceLevel, LearnerProfile, ProficiencyArea};

const NEUTRAL_SKILL_GAP: f64 = 0.5;
const NO_GAPS_SKILL_GAP: f64 = 0.3;
const WEAK_AREA_THRESHOLD: f64 = 0.5;
const NEUTRAL_GOAL_ALIGNMENT: f64 = 0.5;
const GOAL_SIGNAL_BOOST: f64 = 0.3;
const UNRESOLVED_DIFFICULTY: f64 = 0.5;
const UNPARSEABLE_SCHEDULE: f64 = 0.7;
const WEIGHT_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringWeights {
    pub skill_gap_coverage: f64,
    pub goal_alignment: f64,
    pub difficulty_fit: f64,
    pub schedule_fit: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            skill_gap_coverage: 0.4,
            goal_alignment: 0.3,
            difficulty_fit: 0.2,
            schedule_fit: 0.1,
        }
    }
}

impl ScoringWeights {
    pub fn sum(&self) -> f64 {
        self.skill_gap_coverage + self.goal_alignment + self.difficulty_fit + self.schedule_fit
    }

    pub fn validate(&self) -> Result<(), ScoringError> {
        let all = [
            self.skill_gap_coverage,
            self.goal_alignment,
            self.difficulty_fit,
            self.schedule_fit,
        ];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ScoringError::NegativeWeight);
        }
        let sum = self.sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(ScoringError::WeightSum(sum));
        }
        Ok(())
    }

    pub fn combine(&self, scores: &SubScores) -> f64 {
        scores.skill_gap_coverage * self.skill_gap_coverage
            + scores.goal_alignment * self.goal_alignment
            + scores.difficulty_fit * self.difficulty_fit
            + scores.schedule_fit * self.schedule_fit
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ScoringError {
    #[error("scoring weights must sum to 1.0, got {0}")]
    WeightSum(f64),
    #[error("scoring weights must be finite and non-negative")]
    NegativeWeight,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubScores {
    pub skill_gap_coverage: f64,
    pub goal_alignment: f64,
    pub difficulty_fit: f64,
    pub schedule_fit: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredCourse {
    pub course: Course,
    pub relevance_score: f64,
    pub skill_gap_coverage: f64,
    pub goal_alignment: f64,
    pub difficulty_fit: f64,
    pub schedule_fit: f64,
    pub recommendation_reason: String,
    pub skill_gaps_addressed: Vec<String>,
}

impl ScoredCourse {
    pub fn sub_scores(&self) -> SubScores {
        SubScores {
            skill_gap_coverage: self.skill_gap_coverage,
            goal_alignment: self.goal_alignment,
            difficulty_fit: self.difficulty_fit,
            schedule_fit: self.schedule_fit,
        }
    }
}

/// Decides whether course text relates to a learner topic. Swappable so a
/// similarity model can replace the substring heuristic.
pub trait RelevanceMatcher: Send + Sync {
    /// Whether a course keyword and a skill category refer to the same area.
    fn covers(&self, keyword: &str, topic: &str) -> bool;

    /// Whether `phrase` occurs in the lower-cased course `text`.
    fn mentions(&self, text: &str, phrase: &str) -> bool;
}

/// Case-insensitive substring matching, bidirectional for keywords.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubstringMatcher;

impl RelevanceMatcher for SubstringMatcher {
    fn covers(&self, keyword: &str, topic: &str) -> bool {
        let keyword = keyword.trim().to_lowercase();
        let topic = topic.trim().to_lowercase();
        if keyword.is_empty() || topic.is_empty() {
            return false;
        }
        keyword.contains(&topic) || topic.contains(&keyword)
    }

    fn mentions(&self, text: &str, phrase: &str) -> bool {
        let phrase = phrase.trim().to_lowercase();
        !phrase.is_empty() && text.contains(&phrase)
    }
}

#[derive(Clone)]
pub struct ScoringEngine {
    weights: ScoringWeights,
    matcher: Arc<dyn RelevanceMatcher>,
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            matcher: Arc::new(SubstringMatcher),
        }
    }
}

impl std::fmt::Debug for ScoringEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoringEngine")
            .field("weights", &self.weights)
            .finish_non_exhaustive()
    }
}

impl ScoringEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weights(weights: ScoringWeights) -> Result<Self, ScoringError> {
        weights.validate()?;
        Ok(Self {
            weights,
            ..Self::default()
        })
    }

    pub fn with_matcher(mut self, matcher: Arc<dyn RelevanceMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    pub fn score_course(
        &self,
        course: &Course,
        profile: &LearnerProfile,
        assessment: Option<&Assessment>,
    ) -> ScoredCourse {
        let proficiency = proficiency_source(profile, assessment);
        let gaps = self.skill_gaps_addressed(course, proficiency.as_deref());

        let scores = SubScores {
            skill_gap_coverage: self.skill_gap_coverage(course, proficiency.as_deref()),
            goal_alignment: self.goal_alignment(course, profile),
            difficulty_fit: difficulty_fit(course, profile.experience_level),
            schedule_fit: schedule_fit(course, profile.available_hours_per_week),
        };

        let relevance = round2(self.weights.combine(&scores).clamp(0.0, 1.0));
        let reason = recommendation_reason(profile, &scores);

        ScoredCourse {
            course: course.clone(),
            relevance_score: relevance,
            skill_gap_coverage: scores.skill_gap_coverage,
            goal_alignment: scores.goal_alignment,
            difficulty_fit: scores.difficulty_fit,
            schedule_fit: scores.schedule_fit,
            recommendation_reason: reason,
            skill_gaps_addressed: gaps,
        }
    }

    pub fn skill_gap_coverage(&self, course: &Course, proficiency: Option<&[ProficiencyArea]>) -> f64 {
        let Some(areas) = proficiency else {
            return NEUTRAL_SKILL_GAP;
        };
        let weak = weak_areas(areas);
        if weak.is_empty() {
            return NO_GAPS_SKILL_GAP;
        }
        let matched = weak
            .iter()
            .filter(|area| self.course_covers(course, &area.category))
            .count();
        (matched as f64 / weak.len() as f64).min(1.0)
    }

    pub fn skill_gaps_addressed(&self, course: &Course, proficiency: Option<&[ProficiencyArea]>) -> Vec<String> {
        proficiency
            .map(|areas| {
                weak_areas(areas)
                    .into_iter()
                    .filter(|area| self.course_covers(course, &area.category))
                    .map(|area| area.category.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn goal_alignment(&self, course: &Course, profile: &LearnerProfile) -> f64 {
        if profile.learning_goals.is_empty() {
            return NEUTRAL_GOAL_ALIGNMENT;
        }
        let haystack = format!(
            "{} {} {}",
            course.title,
            course.description,
            course.keywords.join(" ")
        )
        .to_lowercase();

        let matched = profile
            .learning_goals
            .iter()
            .filter(|goal| {
                self.matcher.mentions(&haystack, &goal.label)
                    || goal
                        .description
                        .as_deref()
                        .is_some_and(|d| self.matcher.mentions(&haystack, d))
            })
            .count();

        (matched as f64 / profile.learning_goals.len() as f64 + GOAL_SIGNAL_BOOST).min(1.0)
    }

    fn course_covers(&self, course: &Course, category: &str) -> bool {
        course
            .keywords
            .iter()
            .any(|keyword| self.matcher.covers(keyword, category))
    }
}

/// Profile proficiency wins; otherwise fall back to what the assessment carries.
fn proficiency_source(profile: &LearnerProfile, assessment: Option<&Assessment>) -> Option<Vec<ProficiencyArea>> {
    match (&profile.proficiency_areas, assessment) {
        (Some(areas), _) if !areas.is_empty() => Some(areas.clone()),
        (_, Some(assessment)) => Some(assessment.proficiency_areas()),
        (_, None) => None,
    }
}

fn weak_areas(areas: &[ProficiencyArea]) -> Vec<&ProficiencyArea> {
    areas.iter().filter(|a| a.score < WEAK_AREA_THRESHOLD).collect()
}

pub fn difficulty_fit(course: &Course, learner: ExperienceLevel) -> f64 {
    let label = course
        .level
        .as_deref()
        .map(|l| l.trim().to_lowercase())
        .unwrap_or_else(|| ExperienceLevel::Intermediate.as_str().to_string());

    let Some(course_level) = ExperienceLevel::parse(&label) else {
        return UNRESOLVED_DIFFICULTY;
    };

    match course_level.rank().abs_diff(learner.rank()) {
        0 => 1.0,
        1 => 0.7,
        2 => 0.4,
        _ => 0.2,
    }
}

pub fn schedule_fit(course: &Course, hours_per_week: u32) -> f64 {
    let Some(hours) = course.estimated_hours() else {
        return UNPARSEABLE_SCHEDULE;
    };
    let weeks_needed = if hours_per_week == 0 {
        f64::INFINITY
    } else {
        f64::from(hours) / f64::from(hours_per_week)
    };

    if weeks_needed <= 4.0 {
        1.0
    } else if weeks_needed <= 8.0 {
        0.8
    } else if weeks_needed <= 12.0 {
        0.6
    } else {
        0.4
    }
}

pub fn recommendation_reason(profile: &LearnerProfile, scores: &SubScores) -> String {
    let mut reasons: Vec<String> = Vec::new();

    if scores.skill_gap_coverage > 0.7 {
        reasons.push("Addresses key knowledge gaps".to_string());
    } else if scores.skill_gap_coverage > 0.4 {
        reasons.push("Fills important skill areas".to_string());
    }

    if scores.goal_alignment > 0.7 {
        match profile.learning_goals.first() {
            Some(goal) => reasons.push(format!("Directly supports your goal: \"{}\"", goal.label)),
            None => reasons.push("Directly supports your learning goals".to_string()),
        }
    } else if scores.goal_alignment > 0.4 {
        reasons.push("Aligns with your learning objectives".to_string());
    }

    if scores.difficulty_fit >= 1.0 {
        reasons.push(format!(
            "Perfect match for {} level",
            profile.experience_level.as_str()
        ));
    } else if scores.difficulty_fit > 0.6 {
        reasons.push("Appropriate difficulty level".to_string());
    }

    if reasons.is_empty() {
        reasons.push("Recommended for comprehensive learning path".to_string());
    }

    format!("{}.", reasons.join(". "))
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
