use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::{CurriculumStore, StoreError};
use crate::services::course::Course;
use crate::services::profile::{Assessment, CategoryPerformance};
use crate::services::scoring::{RelevanceMatcher, SubstringMatcher};

const MAX_RECOMMENDATIONS: usize = 5;
const QUICK_COURSE_MAX_HOURS: f64 = 8.0;
const LEVEL_PROGRESSION: [&str; 5] = ["beginner", "developing", "proficient", "advanced", "expert"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathKind {
    Weakness,
    Career,
    QuickWins,
    Mastery,
}

impl PathKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            PathKind::Weakness => "weakness",
            PathKind::Career => "career",
            PathKind::QuickWins => "quick",
            PathKind::Mastery => "mastery",
        }
    }

    pub const fn match_score(self) -> u32 {
        match self {
            PathKind::Weakness => 95,
            PathKind::Career => 85,
            PathKind::QuickWins => 75,
            PathKind::Mastery => 80,
        }
    }

    /// Hours assumed for a course that carries no estimate.
    const fn default_hours(self) -> f64 {
        match self {
            PathKind::Weakness => 10.0,
            PathKind::Career => 15.0,
            PathKind::QuickWins => 5.0,
            PathKind::Mastery => 12.0,
        }
    }

    const fn default_difficulty(self) -> &'static str {
        match self {
            PathKind::Weakness | PathKind::Mastery => "intermediate",
            PathKind::Career => "advanced",
            PathKind::QuickWins => "beginner",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendedCourse {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub category: Option<String>,
    pub difficulty: String,
    pub estimated_hours: f64,
    pub relevance_score: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addresses_weakness: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningPathRecommendation {
    pub id: String,
    pub kind: PathKind,
    pub title: String,
    pub description: String,
    pub reason: String,
    pub match_score: u32,
    pub estimated_weeks: u32,
    pub estimated_hours: f64,
    pub difficulty: String,
    pub courses: Vec<RecommendedCourse>,
    pub skills: Vec<String>,
    pub target_level: String,
    pub benefits: Vec<String>,
}

/// What the recommender knows about a learner.
#[derive(Debug, Clone, PartialEq)]
pub struct LearnerSignals {
    pub user_id: String,
    pub current_level: String,
    pub assessment_id: Option<String>,
    pub weak_categories: Vec<CategoryPerformance>,
    pub audience_type: String,
    pub industry: Option<String>,
    pub completed_courses: HashSet<i64>,
    pub enrolled_courses: HashSet<i64>,
}

impl LearnerSignals {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            current_level: "beginner".to_string(),
            assessment_id: None,
            weak_categories: Vec::new(),
            audience_type: "professional".to_string(),
            industry: None,
            completed_courses: HashSet::new(),
            enrolled_courses: HashSet::new(),
        }
    }

    pub fn with_assessment(mut self, assessment: &Assessment) -> Self {
        if let Some(level) = assessment.augmentation_level.as_deref().filter(|l| !l.is_empty()) {
            self.current_level = level.to_string();
        }
        self.assessment_id = Some(assessment.id.clone());
        self.weak_categories = assessment.weak_categories.clone();
        if let Some(profiling) = &assessment.profiling_data {
            if let Some(audience) = profiling.audience_type.as_deref().filter(|a| !a.is_empty()) {
                self.audience_type = audience.to_string();
            }
            self.industry = profiling.industry.clone().filter(|i| !i.trim().is_empty());
        }
        self
    }
}

/// Maps assessment level labels onto the four course difficulties.
pub fn difficulty_for_level(level: &str) -> &'static str {
    match level.trim().to_lowercase().as_str() {
        "beginner" | "developing" => "beginner",
        "proficient" => "intermediate",
        "advanced" => "advanced",
        "expert" => "expert",
        _ => "intermediate",
    }
}

/// Next label on the assessment progression; unknown labels restart at the bottom.
pub fn next_level(level: &str) -> &'static str {
    let level = level.trim().to_lowercase();
    match LEVEL_PROGRESSION.iter().position(|l| *l == level) {
        Some(i) => LEVEL_PROGRESSION[(i + 1).min(LEVEL_PROGRESSION.len() - 1)],
        None => LEVEL_PROGRESSION[0],
    }
}

fn course_hours(course: &Course) -> Option<f64> {
    course
        .estimated_duration_hours
        .filter(|h| h.is_finite() && *h > 0.0)
        .or_else(|| course.estimated_hours().map(f64::from))
}

fn weeks(total_hours: f64, hours_per_week: f64) -> u32 {
    (total_hours / hours_per_week).ceil().max(0.0) as u32
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Builds alternative learning paths from a course catalog.
pub struct LearningPathRecommender {
    store: Arc<dyn CurriculumStore>,
    matcher: Arc<dyn RelevanceMatcher>,
}

impl LearningPathRecommender {
    pub fn new(store: Arc<dyn CurriculumStore>) -> Self {
        Self {
            store,
            matcher: Arc::new(SubstringMatcher),
        }
    }

    pub fn with_matcher(mut self, matcher: Arc<dyn RelevanceMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    /// Up to five paths ordered by match score. Store failures are logged and
    /// produce an empty list.
    pub async fn generate_recommendations(
        &self,
        user_id: &str,
        assessment_id: Option<&str>,
    ) -> Vec<LearningPathRecommendation> {
        match self.try_generate(user_id, assessment_id).await {
            Ok(paths) => paths,
            Err(e) => {
                tracing::error!(user_id, error = %e, "learning path recommendation failed");
                Vec::new()
            }
        }
    }

    async fn try_generate(
        &self,
        user_id: &str,
        assessment_id: Option<&str>,
    ) -> Result<Vec<LearningPathRecommendation>, StoreError> {
        let signals = self.load_signals(user_id, assessment_id).await?;
        let catalog = self.store.fetch_published_courses().await?;
        let paths = self.recommend(&signals, &catalog);
        tracing::debug!(user_id, paths = paths.len(), "learning paths generated");
        Ok(paths)
    }

    async fn load_signals(
        &self,
        user_id: &str,
        assessment_id: Option<&str>,
    ) -> Result<LearnerSignals, StoreError> {
        let assessment = match assessment_id {
            Some(id) => self.store.fetch_assessment(id).await?,
            None => self.store.fetch_latest_assessment_for_user(user_id).await?,
        };

        let mut signals = LearnerSignals::new(user_id);
        if let Some(assessment) = &assessment {
            signals = signals.with_assessment(assessment);
        }
        signals.completed_courses = self
            .store
            .fetch_completed_course_ids(user_id)
            .await?
            .into_iter()
            .collect();
        signals.enrolled_courses = self
            .store
            .fetch_enrolled_course_ids(user_id)
            .await?
            .into_iter()
            .collect();
        Ok(signals)
    }

    /// Pure path construction over an already-loaded catalog.
    pub fn recommend(&self, signals: &LearnerSignals, catalog: &[Course]) -> Vec<LearningPathRecommendation> {
        let stamp = Utc::now().timestamp_millis();
        let open: Vec<&Course> = catalog
            .iter()
            .filter(|c| !signals.completed_courses.contains(&c.id))
            .collect();

        let mut paths: Vec<LearningPathRecommendation> = [
            self.weakness_path(signals, &open, stamp),
            self.career_path(signals, &open, stamp),
            self.quick_wins_path(signals, &open, stamp),
            self.mastery_path(signals, &open, stamp),
        ]
        .into_iter()
        .flatten()
        .collect();

        paths.sort_by(|a, b| b.match_score.cmp(&a.match_score));
        paths.truncate(MAX_RECOMMENDATIONS);
        paths
    }

    fn category_matches(&self, course: &Course, weak: &CategoryPerformance) -> bool {
        let category = course.category.as_deref().unwrap_or_default().to_lowercase();
        self.matcher.mentions(&category, &weak.category)
    }

    /// 50 plus 20/15/10 per weak category found in category/title/description, capped at 100.
    pub fn weakness_relevance(&self, course: &Course, weak: &[CategoryPerformance]) -> u32 {
        let title = course.title.to_lowercase();
        let description = course.description.to_lowercase();
        let mut score = 50;
        for w in weak {
            if self.category_matches(course, w) {
                score += 20;
            }
            if self.matcher.mentions(&title, &w.category) {
                score += 15;
            }
            if self.matcher.mentions(&description, &w.category) {
                score += 10;
            }
        }
        score.min(100)
    }

    fn recommended(
        course: &Course,
        kind: PathKind,
        relevance_score: u32,
        addresses_weakness: Option<Vec<String>>,
    ) -> RecommendedCourse {
        RecommendedCourse {
            id: course.id,
            title: course.title.clone(),
            description: course.description.clone(),
            category: course.category.clone(),
            difficulty: course
                .level
                .clone()
                .filter(|l| !l.is_empty())
                .unwrap_or_else(|| kind.default_difficulty().to_string()),
            estimated_hours: course_hours(course).unwrap_or(kind.default_hours()),
            relevance_score,
            addresses_weakness,
        }
    }

    fn categories(courses: &[RecommendedCourse], dedupe: bool) -> Vec<String> {
        let mut skills: Vec<String> = Vec::new();
        for category in courses.iter().filter_map(|c| c.category.clone()) {
            if category.is_empty() || (dedupe && skills.contains(&category)) {
                continue;
            }
            skills.push(category);
        }
        skills
    }

    fn weakness_path(
        &self,
        signals: &LearnerSignals,
        open: &[&Course],
        stamp: i64,
    ) -> Option<LearningPathRecommendation> {
        let weak = &signals.weak_categories;
        if weak.is_empty() {
            return None;
        }

        let mut ranked: Vec<RecommendedCourse> = open
            .iter()
            .filter_map(|course| {
                let addressed: Vec<String> = weak
                    .iter()
                    .filter(|w| self.category_matches(course, w))
                    .map(|w| w.category.clone())
                    .collect();
                if addressed.is_empty() {
                    return None;
                }
                let relevance = self.weakness_relevance(course, weak);
                Some(Self::recommended(course, PathKind::Weakness, relevance, Some(addressed)))
            })
            .collect();
        ranked.sort_by(|a, b| b.relevance_score.cmp(&a.relevance_score));
        ranked.truncate(5);
        if ranked.is_empty() {
            return None;
        }

        let total_hours: f64 = ranked.iter().map(|c| c.estimated_hours).sum();
        let pace = if signals.audience_type.eq_ignore_ascii_case("business") {
            10.0
        } else {
            5.0
        };
        let mut skills: Vec<String> = Vec::new();
        for skill in ranked.iter().flat_map(|c| c.addresses_weakness.iter().flatten()) {
            if !skills.contains(skill) {
                skills.push(skill.clone());
            }
        }
        let weak_names: Vec<&str> = weak.iter().map(|w| w.category.as_str()).collect();

        Some(LearningPathRecommendation {
            id: format!("{}-{stamp}", PathKind::Weakness.as_str()),
            kind: PathKind::Weakness,
            title: "Skill Gap Elimination Path".to_string(),
            description: format!(
                "Focused on strengthening your weak areas: {}",
                weak_names.join(", ")
            ),
            reason: "Based on your assessment, we've identified areas where targeted learning can have the most impact."
                .to_string(),
            match_score: PathKind::Weakness.match_score(),
            estimated_weeks: weeks(total_hours, pace),
            estimated_hours: total_hours,
            difficulty: difficulty_for_level(&signals.current_level).to_string(),
            courses: ranked,
            skills,
            target_level: next_level(&signals.current_level).to_string(),
            benefits: strings(&[
                "Address your biggest skill gaps",
                "Build confidence in weak areas",
                "Become well-rounded in AI tools",
                "Achieve balanced proficiency",
            ]),
        })
    }

    fn career_path(
        &self,
        signals: &LearnerSignals,
        open: &[&Course],
        stamp: i64,
    ) -> Option<LearningPathRecommendation> {
        let kind = PathKind::Career;
        let courses: Vec<RecommendedCourse> = open
            .iter()
            .filter(|course| {
                let level = course.level.as_deref().unwrap_or_default().to_lowercase();
                let advanced = level == "advanced" || level == "intermediate";
                let relevant = match signals.industry.as_deref() {
                    Some(industry) => {
                        self.matcher.mentions(&course.title.to_lowercase(), industry)
                            || self.matcher.mentions(&course.description.to_lowercase(), industry)
                    }
                    None => true,
                };
                advanced && relevant
            })
            .take(4)
            .map(|course| Self::recommended(course, kind, kind.match_score(), None))
            .collect();
        if courses.is_empty() {
            return None;
        }

        let total_hours: f64 = courses.iter().map(|c| c.estimated_hours).sum();
        let description = match signals.industry.as_deref() {
            Some(industry) => format!(
                "Advanced courses designed to boost your professional capabilities in {industry}"
            ),
            None => "Advanced courses designed to boost your professional capabilities".to_string(),
        };

        Some(LearningPathRecommendation {
            id: format!("{}-{stamp}", kind.as_str()),
            kind,
            title: "Career Advancement Track".to_string(),
            description,
            reason: "Build expertise that sets you apart in your field".to_string(),
            match_score: kind.match_score(),
            estimated_weeks: weeks(total_hours, 8.0),
            estimated_hours: total_hours,
            difficulty: "advanced".to_string(),
            skills: Self::categories(&courses, false),
            courses,
            target_level: "expert".to_string(),
            benefits: strings(&[
                "Stand out in your profession",
                "Lead AI initiatives at work",
                "Command higher compensation",
                "Become a go-to expert",
            ]),
        })
    }

    fn quick_wins_path(
        &self,
        signals: &LearnerSignals,
        open: &[&Course],
        stamp: i64,
    ) -> Option<LearningPathRecommendation> {
        let kind = PathKind::QuickWins;
        let courses: Vec<RecommendedCourse> = open
            .iter()
            .filter(|course| {
                // Courses without an estimate are assumed too long to be quick.
                let quick = course_hours(course).unwrap_or(10.0) <= QUICK_COURSE_MAX_HOURS;
                quick && !signals.enrolled_courses.contains(&course.id)
            })
            .take(3)
            .map(|course| Self::recommended(course, kind, kind.match_score(), None))
            .collect();
        if courses.is_empty() {
            return None;
        }

        let total_hours: f64 = courses.iter().map(|c| c.estimated_hours).sum();
        Some(LearningPathRecommendation {
            id: format!("{}-{stamp}", kind.as_str()),
            kind,
            title: "Quick Wins Fast Track".to_string(),
            description: "Short, high-impact courses you can complete quickly to see immediate results"
                .to_string(),
            reason: "Build momentum with rapid skill acquisition".to_string(),
            match_score: kind.match_score(),
            estimated_weeks: 2,
            estimated_hours: total_hours,
            difficulty: difficulty_for_level(&signals.current_level).to_string(),
            skills: Self::categories(&courses, false),
            courses,
            target_level: signals.current_level.clone(),
            benefits: strings(&[
                "See results fast",
                "Build learning momentum",
                "Quick skill acquisition",
                "Immediate practical value",
            ]),
        })
    }

    fn mastery_path(
        &self,
        _signals: &LearnerSignals,
        open: &[&Course],
        stamp: i64,
    ) -> Option<LearningPathRecommendation> {
        let kind = PathKind::Mastery;
        let courses: Vec<RecommendedCourse> = open
            .iter()
            .take(8)
            .map(|course| Self::recommended(course, kind, kind.match_score(), None))
            .collect();
        if courses.is_empty() {
            return None;
        }

        let total_hours: f64 = courses.iter().map(|c| c.estimated_hours).sum();
        Some(LearningPathRecommendation {
            id: format!("{}-{stamp}", kind.as_str()),
            kind,
            title: "Complete AI Mastery Program".to_string(),
            description: "Comprehensive learning journey covering all aspects of AI tools and automation"
                .to_string(),
            reason: "Achieve complete mastery across all AI domains".to_string(),
            match_score: kind.match_score(),
            estimated_weeks: weeks(total_hours, 6.0),
            estimated_hours: total_hours,
            difficulty: "intermediate".to_string(),
            skills: Self::categories(&courses, true),
            courses,
            target_level: "expert".to_string(),
            benefits: strings(&[
                "Complete AI proficiency",
                "No skill gaps",
                "Maximum career impact",
                "Expert-level capabilities",
            ]),
        })
    }
}
