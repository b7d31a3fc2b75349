use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::db::models::{AssessmentLink, ProgressUpdate, WorkflowProgress};
use crate::db::{now_rfc3339, CurriculumStore, StoreError};
use crate::services::lifecycle::{TransitionError, WorkflowStatus};
use crate::services::profile::{
    ExperienceLevel, LearnerProfile, LearningGoal, LearningStyle, NewLearnerProfile,
};

pub const DEFAULT_PROFILE_NAME: &str = "Untitled Profile";
pub const DEFAULT_HOURS_PER_WEEK: u32 = 5;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("step {order} is outside the workflow (1..={count})")]
    StepOutOfRange { order: u32, count: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Number,
    Select,
    Multiselect,
    Schedule,
}

impl FieldType {
    fn describe(self) -> &'static str {
        match self {
            FieldType::Text | FieldType::Select => "text",
            FieldType::Number => "a number",
            FieldType::Multiselect => "a list",
            FieldType::Schedule => "a schedule",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub label: String,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl FieldDefinition {
    fn new(name: &str, field_type: FieldType, label: &str, required: bool) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            label: label.to_string(),
            required,
            options: Vec::new(),
            min_length: None,
            max_length: None,
            min: None,
            max: None,
        }
    }

    fn length(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.min_length = min;
        self.max_length = max;
        self
    }

    fn bounds(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    fn options(mut self, options: &[&str]) -> Self {
        self.options = options.iter().map(|o| o.to_string()).collect();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    Form,
    Assessment,
    Selection,
    Review,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    pub step_order: u32,
    pub step_name: String,
    pub title: String,
    pub description: String,
    pub step_type: StepType,
    pub fields_to_collect: Vec<FieldDefinition>,
    pub is_required: bool,
    pub is_skippable: bool,
    pub estimated_minutes: u32,
}

/// The six-step profile wizard.
pub fn default_workflow_steps() -> Vec<WorkflowStep> {
    let levels: Vec<&str> = ExperienceLevel::ALL.iter().map(|l| l.as_str()).collect();
    vec![
        WorkflowStep {
            step_order: 1,
            step_name: "identity".to_string(),
            title: "Name your profile".to_string(),
            description: "Give this learning profile a name you will recognise".to_string(),
            step_type: StepType::Form,
            fields_to_collect: vec![
                FieldDefinition::new("profile_name", FieldType::Text, "Profile name", true)
                    .length(Some(3), Some(100)),
                FieldDefinition::new("description", FieldType::Text, "Description", false)
                    .length(None, Some(500)),
            ],
            is_required: true,
            is_skippable: false,
            estimated_minutes: 1,
        },
        WorkflowStep {
            step_order: 2,
            step_name: "background".to_string(),
            title: "Your background".to_string(),
            description: "Tell us where you are starting from".to_string(),
            step_type: StepType::Form,
            fields_to_collect: vec![
                FieldDefinition::new("target_audience", FieldType::Select, "Audience", true)
                    .options(&["student", "professional", "business", "educator"]),
                FieldDefinition::new("experience_level", FieldType::Select, "Experience level", true)
                    .options(&levels),
                FieldDefinition::new("industry", FieldType::Text, "Industry", false),
                FieldDefinition::new("job_role", FieldType::Text, "Job role", false),
                FieldDefinition::new("company_size", FieldType::Select, "Company size", false)
                    .options(&["1-10", "11-50", "51-200", "201-1000", "1000+"]),
                FieldDefinition::new("years_experience", FieldType::Number, "Years of experience", false)
                    .bounds(0.0, 60.0),
            ],
            is_required: true,
            is_skippable: false,
            estimated_minutes: 2,
        },
        WorkflowStep {
            step_order: 3,
            step_name: "goals".to_string(),
            title: "Learning goals".to_string(),
            description: "Pick what you want to achieve".to_string(),
            step_type: StepType::Selection,
            fields_to_collect: vec![FieldDefinition::new(
                "learning_goals",
                FieldType::Multiselect,
                "Learning goals",
                true,
            )],
            is_required: true,
            is_skippable: false,
            estimated_minutes: 2,
        },
        WorkflowStep {
            step_order: 4,
            step_name: "preferences".to_string(),
            title: "Learning preferences".to_string(),
            description: "How and when you like to learn".to_string(),
            step_type: StepType::Form,
            fields_to_collect: vec![
                FieldDefinition::new(
                    "preferred_learning_style",
                    FieldType::Select,
                    "Learning style",
                    true,
                )
                .options(&["visual", "reading", "hands-on", "mixed"]),
                FieldDefinition::new(
                    "available_hours_per_week",
                    FieldType::Number,
                    "Hours per week",
                    true,
                )
                .bounds(1.0, 80.0),
                FieldDefinition::new("preferred_schedule", FieldType::Schedule, "Schedule", false),
            ],
            is_required: true,
            is_skippable: false,
            estimated_minutes: 2,
        },
        WorkflowStep {
            step_order: 5,
            step_name: "assessment".to_string(),
            title: "Link an assessment".to_string(),
            description: "Use a completed assessment to personalise recommendations".to_string(),
            step_type: StepType::Assessment,
            fields_to_collect: vec![FieldDefinition::new(
                "latest_assessment_id",
                FieldType::Text,
                "Assessment",
                false,
            )],
            is_required: false,
            is_skippable: true,
            estimated_minutes: 1,
        },
        WorkflowStep {
            step_order: 6,
            step_name: "review".to_string(),
            title: "Review".to_string(),
            description: "Check your answers before creating the profile".to_string(),
            step_type: StepType::Review,
            fields_to_collect: Vec::new(),
            is_required: true,
            is_skippable: false,
            estimated_minutes: 1,
        },
    ]
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: BTreeMap<String, String>,
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        _ => false,
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        _ => is_blank(Some(value)),
    }
}

/// Checks one step's raw input. Absent optional fields skip the type rules;
/// a present field of the wrong JSON type is an error.
pub fn validate_step_data(step: &WorkflowStep, data: &Map<String, Value>) -> ValidationResult {
    let mut errors = BTreeMap::new();

    for field in &step.fields_to_collect {
        let value = data.get(&field.name);

        if field.required && is_blank(value) {
            errors.insert(field.name.clone(), format!("{} is required", field.label));
            continue;
        }
        let Some(value) = value else { continue };
        if !field.required && is_falsy(value) {
            continue;
        }

        match (field.field_type, value) {
            (FieldType::Text, Value::String(text)) => {
                let len = text.chars().count();
                if let Some(min) = field.min_length.filter(|min| len < *min) {
                    errors.insert(
                        field.name.clone(),
                        format!("{} must be at least {} characters", field.label, min),
                    );
                }
                if let Some(max) = field.max_length.filter(|max| len > *max) {
                    errors.insert(
                        field.name.clone(),
                        format!("{} must be at most {} characters", field.label, max),
                    );
                }
            }
            (FieldType::Number, Value::Number(number)) => {
                let n = number.as_f64().unwrap_or_default();
                if let Some(min) = field.min.filter(|min| n < *min) {
                    errors.insert(field.name.clone(), format!("{} must be at least {}", field.label, min));
                }
                if let Some(max) = field.max.filter(|max| n > *max) {
                    errors.insert(field.name.clone(), format!("{} must be at most {}", field.label, max));
                }
            }
            (FieldType::Text | FieldType::Select, Value::String(_)) => {}
            (FieldType::Multiselect, Value::Array(_)) => {}
            (FieldType::Schedule, _) => {}
            (expected, _) => {
                errors.insert(
                    field.name.clone(),
                    format!("{} must be {}", field.label, expected.describe()),
                );
            }
        }
    }

    ValidationResult {
        is_valid: errors.is_empty(),
        errors,
    }
}

/// Reads one field of a step. A wrong-typed value is dropped on its own so
/// the rest of the step survives.
fn field<T: DeserializeOwned>(fields: &Map<String, Value>, step: u32, name: &str) -> Option<T> {
    let value = fields.get(name).filter(|v| !v.is_null())?;
    match T::deserialize(value) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            tracing::warn!(step, field = name, error = %e, "dropping mistyped step field");
            None
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityStep {
    pub profile_name: Option<String>,
    pub description: Option<String>,
}

impl IdentityStep {
    fn from_fields(fields: &Map<String, Value>) -> Self {
        Self {
            profile_name: field(fields, 1, "profile_name"),
            description: field(fields, 1, "description"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundStep {
    pub target_audience: Option<String>,
    pub experience_level: Option<String>,
    pub industry: Option<String>,
    pub job_role: Option<String>,
    pub company_size: Option<String>,
    pub years_experience: Option<f64>,
}

impl BackgroundStep {
    fn from_fields(fields: &Map<String, Value>) -> Self {
        Self {
            target_audience: field(fields, 2, "target_audience"),
            experience_level: field(fields, 2, "experience_level"),
            industry: field(fields, 2, "industry"),
            job_role: field(fields, 2, "job_role"),
            company_size: field(fields, 2, "company_size"),
            years_experience: field(fields, 2, "years_experience"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoalsStep {
    pub learning_goals: Vec<GoalEntry>,
}

/// A selected goal, either a full goal object or a bare label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GoalEntry {
    Goal(LearningGoal),
    Label(String),
}

impl GoalsStep {
    /// Keeps every entry that reads as a goal; unreadable entries are skipped.
    fn from_fields(fields: &Map<String, Value>) -> Self {
        let entries: Vec<Value> = field(fields, 3, "learning_goals").unwrap_or_default();
        let learning_goals = entries
            .iter()
            .filter_map(|entry| match GoalEntry::deserialize(entry) {
                Ok(goal) => Some(goal),
                Err(e) => {
                    tracing::warn!(step = 3, error = %e, "dropping unreadable learning goal");
                    None
                }
            })
            .collect();
        Self { learning_goals }
    }

    pub fn goals(&self) -> Vec<LearningGoal> {
        self.learning_goals
            .iter()
            .map(|entry| match entry {
                GoalEntry::Goal(goal) => goal.clone(),
                GoalEntry::Label(label) => LearningGoal {
                    id: label.clone(),
                    label: label.clone(),
                    description: None,
                },
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreferencesStep {
    pub preferred_learning_style: Option<String>,
    pub available_hours_per_week: Option<f64>,
    pub preferred_schedule: Option<Value>,
}

impl PreferencesStep {
    fn from_fields(fields: &Map<String, Value>) -> Self {
        Self {
            preferred_learning_style: field(fields, 4, "preferred_learning_style"),
            available_hours_per_week: field(fields, 4, "available_hours_per_week"),
            preferred_schedule: field(fields, 4, "preferred_schedule"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssessmentLinkStep {
    pub latest_assessment_id: Option<String>,
}

impl AssessmentLinkStep {
    fn from_fields(fields: &Map<String, Value>) -> Self {
        Self {
            latest_assessment_id: field(fields, 5, "latest_assessment_id"),
        }
    }
}

/// Decoded form input for one step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepData {
    Identity(IdentityStep),
    Background(BackgroundStep),
    Goals(GoalsStep),
    Preferences(PreferencesStep),
    AssessmentLink(AssessmentLinkStep),
    /// Steps without fields of their own (review) or beyond the known set.
    Other(Map<String, Value>),
}

impl StepData {
    pub fn key(order: u32) -> String {
        format!("step_{order}")
    }

    /// Fails only when the step is not a JSON object. Fields are decoded one
    /// at a time.
    pub fn decode(order: u32, raw: &Value) -> Result<Self, serde_json::Error> {
        let fields = Map::<String, Value>::deserialize(raw)?;
        Ok(match order {
            1 => StepData::Identity(IdentityStep::from_fields(&fields)),
            2 => StepData::Background(BackgroundStep::from_fields(&fields)),
            3 => StepData::Goals(GoalsStep::from_fields(&fields)),
            4 => StepData::Preferences(PreferencesStep::from_fields(&fields)),
            5 => StepData::AssessmentLink(AssessmentLinkStep::from_fields(&fields)),
            _ => StepData::Other(fields),
        })
    }
}

/// Every profile-shaping step decoded from a progress record. Missing steps
/// and mistyped fields fall back to their defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectedSteps {
    pub identity: IdentityStep,
    pub background: BackgroundStep,
    pub goals: GoalsStep,
    pub preferences: PreferencesStep,
    pub assessment: AssessmentLinkStep,
}

impl CollectedSteps {
    pub fn from_step_data(step_data: &Map<String, Value>) -> Self {
        let mut collected = Self::default();
        for order in 1..=5 {
            let Some(raw) = step_data.get(&StepData::key(order)) else {
                continue;
            };
            match StepData::decode(order, raw) {
                Ok(StepData::Identity(step)) => collected.identity = step,
                Ok(StepData::Background(step)) => collected.background = step,
                Ok(StepData::Goals(step)) => collected.goals = step,
                Ok(StepData::Preferences(step)) => collected.preferences = step,
                Ok(StepData::AssessmentLink(step)) => collected.assessment = step,
                Ok(StepData::Other(_)) => {}
                Err(e) => {
                    tracing::warn!(step = order, error = %e, "step data is not an object, using defaults");
                }
            }
        }
        collected
    }

    pub fn profile_name(&self) -> String {
        self.identity
            .profile_name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PROFILE_NAME.to_string())
    }

    pub fn experience_level(&self) -> ExperienceLevel {
        self.background
            .experience_level
            .as_deref()
            .and_then(ExperienceLevel::parse)
            .unwrap_or_default()
    }

    pub fn learning_style(&self) -> LearningStyle {
        self.preferences
            .preferred_learning_style
            .as_deref()
            .and_then(LearningStyle::parse)
            .unwrap_or_default()
    }

    pub fn hours_per_week(&self) -> u32 {
        self.preferences
            .available_hours_per_week
            .filter(|h| h.is_finite() && *h >= 1.0)
            .map(|h| h.round() as u32)
            .unwrap_or(DEFAULT_HOURS_PER_WEEK)
    }

    pub fn assessment_id(&self) -> Option<&str> {
        self.assessment
            .latest_assessment_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryBackground {
    pub target_audience: String,
    pub experience_level: ExperienceLevel,
    pub industry: Option<String>,
    pub job_role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryPreferences {
    pub learning_style: LearningStyle,
    pub hours_per_week: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSummary {
    pub profile_name: String,
    pub description: Option<String>,
    pub background: SummaryBackground,
    pub learning_goals: Vec<LearningGoal>,
    pub preferences: SummaryPreferences,
    pub assessment_linked: bool,
}

impl From<&CollectedSteps> for WorkflowSummary {
    fn from(steps: &CollectedSteps) -> Self {
        WorkflowSummary {
            profile_name: steps.profile_name(),
            description: steps.identity.description.clone(),
            background: SummaryBackground {
                target_audience: steps.background.target_audience.clone().unwrap_or_default(),
                experience_level: steps.experience_level(),
                industry: steps.background.industry.clone(),
                job_role: steps.background.job_role.clone(),
            },
            learning_goals: steps.goals.goals(),
            preferences: SummaryPreferences {
                learning_style: steps.learning_style(),
                hours_per_week: steps.hours_per_week(),
            },
            assessment_linked: steps.assessment_id().is_some(),
        }
    }
}

/// Persisted multi-step wizard that collects a learner profile.
pub struct ProfileWorkflowService {
    store: Arc<dyn CurriculumStore>,
    steps: Vec<WorkflowStep>,
}

impl ProfileWorkflowService {
    pub fn new(store: Arc<dyn CurriculumStore>) -> Self {
        Self::with_steps(store, default_workflow_steps())
    }

    pub fn with_steps(store: Arc<dyn CurriculumStore>, mut steps: Vec<WorkflowStep>) -> Self {
        steps.sort_by_key(|s| s.step_order);
        Self { store, steps }
    }

    pub fn get_workflow_steps(&self) -> &[WorkflowStep] {
        &self.steps
    }

    pub fn get_step(&self, step_order: u32) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.step_order == step_order)
    }

    pub fn step_count(&self) -> u32 {
        self.steps.len() as u32
    }

    fn check_order(&self, order: u32) -> Result<(), WorkflowError> {
        let count = self.step_count();
        if order == 0 || order > count {
            return Err(WorkflowError::StepOutOfRange { order, count });
        }
        Ok(())
    }

    pub async fn get_or_create_progress(&self, user_id: &str) -> Result<WorkflowProgress, WorkflowError> {
        Ok(self.store.get_or_create_workflow_progress(user_id).await?)
    }

    pub async fn get_progress(&self, progress_id: &str) -> Result<WorkflowProgress, WorkflowError> {
        Ok(self.store.get_workflow_progress(progress_id).await?)
    }

    /// Replaces the stored input for `step_order` and marks the workflow in
    /// progress. Other steps' input is left as the store has it.
    pub async fn update_step_data(
        &self,
        progress_id: &str,
        step_order: u32,
        data: Map<String, Value>,
    ) -> Result<WorkflowProgress, WorkflowError> {
        self.check_order(step_order)?;
        let progress = self.store.get_workflow_progress(progress_id).await?;
        let status = progress.status.transition_to(WorkflowStatus::InProgress)?;

        let mut step_data = Map::new();
        step_data.insert(StepData::key(step_order), Value::Object(data));

        let update = ProgressUpdate {
            status: Some(status),
            step_data: Some(step_data),
            ..ProgressUpdate::default()
        };
        Ok(self.store.update_workflow_progress(progress_id, update).await?)
    }

    /// Records the step as done and moves forward. Never moves backwards and
    /// never records a step twice.
    pub async fn complete_step(
        &self,
        progress_id: &str,
        step_order: u32,
    ) -> Result<WorkflowProgress, WorkflowError> {
        self.check_order(step_order)?;
        let progress = self.store.get_workflow_progress(progress_id).await?;
        let status = progress.status.transition_to(WorkflowStatus::InProgress)?;

        let update = ProgressUpdate {
            status: Some(status),
            completed_step: Some(step_order),
            advance_to: Some((step_order + 1).min(self.step_count())),
            ..ProgressUpdate::default()
        };
        Ok(self.store.update_workflow_progress(progress_id, update).await?)
    }

    pub async fn go_to_step(
        &self,
        progress_id: &str,
        step_order: u32,
    ) -> Result<WorkflowProgress, WorkflowError> {
        self.check_order(step_order)?;
        let progress = self.store.get_workflow_progress(progress_id).await?;
        progress.status.ensure_open()?;

        let update = ProgressUpdate {
            current_step_order: Some(step_order),
            ..ProgressUpdate::default()
        };
        Ok(self.store.update_workflow_progress(progress_id, update).await?)
    }

    /// Steps back once; stays on step 1.
    pub async fn go_to_previous_step(&self, progress_id: &str) -> Result<WorkflowProgress, WorkflowError> {
        let progress = self.store.get_workflow_progress(progress_id).await?;
        progress.status.ensure_open()?;

        let previous = progress.current_step_order.saturating_sub(1).max(1);
        let update = ProgressUpdate {
            current_step_order: Some(previous),
            ..ProgressUpdate::default()
        };
        Ok(self.store.update_workflow_progress(progress_id, update).await?)
    }

    pub fn validate_step_data(
        &self,
        step_order: u32,
        data: &Map<String, Value>,
    ) -> Result<ValidationResult, WorkflowError> {
        let step = self.get_step(step_order).ok_or(WorkflowError::StepOutOfRange {
            order: step_order,
            count: self.step_count(),
        })?;
        Ok(validate_step_data(step, data))
    }

    pub async fn get_workflow_summary(&self, progress_id: &str) -> Result<WorkflowSummary, WorkflowError> {
        let progress = self.store.get_workflow_progress(progress_id).await?;
        let steps = CollectedSteps::from_step_data(&progress.step_data);
        Ok(WorkflowSummary::from(&steps))
    }

    /// Creates the learner profile from the collected steps and closes the
    /// workflow. A failed assessment link is logged and skipped.
    pub async fn finalize_workflow(&self, progress_id: &str) -> Result<LearnerProfile, WorkflowError> {
        let progress = self.store.get_workflow_progress(progress_id).await?;
        let status = progress.status.transition_to(WorkflowStatus::Completed)?;
        let steps = CollectedSteps::from_step_data(&progress.step_data);

        let has_primary = self.store.user_has_primary_profile(&progress.user_id).await?;
        let new_profile = NewLearnerProfile {
            user_id: progress.user_id.clone(),
            profile_name: steps.profile_name(),
            description: steps.identity.description.clone(),
            learning_goals: steps.goals.goals(),
            target_audience: steps.background.target_audience.clone().unwrap_or_default(),
            experience_level: steps.experience_level(),
            industry: steps.background.industry.clone(),
            job_role: steps.background.job_role.clone(),
            company_size: steps.background.company_size.clone(),
            years_experience: steps
                .background
                .years_experience
                .filter(|y| y.is_finite() && *y >= 0.0)
                .map(|y| y.round() as u32),
            preferred_learning_style: steps.learning_style(),
            available_hours_per_week: steps.hours_per_week(),
            preferred_schedule: steps
                .preferences
                .preferred_schedule
                .clone()
                .unwrap_or_else(|| Value::Object(Map::new())),
            latest_assessment_id: steps.assessment_id().map(str::to_string),
            is_primary: !has_primary,
        };

        let mut profile = self.store.create_learner_profile(new_profile).await?;

        if let Some(assessment_id) = steps.assessment_id() {
            if let Some(link) = self.link_assessment(&profile.id, assessment_id).await {
                profile.latest_assessment_id = Some(link.assessment_id);
                profile.irt_ability_score = link.irt_ability_score;
                profile.proficiency_areas = Some(link.proficiency_areas);
            }
        }

        let update = ProgressUpdate {
            status: Some(status),
            profile_id: Some(profile.id.clone()),
            completed_at: Some(now_rfc3339()),
            ..ProgressUpdate::default()
        };
        self.store.update_workflow_progress(progress_id, update).await?;

        tracing::info!(progress_id, profile_id = %profile.id, profile_name = %profile.profile_name, "profile created from workflow");
        Ok(profile)
    }

    async fn link_assessment(&self, profile_id: &str, assessment_id: &str) -> Option<AssessmentLink> {
        let assessment = match self.store.fetch_assessment(assessment_id).await {
            Ok(Some(assessment)) => assessment,
            Ok(None) => {
                tracing::warn!(profile_id, assessment_id, "assessment not found, profile created without it");
                return None;
            }
            Err(e) => {
                tracing::warn!(profile_id, assessment_id, error = %e, "could not load assessment for profile");
                return None;
            }
        };

        let link = AssessmentLink {
            assessment_id: assessment.id.clone(),
            irt_ability_score: assessment.ability_estimate,
            proficiency_areas: assessment.category_proficiency(),
        };
        match self
            .store
            .update_learner_profile_assessment(profile_id, link.clone())
            .await
        {
            Ok(()) => Some(link),
            Err(e) => {
                tracing::warn!(profile_id, assessment_id, error = %e, "could not link assessment to profile");
                None
            }
        }
    }

    pub async fn abandon_workflow(&self, progress_id: &str) -> Result<WorkflowProgress, WorkflowError> {
        let progress = self.store.get_workflow_progress(progress_id).await?;
        let status = progress.status.transition_to(WorkflowStatus::Abandoned)?;
        let update = ProgressUpdate {
            status: Some(status),
            ..ProgressUpdate::default()
        };
        Ok(self.store.update_workflow_progress(progress_id, update).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn step(order: u32) -> WorkflowStep {
        default_workflow_steps()
            .into_iter()
            .find(|s| s.step_order == order)
            .unwrap()
    }

    #[test]
    fn default_steps_are_numbered_and_only_assessment_is_skippable() {
        let steps = default_workflow_steps();
        let orders: Vec<_> = steps.iter().map(|s| s.step_order).collect();
        assert_eq!(orders, vec![1, 2, 3, 4, 5, 6]);
        let skippable: Vec<_> = steps.iter().filter(|s| s.is_skippable).map(|s| s.step_order).collect();
        assert_eq!(skippable, vec![5]);
    }

    #[test]
    fn required_fields_are_reported_by_name() {
        let result = validate_step_data(&step(1), &map(json!({ "profile_name": "" })));
        assert!(!result.is_valid);
        assert_eq!(result.errors["profile_name"], "Profile name is required");
        assert!(!result.errors.contains_key("description"));
    }

    #[test]
    fn text_length_bounds_apply() {
        let short = validate_step_data(&step(1), &map(json!({ "profile_name": "ab" })));
        assert_eq!(short.errors["profile_name"], "Profile name must be at least 3 characters");

        let long = "x".repeat(501);
        let result = validate_step_data(
            &step(1),
            &map(json!({ "profile_name": "Data", "description": long })),
        );
        assert_eq!(result.errors["description"], "Description must be at most 500 characters");
    }

    #[test]
    fn number_bounds_apply() {
        let result = validate_step_data(
            &step(4),
            &map(json!({ "preferred_learning_style": "visual", "available_hours_per_week": 90 })),
        );
        assert_eq!(result.errors["available_hours_per_week"], "Hours per week must be at most 80");

        let ok = validate_step_data(
            &step(4),
            &map(json!({ "preferred_learning_style": "visual", "available_hours_per_week": 6 })),
        );
        assert!(ok.is_valid);
    }

    #[test]
    fn absent_optional_fields_are_skipped() {
        let result = validate_step_data(
            &step(2),
            &map(json!({ "target_audience": "professional", "experience_level": "beginner" })),
        );
        assert!(result.is_valid, "{:?}", result.errors);
    }

    #[test]
    fn empty_goal_selection_counts_as_missing() {
        let result = validate_step_data(&step(3), &map(json!({ "learning_goals": [] })));
        assert!(result.errors.contains_key("learning_goals"));
    }

    #[test]
    fn summary_defaults_fill_missing_steps() {
        let summary = WorkflowSummary::from(&CollectedSteps::from_step_data(&Map::new()));
        assert_eq!(summary.profile_name, DEFAULT_PROFILE_NAME);
        assert_eq!(summary.background.experience_level, ExperienceLevel::Beginner);
        assert_eq!(summary.preferences.learning_style, LearningStyle::Mixed);
        assert_eq!(summary.preferences.hours_per_week, 5);
        assert!(!summary.assessment_linked);
    }

    #[test]
    fn mistyped_field_is_dropped_alone() {
        let data = map(json!({
            "step_1": { "profile_name": 42, "description": "kept" },
            "step_2": { "target_audience": "professional", "experience_level": "advanced", "years_experience": "5" },
            "step_4": { "preferred_learning_style": "hands-on", "available_hours_per_week": 12 }
        }));
        let steps = CollectedSteps::from_step_data(&data);
        assert_eq!(steps.profile_name(), DEFAULT_PROFILE_NAME);
        assert_eq!(steps.identity.description.as_deref(), Some("kept"));
        assert_eq!(steps.experience_level(), ExperienceLevel::Advanced);
        assert_eq!(steps.background.target_audience.as_deref(), Some("professional"));
        assert_eq!(steps.background.years_experience, None);
        assert_eq!(steps.learning_style(), LearningStyle::HandsOn);
        assert_eq!(steps.hours_per_week(), 12);
    }

    #[test]
    fn non_object_step_uses_defaults() {
        let data = map(json!({ "step_2": "advanced" }));
        assert!(StepData::decode(2, &data["step_2"]).is_err());
        let steps = CollectedSteps::from_step_data(&data);
        assert_eq!(steps.background, BackgroundStep::default());
    }

    #[test]
    fn wrong_json_types_are_reported() {
        let background = validate_step_data(
            &step(2),
            &map(json!({ "target_audience": "professional", "experience_level": "advanced", "years_experience": "5" })),
        );
        assert!(!background.is_valid);
        assert_eq!(background.errors["years_experience"], "Years of experience must be a number");
        assert_eq!(background.errors.len(), 1);

        let preferences = validate_step_data(
            &step(4),
            &map(json!({ "preferred_learning_style": 3, "available_hours_per_week": "12" })),
        );
        assert_eq!(preferences.errors["preferred_learning_style"], "Learning style must be text");
        assert_eq!(preferences.errors["available_hours_per_week"], "Hours per week must be a number");

        let goals = validate_step_data(&step(3), &map(json!({ "learning_goals": "automation" })));
        assert_eq!(goals.errors["learning_goals"], "Learning goals must be a list");
    }

    #[test]
    fn unreadable_goal_entries_are_skipped() {
        let data = map(json!({ "step_3": { "learning_goals": ["automation", 7, { "id": "g2", "label": "Prompting" }] } }));
        let goals = CollectedSteps::from_step_data(&data).goals.goals();
        assert_eq!(goals.len(), 2);
        assert_eq!(goals[1].id, "g2");
    }

    #[test]
    fn goals_accept_labels_and_objects() {
        let data = map(json!({
            "step_3": { "learning_goals": ["automation", { "id": "g2", "label": "Prompting" }] }
        }));
        let goals = CollectedSteps::from_step_data(&data).goals.goals();
        assert_eq!(goals[0].id, "automation");
        assert_eq!(goals[1].label, "Prompting");
    }
}
