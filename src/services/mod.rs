pub mod approval;
pub mod course;
pub mod curriculum;
pub mod learning_paths;
pub mod lifecycle;
pub mod profile;
pub mod scoring;
pub mod sequencer;
pub mod workflow;
