pub mod feedback;
pub mod health;
pub mod jobs;
pub mod optimize;
pub mod rules;
pub mod schedules;
