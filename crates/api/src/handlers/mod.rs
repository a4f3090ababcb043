pub mod health;
pub mod jobs;
pub mod tasks;
pub mod users;
pub mod workers;
