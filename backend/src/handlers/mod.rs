pub mod auth;
pub mod habit_logs;
pub mod habits;
pub mod health;
pub mod tasks;
pub mod users;
