pub mod habit_stats;
