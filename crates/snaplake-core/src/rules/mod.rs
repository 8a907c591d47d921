pub mod cron;
pub mod sql_guard;
pub mod validation;
