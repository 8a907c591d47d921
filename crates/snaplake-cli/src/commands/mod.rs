pub mod datasource;
pub mod query;
pub mod serve;
pub mod setup;
pub mod snapshot;
