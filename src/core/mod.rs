pub mod config;
pub mod harvest;
pub mod paths;
pub mod record;
