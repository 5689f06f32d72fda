//! utility modules used throughout the project
/// logger setup shared by the solvers (terminal + optional file)
pub mod logger;
