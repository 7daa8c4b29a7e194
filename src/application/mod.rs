pub mod bootstrap;
pub mod planner;
