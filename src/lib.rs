//! Time-based planning engine.
//!
//! Places task, habit and project occurrences on a calendar, expands
//! recurrences, groups a day into morning/afternoon/evening blocks, tracks
//! progress against a daily quota and reassigns occurrences through drag,
//! resize and overdue rescheduling.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::bootstrap::{bootstrap_workspace, open_planner, sqlite_planner, SqlitePlanner};
pub use application::planner::{
    BulkFailure, BulkOutcome, Clock, ConflictWarning, DropOutcome, PlannerError, PlannerService,
    Reassignment,
};
pub use domain::models::{
    BlockCapacity, DateRange, EntityRef, EntityType, EventStatus, RecurrenceConfig, ResizePolicy,
    TimeBlock, TimeBlockBoundaries, TimeEvent,
};
pub use domain::reassignment::{DragPayload, DropTarget, ResizeSession, ScheduleRequest};
pub use infrastructure::config::PlannerConfig;
pub use infrastructure::error::InfraError;
