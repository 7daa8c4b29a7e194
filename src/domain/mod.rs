pub mod conflict;
pub mod models;
pub mod overdue;
pub mod quota;
pub mod reassignment;
pub mod recurrence;
pub mod task_tree;
pub mod time_block;
