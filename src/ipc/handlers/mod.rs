pub mod assessments;
pub mod classes;
pub mod core;
pub mod edits;
pub mod exclusions;
pub mod grid;
pub mod session;
pub mod students;
