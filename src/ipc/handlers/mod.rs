pub mod activities;
pub mod attendance;
pub mod core;
pub mod grades;
pub mod recalc;
pub mod students;
pub mod weights;
