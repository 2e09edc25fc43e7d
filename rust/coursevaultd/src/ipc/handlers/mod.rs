pub mod assignments;
pub mod backup;
pub mod core;
pub mod courses;
pub mod semesters;
pub mod settings;
