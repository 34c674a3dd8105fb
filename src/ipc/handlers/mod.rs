pub mod attendance;
pub mod backup;
pub mod calendar;
pub mod classes;
pub mod classrooms;
pub mod core;
pub mod finance;
pub mod homework;
pub mod insights;
pub mod lessons;
pub mod navigation;
pub mod payroll;
pub mod schedule;
pub mod students;
pub mod teachers;
