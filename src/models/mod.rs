pub mod student;

pub use student::{Course, NewStudent, Student, StudentUpdate};
