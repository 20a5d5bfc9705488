pub mod core;
pub mod quizzes;
pub mod students;
