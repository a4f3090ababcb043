pub mod manager;
pub mod sqlite;

pub use manager::{DatabaseManager, MIGRATOR};
pub use sqlite::{
    SqliteAssignmentRepository, SqliteIdentityRepository, SqliteJobRepository,
    SqliteTaskRepository, SqliteWorkerRepository,
};
