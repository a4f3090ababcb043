pub mod assignment;
pub mod job;
pub mod messages;
pub mod task;
pub mod worker;

pub use assignment::{IssuedToken, Principal, Token, UserAssignment};
pub use messages::{
    ErrorReply, IdReply, RunAction, RunCommand, TaskLaunchReply, TaskLaunchRequest, TaskStatusReport,
    ValidateReply, ValidateRequest, WorkerGetReply, WorkerGetRequest, WorkerReloadRequest,
    WorkerSummary,
};
pub use job::{Job, JobStatus, JobTarget, JobTaskSummary, NewJob, NewJobTarget, NewTask};
pub use task::{Action, Task, TaskFilter, TaskStatus};
pub use worker::{Tags, Worker, WorkerFilter, WorkerRegistration};
