//! 任务状态转换表
//!
//! | 当前 | 上报 | 结果 |
//! |---|---|---|
//! | STARTING, RUNNING | RUNNING | RUNNING |
//! | RUNNING | FINISHED | FINISHED |
//! | 任意非终态 | FAILED | FAILED |
//!
//! 启动(PENDING/LOST -> STARTING)由 [`crate::TaskDispatcher::launch`] 单独处理。

use herqles_core::models::TaskStatus;

/// 返回上报状态被接受后的新状态，非法转换返回 `None`
pub fn next_status(current: TaskStatus, reported: TaskStatus) -> Option<TaskStatus> {
    use TaskStatus::*;

    match (current, reported) {
        (Starting | Running, Running) => Some(Running),
        (Running, Finished) => Some(Finished),
        (current, Failed) if !current.is_terminal() => Some(Failed),
        _ => None,
    }
}

/// 进入该状态时需要记录停止时间
pub fn stops_task(status: TaskStatus) -> bool {
    status.is_terminal()
}
