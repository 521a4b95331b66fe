use std::io;
use thiserror::Error;


/// Ошибка выполнения задачи, приходит через `TaskHandle`
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum TaskError {
    #[error("task panicked: {0}")]
    Panic(String),
    #[error("task was cancelled before it started")]
    Cancelled,
    #[error("task was dropped without running")]
    Discarded,
    #[error("timed out waiting for the task result")]
    Timeout,
}

pub type TaskResult<T> = Result<T, TaskError>;


/// Пул не принял задачу. Возвращается только политикой насыщения
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum RejectedError {
    #[error("pool saturated: {pool_size} threads busy, {queued} tasks queued")]
    Saturated { pool_size: usize, queued: usize },
    #[error("pool is shut down")]
    Shutdown,
}


#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid pool size: core {core} must not exceed max {max}, max must be positive")]
    InvalidPoolSize { core: usize, max: usize },
    #[error("failed to start worker thread: {0}")]
    ThreadSpawn(#[from] io::Error),
}
