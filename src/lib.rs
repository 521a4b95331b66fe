//! Ограниченный пул потоков с пошаговой (typestate) сборкой
//!
//! # Features
//! - Builder, в котором неполную конфигурацию нельзя собрать
//! - Fixed и elastic пулы, keep-alive для лишних потоков
//! - Scale-first: сначала новые потоки до max, очередь только потом
//! - Rendezvous, ограниченная и неограниченная очереди, свои очереди через `WorkQueue`
//! - Политики насыщения: abort, caller-runs, discard, discard-oldest, свои
//! - Graceful и immediate shutdown, метрики пула

pub mod builder;
pub mod errors;
pub mod factory;
pub mod handle;
pub mod model;
pub mod policy;
pub mod pool;
pub mod queue;
pub mod scale_first;

pub use builder::{PoolSettings, ThreadPoolBuilder};
pub use handle::{Job, TaskHandle};
pub use model::{AdmissionMode, PoolMetrics, ShutdownMode};
pub use pool::{PoolConfig, ThreadPool, ThreadPoolInner};

/// Начало пошаговой сборки пула, то же что [`ThreadPoolBuilder::new`]
pub fn builder() -> ThreadPoolBuilder<builder::stage::Start> {
    ThreadPoolBuilder::new()
}
