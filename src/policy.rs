//! Политики насыщения: что делать с задачей, которую пул не смог принять
//! ни свободным потоком, ни очередью.

use super::{
    errors::RejectedError,
    handle::Job,
    pool::ThreadPoolInner,
};
use tracing::{debug, warn};


pub trait SaturationPolicy: Send + Sync {
    fn rejected(&self, job: Job, pool: &ThreadPoolInner) -> Result<(), RejectedError>;
}

impl<F> SaturationPolicy for F
where
    F: Fn(Job, &ThreadPoolInner) -> Result<(), RejectedError> + Send + Sync,
{
    fn rejected(&self, job: Job, pool: &ThreadPoolInner) -> Result<(), RejectedError> {
        self(job, pool)
    }
}


/// Отказ с ошибкой вызывающему
#[derive(Debug, Default, Clone, Copy)]
pub struct AbortPolicy;

impl SaturationPolicy for AbortPolicy {
    fn rejected(&self, job: Job, pool: &ThreadPoolInner) -> Result<(), RejectedError> {
        drop(job);
        let err = pool.rejection();
        warn!(error = %err, "task rejected");
        Err(err)
    }
}


/// Задача выполняется в потоке, который её подал.
/// После shutdown задача молча выбрасывается
#[derive(Debug, Default, Clone, Copy)]
pub struct CallerRunsPolicy;

impl SaturationPolicy for CallerRunsPolicy {
    fn rejected(&self, job: Job, pool: &ThreadPoolInner) -> Result<(), RejectedError> {
        if !pool.is_shutdown() {
            debug!("running saturated task on the caller thread");
            pool.run_inline(job);
        }
        Ok(())
    }
}


/// Задача молча выбрасывается
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardPolicy;

impl SaturationPolicy for DiscardPolicy {
    fn rejected(&self, job: Job, _pool: &ThreadPoolInner) -> Result<(), RejectedError> {
        drop(job);
        debug!("saturated task discarded");
        Ok(())
    }
}


/// Выбрасывается самая старая задача из очереди, новая подаётся заново.
/// Если очередь пуста (например, rendezvous), выбрасывается сама новая задача
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardOldestPolicy;

impl SaturationPolicy for DiscardOldestPolicy {
    fn rejected(&self, job: Job, pool: &ThreadPoolInner) -> Result<(), RejectedError> {
        if pool.is_shutdown() {
            return Ok(());
        }
        match pool.queue().try_pop() {
            Some(oldest) => {
                drop(oldest);
                debug!("oldest queued task discarded");
                pool.readmit(job)
            }
            None => {
                drop(job);
                debug!("queue empty, saturated task discarded");
                Ok(())
            }
        }
    }
}
