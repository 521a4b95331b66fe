//! Scale-first: пул сначала наращивает потоки до max и только потом
//! складывает задачи в очередь.
//!
//! Обычный порядок приёма задачи: core-поток, затем очередь, затем поток
//! сверх core, затем политика насыщения. Две обёртки переворачивают его:
//!
//! - [`ScaleFirstQueue`] всегда отвечает "очередь полна" на `try_push`,
//!   поэтому пул каждый раз пытается создать новый поток;
//! - [`ReEnqueuePolicy`] срабатывает, когда потоков уже max, и кладёт задачу
//!   в настоящую очередь блокирующим `push`.
//!
//! Состояния у обёрток нет, синхронизацию обеспечивает сама очередь.

use super::{
    errors::RejectedError,
    handle::Job,
    policy::SaturationPolicy,
    pool::ThreadPoolInner,
    queue::WorkQueue,
};
use crossbeam::channel::{
    RecvError,
    RecvTimeoutError,
    SendError,
    TrySendError,
};
use std::time::Duration;
use tracing::trace;


/// Очередь, которая всегда "полна" для неблокирующей вставки
pub struct ScaleFirstQueue {
    inner: Box<dyn WorkQueue>,
}

impl ScaleFirstQueue {
    pub fn new(inner: Box<dyn WorkQueue>) -> Self {
        Self { inner }
    }
}

impl WorkQueue for ScaleFirstQueue {
    #[inline]
    fn try_push(&self, job: Job) -> Result<(), TrySendError<Job>> {
        Err(TrySendError::Full(job))
    }

    fn push(&self, job: Job) -> Result<(), SendError<Job>> {
        self.inner.push(job)
    }

    fn pop(&self) -> Result<Job, RecvError> {
        self.inner.pop()
    }

    fn pop_timeout(&self, timeout: Duration) -> Result<Job, RecvTimeoutError> {
        self.inner.pop_timeout(timeout)
    }

    fn try_pop(&self) -> Option<Job> {
        self.inner.try_pop()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn capacity(&self) -> Option<usize> {
        self.inner.capacity()
    }

    fn drain(&self) -> Vec<Job> {
        self.inner.drain()
    }

    fn close(&self) {
        self.inner.close()
    }
}


/// Возвращает отвергнутую задачу в настоящую очередь.
///
/// Блокирует подающий поток, пока в очереди нет места. Исходная политика
/// вызывается, только если пул остановлен или очередь отказалась принять
/// задачу.
pub struct ReEnqueuePolicy {
    fallback: Box<dyn SaturationPolicy>,
}

impl ReEnqueuePolicy {
    pub fn new(fallback: Box<dyn SaturationPolicy>) -> Self {
        Self { fallback }
    }
}

impl SaturationPolicy for ReEnqueuePolicy {
    fn rejected(&self, job: Job, pool: &ThreadPoolInner) -> Result<(), RejectedError> {
        if pool.is_shutdown() {
            return self.fallback.rejected(job, pool);
        }

        match pool.queue().push(job) {
            Ok(()) => {
                trace!(queued = pool.queued_count(), "task re-enqueued");
                // push мог ждать места, пока пул останавливался или воркеры уходили по keep-alive
                pool.recheck_after_enqueue();
                Ok(())
            }
            Err(SendError(job)) => self.fallback.rejected(job, pool),
        }
    }
}


/// Оборачивает очередь и политику для scale-first приёма задач
pub(crate) fn install(
    queue: Box<dyn WorkQueue>,
    policy: Box<dyn SaturationPolicy>,
) -> (Box<dyn WorkQueue>, Box<dyn SaturationPolicy>) {
    (
        Box::new(ScaleFirstQueue::new(queue)),
        Box::new(ReEnqueuePolicy::new(policy)),
    )
}
