use super::{
    errors::{BuildError, RejectedError},
    factory::{DefaultThreadFactory, ThreadFactory},
    handle::{
        self,
        Job,
        TaskHandle,
    },
    model::{
        PoolMetrics,
        ShutdownMode,
    },
    policy::{AbortPolicy, SaturationPolicy},
    queue::WorkQueue,
};
use std::{
    fmt,
    future::Future,
    io,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering},
        Arc,
        Weak,
    },
    time::{Duration, Instant},
};
use crossbeam::channel::RecvTimeoutError;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, trace, warn};


const RUNNING: u8 = 0;
const SHUTDOWN: u8 = 1;
const STOP: u8 = 2;
const TERMINATED: u8 = 3;


/// Готовая конфигурация пула.
///
/// Обычно собирается через [`crate::builder()`], который гарантирует её
/// корректность. При прямом создании размеры проверяет
/// [`ThreadPoolInner::with_config`].
pub struct PoolConfig {
    pub core_size: usize,
    pub max_size: usize,
    /// Сколько простаивает поток сверх core (или любой, если разрешён
    /// core timeout), прежде чем завершиться
    pub keep_alive: Duration,
    pub allow_core_timeout: bool,
    pub queue: Box<dyn WorkQueue>,
    pub thread_factory: Box<dyn ThreadFactory>,
    pub prestart_core_threads: bool,
    pub saturation_policy: Box<dyn SaturationPolicy>,
}

impl PoolConfig {
    /// Конфигурация с фабрикой потоков и политикой насыщения по умолчанию
    pub fn new(
        core_size: usize,
        max_size: usize,
        keep_alive: Duration,
        queue: Box<dyn WorkQueue>,
    ) -> Self {
        Self {
            core_size,
            max_size,
            keep_alive,
            allow_core_timeout: false,
            queue,
            thread_factory: Box::new(DefaultThreadFactory),
            prestart_core_threads: false,
            saturation_policy: Box::new(AbortPolicy),
        }
    }
}

impl fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfig")
            .field("core_size", &self.core_size)
            .field("max_size", &self.max_size)
            .field("keep_alive", &self.keep_alive)
            .field("allow_core_timeout", &self.allow_core_timeout)
            .field("queue_capacity", &self.queue.capacity())
            .field("prestart_core_threads", &self.prestart_core_threads)
            .finish_non_exhaustive()
    }
}


pub type ThreadPool = Arc<ThreadPoolInner>;


enum AddWorker {
    Added,
    Refused(Option<Job>),
    Failed(io::Error, Option<Job>),
}


/// Пул потоков с ограниченным числом воркеров.
///
/// Приём задачи: пока потоков меньше core, создаётся новый поток; иначе
/// задача кладётся в очередь; если очередь отказала, создаётся поток
/// до max; если и это невозможно, срабатывает политика насыщения.
///
/// Воркеры держат ссылку на пул, поэтому пул живёт до вызова
/// [`shutdown`](Self::shutdown) и завершения всех воркеров.
pub struct ThreadPoolInner {
    this: Weak<ThreadPoolInner>,
    core_size: usize,
    max_size: usize,
    keep_alive: Duration,
    allow_core_timeout: AtomicBool,
    queue: Box<dyn WorkQueue>,
    thread_factory: Box<dyn ThreadFactory>,
    handler: Box<dyn SaturationPolicy>,
    state: AtomicU8,
    worker_count: AtomicUsize,
    next_worker_id: AtomicUsize,
    largest_pool_size: AtomicUsize,
    active_tasks: AtomicUsize,
    total_submitted: AtomicUsize,
    completed_tasks: AtomicUsize,
    failed_tasks: AtomicUsize,
    saturation_events: AtomicUsize,
    termination: Mutex<()>,
    terminated: Condvar,
}

impl ThreadPoolInner {
    pub fn with_config(config: PoolConfig) -> Result<ThreadPool, BuildError> {
        let PoolConfig {
            core_size,
            max_size,
            keep_alive,
            allow_core_timeout,
            queue,
            thread_factory,
            prestart_core_threads,
            saturation_policy,
        } = config;

        if max_size == 0 || core_size > max_size {
            return Err(BuildError::InvalidPoolSize { core: core_size, max: max_size });
        }

        let pool = Arc::new_cyclic(|this| ThreadPoolInner {
            this: this.clone(),
            core_size,
            max_size,
            keep_alive,
            allow_core_timeout: AtomicBool::new(false),
            queue,
            thread_factory,
            handler: saturation_policy,
            state: AtomicU8::new(RUNNING),
            worker_count: AtomicUsize::new(0),
            next_worker_id: AtomicUsize::new(0),
            largest_pool_size: AtomicUsize::new(0),
            active_tasks: AtomicUsize::new(0),
            total_submitted: AtomicUsize::new(0),
            completed_tasks: AtomicUsize::new(0),
            failed_tasks: AtomicUsize::new(0),
            saturation_events: AtomicUsize::new(0),
            termination: Mutex::new(()),
            terminated: Condvar::new(),
        });

        pool.allow_core_thread_timeout(allow_core_timeout);

        if prestart_core_threads {
            if let Err(err) = pool.prestart_core_threads() {
                pool.shutdown(ShutdownMode::Immediate);
                return Err(err);
            }
        }

        debug!(core_size, max_size, ?keep_alive, allow_core_timeout, "thread pool created");
        Ok(pool)
    }

    pub fn execute<F>(&self, f: F) -> Result<(), RejectedError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.execute_job(Job::new(f))
    }

    pub fn submit<T, F>(&self, f: F) -> Result<TaskHandle<T>, RejectedError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (job, handle) = handle::task(f);
        self.execute_job(job)?;
        Ok(handle)
    }

    /// Future выполняется на воркере до завершения, занимая поток целиком
    pub fn spawn<T, Fut>(&self, fut: Fut) -> Result<TaskHandle<T>, RejectedError>
    where
        T: Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        self.submit(move || futures::executor::block_on(fut))
    }

    pub fn execute_job(&self, job: Job) -> Result<(), RejectedError> {
        self.total_submitted.fetch_add(1, Ordering::Relaxed);
        self.readmit(job)
    }

    /// Повторный приём задачи без учёта в `total_submitted`.
    /// Нужен политикам насыщения, которые возвращают задачу в пул
    pub fn readmit(&self, job: Job) -> Result<(), RejectedError> {
        if !self.is_running() {
            return self.reject(job);
        }

        let job = if self.pool_size() < self.core_size {
            match self.start_with(job, true) {
                None => return Ok(()),
                Some(job) => job,
            }
        } else {
            job
        };

        let job = match self.queue.try_push(job) {
            Ok(()) => {
                trace!(queued = self.queued_count(), "task queued");
                self.recheck_after_enqueue();
                return Ok(());
            }
            Err(err) => err.into_inner(),
        };

        match self.start_with(job, false) {
            None => Ok(()),
            Some(job) => self.reject(job),
        }
    }

    fn reject(&self, job: Job) -> Result<(), RejectedError> {
        self.saturation_events.fetch_add(1, Ordering::Relaxed);
        trace!(
            pool_size = self.pool_size(),
            queued = self.queued_count(),
            "pool saturated"
        );
        self.handler.rejected(job, self)
    }

    /// Ошибка, которой отказывает [`AbortPolicy`]
    pub fn rejection(&self) -> RejectedError {
        if self.is_shutdown() {
            RejectedError::Shutdown
        } else {
            RejectedError::Saturated {
                pool_size: self.pool_size(),
                queued: self.queued_count(),
            }
        }
    }

    /// Выполнить задачу в текущем потоке с учётом в метриках
    pub(crate) fn run_inline(&self, job: Job) {
        self.run_job(job);
    }

    /// Вызывается после того, как задача попала в очередь.
    ///
    /// Если за это время случился immediate shutdown, воркеры уже не
    /// заберут задачу и она не попала в список, который вернул `shutdown`.
    /// Такие задачи выбрасываются, их handle получает `TaskError::Discarded`
    pub(crate) fn recheck_after_enqueue(&self) {
        if self.state.load(Ordering::Acquire) >= STOP {
            let stranded = self.queue.drain();
            if !stranded.is_empty() {
                debug!(discarded = stranded.len(), "tasks enqueued after stop discarded");
            }
            drop(stranded);
            self.try_terminate();
            return;
        }
        self.ensure_worker();
    }

    /// Запускает воркер без задачи, если в пуле не осталось ни одного
    pub(crate) fn ensure_worker(&self) {
        if self.pool_size() == 0 {
            if let AddWorker::Failed(err, _) = self.add_worker(None, false) {
                warn!(error = %err, "failed to start worker thread");
            }
        }
    }

    /// Возвращает задачу обратно, если поток не был создан
    fn start_with(&self, job: Job, core: bool) -> Option<Job> {
        match self.add_worker(Some(job), core) {
            AddWorker::Added => None,
            AddWorker::Refused(job) => job,
            AddWorker::Failed(err, job) => {
                warn!(error = %err, "failed to start worker thread");
                job
            }
        }
    }

    fn add_worker(&self, first: Option<Job>, core: bool) -> AddWorker {
        let limit = if core { self.core_size } else { self.max_size };

        let size = loop {
            let state = self.state.load(Ordering::Acquire);
            if state >= STOP || (state == SHUTDOWN && (first.is_some() || self.queue.is_empty())) {
                return AddWorker::Refused(first);
            }

            let wc = self.worker_count.load(Ordering::Acquire);
            if wc >= limit {
                return AddWorker::Refused(first);
            }

            if self.worker_count
                .compare_exchange_weak(wc, wc + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break wc + 1;
            }
        };

        // shutdown мог случиться между проверкой состояния и CAS
        let state = self.state.load(Ordering::Acquire);
        let pool = match self.this.upgrade() {
            Some(pool) if state < STOP && !(state >= SHUTDOWN && first.is_some()) => pool,
            _ => {
                self.worker_count.fetch_sub(1, Ordering::AcqRel);
                self.try_terminate();
                return AddWorker::Refused(first);
            }
        };

        let id = self.next_worker_id.fetch_add(1, Ordering::Relaxed) + 1;
        let slot = Arc::new(Mutex::new(first));
        let handoff = Arc::clone(&slot);

        let spawned = self.thread_factory.spawn(Box::new(move || {
            let first = handoff.lock().take();
            pool.run_worker(id, first);
        }));

        match spawned {
            Ok(_detached) => {
                self.largest_pool_size.fetch_max(size, Ordering::Relaxed);
                debug!(worker = id, pool_size = size, core, "worker started");
                AddWorker::Added
            }
            Err(err) => {
                self.worker_count.fetch_sub(1, Ordering::AcqRel);
                self.try_terminate();
                let first = slot.lock().take();
                AddWorker::Failed(err, first)
            }
        }
    }

    fn run_worker(&self, id: usize, first: Option<Job>) {
        let mut next = first;
        while let Some(job) = next.take().or_else(|| self.get_task()) {
            self.run_job(job);
        }
        self.process_worker_exit(id);
    }

    fn run_job(&self, job: Job) {
        self.active_tasks.fetch_add(1, Ordering::Relaxed);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| job.run()));
        self.active_tasks.fetch_sub(1, Ordering::Relaxed);

        match outcome {
            Ok(()) => {
                self.completed_tasks.fetch_add(1, Ordering::Relaxed);
            }
            Err(payload) => {
                self.failed_tasks.fetch_add(1, Ordering::Relaxed);
                debug!(panic = %handle::panic_message(payload.as_ref()), "task panicked");
            }
        }
    }

    /// Следующая задача для воркера. `None` означает, что воркер должен
    /// завершиться, счётчик потоков к этому моменту уже уменьшен
    fn get_task(&self) -> Option<Job> {
        let mut timed_out = false;

        loop {
            if self.state.load(Ordering::Acquire) >= STOP {
                self.worker_count.fetch_sub(1, Ordering::AcqRel);
                return None;
            }

            let wc = self.worker_count.load(Ordering::Acquire);
            let timed = self.allow_core_timeout.load(Ordering::Acquire) || wc > self.core_size;

            if timed && timed_out && (wc > 1 || self.queue.is_empty()) {
                if self.worker_count
                    .compare_exchange(wc, wc - 1, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    return None;
                }
                continue;
            }

            let polled = if timed {
                self.queue.pop_timeout(self.keep_alive)
            } else {
                self.queue.pop().map_err(|_| RecvTimeoutError::Disconnected)
            };

            match polled {
                Ok(job) => return Some(job),
                Err(RecvTimeoutError::Timeout) => timed_out = true,
                // очередь закрыта и пуста
                Err(RecvTimeoutError::Disconnected) => {
                    self.worker_count.fetch_sub(1, Ordering::AcqRel);
                    return None;
                }
            }
        }
    }

    fn process_worker_exit(&self, id: usize) {
        debug!(worker = id, pool_size = self.pool_size(), "worker exited");
        self.try_terminate();

        if self.state.load(Ordering::Acquire) >= STOP {
            return;
        }

        let min = if self.allow_core_timeout.load(Ordering::Acquire) {
            usize::from(!self.queue.is_empty())
        } else {
            self.core_size
        };

        if self.pool_size() < min {
            if let AddWorker::Failed(err, _) = self.add_worker(None, false) {
                warn!(error = %err, "failed to replace exited worker");
            }
        }
    }

    fn try_terminate(&self) {
        let state = self.state.load(Ordering::Acquire);
        if state == RUNNING || state == TERMINATED {
            return;
        }
        if state == SHUTDOWN && !self.queue.is_empty() {
            return;
        }
        if self.pool_size() != 0 {
            return;
        }

        let _guard = self.termination.lock();
        if self.state
            .compare_exchange(state, TERMINATED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            info!(
                completed = self.completed_count(),
                failed = self.failed_tasks.load(Ordering::Relaxed),
                "thread pool terminated"
            );
            self.terminated.notify_all();
        }
    }

    /// Создаёт все core-потоки сразу. Возвращает число созданных потоков
    ///
    /// Не больше `core_size` попыток: при core timeout и нулевом keep-alive
    /// потоки завершаются сразу и место под них освобождается снова
    pub fn prestart_core_threads(&self) -> Result<usize, BuildError> {
        let mut started = 0;
        for _ in 0..self.core_size {
            match self.add_worker(None, true) {
                AddWorker::Added => started += 1,
                AddWorker::Refused(_) => break,
                AddWorker::Failed(err, _) => return Err(BuildError::ThreadSpawn(err)),
            }
        }
        Ok(started)
    }

    /// Разрешает завершать простаивающие core-потоки по keep-alive.
    /// Уже ждущие задачу без таймаута воркеры заметят это после следующей задачи
    pub fn allow_core_thread_timeout(&self, value: bool) {
        self.allow_core_timeout.store(value, Ordering::Release);
    }

    /// Останавливает приём задач. `Immediate` очищает очередь и
    /// возвращает невыполненные задачи, `Graceful` даёт им доработать
    pub fn shutdown(&self, mode: ShutdownMode) -> Vec<Job> {
        let target = match mode {
            ShutdownMode::Graceful => SHUTDOWN,
            ShutdownMode::Immediate => STOP,
        };
        self.state.fetch_max(target, Ordering::AcqRel);
        self.queue.close();

        let pending = match mode {
            ShutdownMode::Graceful => Vec::new(),
            ShutdownMode::Immediate => self.queue.drain(),
        };

        info!(?mode, pending = pending.len(), "thread pool shutting down");
        self.try_terminate();
        pending
    }

    /// Ждёт завершения всех воркеров после shutdown
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut guard = self.termination.lock();

        while !self.is_terminated() {
            match deadline {
                Some(deadline) => {
                    if self.terminated.wait_until(&mut guard, deadline).timed_out() {
                        return self.is_terminated();
                    }
                }
                None => self.terminated.wait(&mut guard),
            }
        }
        true
    }

    pub fn shutdown_timeout(&self, timeout: Duration) -> bool {
        self.shutdown(ShutdownMode::Graceful);
        self.await_termination(timeout)
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) == RUNNING
    }

    #[inline]
    pub fn is_shutdown(&self) -> bool {
        self.state.load(Ordering::Acquire) >= SHUTDOWN
    }

    #[inline]
    pub fn is_terminated(&self) -> bool {
        self.state.load(Ordering::Acquire) == TERMINATED
    }

    #[inline]
    pub fn queue(&self) -> &dyn WorkQueue {
        self.queue.as_ref()
    }

    #[inline]
    pub fn core_size(&self) -> usize {
        self.core_size
    }

    #[inline]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    #[inline]
    pub fn keep_alive(&self) -> Duration {
        self.keep_alive
    }

    pub fn allows_core_thread_timeout(&self) -> bool {
        self.allow_core_timeout.load(Ordering::Acquire)
    }

    /// Текущее число воркеров
    #[inline]
    pub fn pool_size(&self) -> usize {
        self.worker_count.load(Ordering::Acquire)
    }

    pub fn largest_pool_size(&self) -> usize {
        self.largest_pool_size.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn active_count(&self) -> usize {
        self.active_tasks.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn queued_count(&self) -> usize {
        self.queue.len()
    }

    pub fn completed_count(&self) -> usize {
        self.completed_tasks.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn metrics(&self) -> PoolMetrics {
        let pool_size = self.pool_size();
        let active_tasks = self.active_count();
        PoolMetrics {
            pool_size,
            core_size: self.core_size,
            max_size: self.max_size,
            largest_pool_size: self.largest_pool_size(),
            active_tasks,
            idle_workers: pool_size.saturating_sub(active_tasks),
            queued_tasks: self.queued_count(),
            total_submitted: self.total_submitted.load(Ordering::Relaxed),
            completed_tasks: self.completed_count(),
            failed_tasks: self.failed_tasks.load(Ordering::Relaxed),
            saturation_events: self.saturation_events.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for ThreadPoolInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPoolInner")
            .field("core_size", &self.core_size)
            .field("max_size", &self.max_size)
            .field("keep_alive", &self.keep_alive)
            .field("pool_size", &self.pool_size())
            .field("queued", &self.queued_count())
            .field("state", &self.state.load(Ordering::Relaxed))
            .finish()
    }
}
