//! Пошаговая сборка пула потоков.
//!
//! Каждый шаг поглощает builder и возвращает builder следующей стадии, так
//! что неполную или противоречивую конфигурацию нельзя собрать: ошибка в
//! порядке вызовов становится ошибкой компиляции.
//!
//! ```text
//! Start ─ fixed_size ──────────────────────────┐
//!       └ elastic_size ─ keep_alive ─ QueueStrategy ─ queue_first / scale_first
//!                                                    └ QueueConfigured ─ without_queue / bounded_queue / unbounded_queue
//!   ─ ThreadsPending ─ thread_factory ─ PreStartPending ─ prestart_core_threads
//!   ─ HandlerPending ─ saturation_policy ─ Buildable ─ build
//! ```
//!
//! Необязательные шаги (фабрика потоков, prestart, политика) можно
//! пропустить, вызвав следующий шаг раньше, тогда подставляются значения по
//! умолчанию.
//!
//! ```
//! use elastic_pool::{builder, policy::AbortPolicy};
//! use std::time::Duration;
//!
//! let pool = builder()
//!     .elastic_size(2, 4)
//!     .keep_alive(Duration::from_secs(60))
//!     .scale_first()
//!     .bounded_queue(10)
//!     .saturation_policy(AbortPolicy)
//!     .build()?;
//!
//! let answer = pool.submit(|| 6 * 7)?.join();
//! assert_eq!(answer, Ok(42));
//! assert!(pool.shutdown_timeout(Duration::from_secs(5)));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Без keep-alive эластичный пул дальше не собирается:
//!
//! ```compile_fail
//! elastic_pool::builder().elastic_size(2, 4).scale_first();
//! ```

use super::{
    errors::BuildError,
    factory::{DefaultThreadFactory, ThreadFactory},
    model::AdmissionMode,
    policy::{AbortPolicy, SaturationPolicy},
    pool::{
        PoolConfig,
        ThreadPool,
        ThreadPoolInner,
    },
    queue::{ChannelQueue, WorkQueue},
    scale_first,
};
use std::{
    any,
    fmt,
    time::Duration,
};
use tracing::debug;
use self::stage::*;


const IO_KEEP_ALIVE: Duration = Duration::from_secs(60);


pub mod stage {
    //! Стадии сборки. Поздние стадии несут то, что уже выбрано

    use crate::{
        factory::ThreadFactory,
        policy::SaturationPolicy,
        queue::WorkQueue,
    };

    pub struct Start;

    pub struct FixedSize;

    pub struct ElasticSize;

    pub struct QueueStrategy;

    pub struct QueueConfigured;

    pub struct ThreadsPending {
        pub(crate) queue: Box<dyn WorkQueue>,
    }

    pub struct PreStartPending {
        pub(crate) queue: Box<dyn WorkQueue>,
        pub(crate) thread_factory: Box<dyn ThreadFactory>,
    }

    pub struct HandlerPending {
        pub(crate) queue: Box<dyn WorkQueue>,
        pub(crate) thread_factory: Box<dyn ThreadFactory>,
        pub(crate) prestart_core_threads: bool,
    }

    pub struct Buildable {
        pub(crate) queue: Box<dyn WorkQueue>,
        pub(crate) thread_factory: Box<dyn ThreadFactory>,
        pub(crate) prestart_core_threads: bool,
        pub(crate) saturation_policy: Box<dyn SaturationPolicy>,
    }
}


/// Размеры и порядок приёма, накопленные к текущей стадии
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PoolSettings {
    core_size: usize,
    max_size: usize,
    keep_alive: Duration,
    allow_core_timeout: bool,
    admission: AdmissionMode,
    adapter: bool,
}

impl PoolSettings {
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

    #[inline]
    pub fn allows_core_timeout(&self) -> bool {
        self.allow_core_timeout
    }

    #[inline]
    pub fn admission_mode(&self) -> AdmissionMode {
        self.admission
    }

    /// Будут ли очередь и политика обёрнуты scale-first адаптером
    #[inline]
    pub fn uses_adapter(&self) -> bool {
        self.adapter
    }
}


pub struct ThreadPoolBuilder<S> {
    settings: PoolSettings,
    stage: S,
}

impl<S> ThreadPoolBuilder<S> {
    #[inline]
    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    #[inline]
    fn advance<N>(self, stage: N) -> ThreadPoolBuilder<N> {
        ThreadPoolBuilder {
            settings: self.settings,
            stage,
        }
    }
}

impl<S> fmt::Debug for ThreadPoolBuilder<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPoolBuilder")
            .field("stage", &any::type_name::<S>())
            .field("settings", &self.settings)
            .finish()
    }
}


impl ThreadPoolBuilder<Start> {
    pub fn new() -> Self {
        Self {
            settings: PoolSettings::default(),
            stage: Start,
        }
    }

    /// `size` потоков, keep-alive нулевой.
    ///
    /// # Panics
    /// Если `size == 0`. Проверку на этапе компиляции даёт [`fixed`](Self::fixed).
    pub fn fixed_size(self, size: usize) -> ThreadPoolBuilder<FixedSize> {
        assert!(size > 0, "fixed pool size must be positive");
        let mut next = self.advance(FixedSize);
        next.settings.core_size = size;
        next.settings.max_size = size;
        next.settings.keep_alive = Duration::ZERO;
        next
    }

    /// От `core` до `max` потоков, дальше обязателен keep-alive.
    ///
    /// # Panics
    /// Если `max == 0` или `core > max`. Проверку на этапе компиляции даёт
    /// [`elastic`](Self::elastic).
    pub fn elastic_size(self, core: usize, max: usize) -> ThreadPoolBuilder<ElasticSize> {
        assert!(max > 0, "max pool size must be positive");
        assert!(core <= max, "core pool size {core} exceeds max pool size {max}");
        let mut next = self.advance(ElasticSize);
        next.settings.core_size = core;
        next.settings.max_size = max;
        next
    }

    pub fn fixed<const SIZE: usize>(self) -> ThreadPoolBuilder<FixedSize> {
        const { assert!(SIZE > 0, "fixed pool size must be positive") };
        self.fixed_size(SIZE)
    }

    pub fn elastic<const CORE: usize, const MAX: usize>(self) -> ThreadPoolBuilder<ElasticSize> {
        const { assert!(MAX > 0 && CORE <= MAX, "core pool size must not exceed a positive max pool size") };
        self.elastic_size(CORE, MAX)
    }

    /// Для CPU-bound задач: по потоку на ядро, неограниченная очередь
    pub fn cpu_bound() -> ThreadPoolBuilder<ThreadsPending> {
        Self::new()
            .fixed_size(num_cpus::get())
            .queue_first()
            .unbounded_queue()
    }

    /// Для I/O-bound задач: от числа ядер до удвоенного, сначала потоки
    pub fn io_bound() -> ThreadPoolBuilder<ThreadsPending> {
        let num_cpus = num_cpus::get();
        Self::new()
            .elastic_size(num_cpus, num_cpus * 2)
            .keep_alive(IO_KEEP_ALIVE)
            .scale_first()
            .unbounded_queue()
    }
}

impl Default for ThreadPoolBuilder<Start> {
    fn default() -> Self {
        Self::new()
    }
}


impl ThreadPoolBuilder<FixedSize> {
    pub fn queue_first(self) -> ThreadPoolBuilder<QueueConfigured> {
        self.advance(QueueStrategy).queue_first()
    }

    pub fn scale_first(self) -> ThreadPoolBuilder<QueueConfigured> {
        self.advance(QueueStrategy).scale_first()
    }

    pub fn without_queue(self) -> ThreadPoolBuilder<ThreadsPending> {
        self.queue_first().without_queue()
    }

    pub fn bounded_queue(self, capacity: usize) -> ThreadPoolBuilder<ThreadsPending> {
        self.queue_first().bounded_queue(capacity)
    }

    pub fn unbounded_queue(self) -> ThreadPoolBuilder<ThreadsPending> {
        self.queue_first().unbounded_queue()
    }
}


impl ThreadPoolBuilder<ElasticSize> {
    pub fn keep_alive(self, keep_alive: Duration) -> ThreadPoolBuilder<QueueStrategy> {
        let mut next = self.advance(QueueStrategy);
        next.settings.keep_alive = keep_alive;
        next
    }
}


impl ThreadPoolBuilder<QueueStrategy> {
    pub fn queue_first(self) -> ThreadPoolBuilder<QueueConfigured> {
        let mut next = self.advance(QueueConfigured);
        next.settings.admission = AdmissionMode::QueueFirst;
        next
    }

    /// Сначала потоки до max, потом очередь.
    ///
    /// При `core == 0` адаптер не нужен: пул с `core == max` сам создаёт
    /// поток на каждую задачу до max, а core timeout возвращает
    /// простаивающие потоки к нулю.
    pub fn scale_first(self) -> ThreadPoolBuilder<QueueConfigured> {
        let mut next = self.advance(QueueConfigured);
        next.settings.admission = AdmissionMode::ScaleFirst;
        if next.settings.core_size == 0 {
            next.settings.core_size = next.settings.max_size;
            next.settings.allow_core_timeout = true;
        } else {
            next.settings.adapter = true;
        }
        next
    }
}


impl ThreadPoolBuilder<QueueConfigured> {
    pub fn without_queue(self) -> ThreadPoolBuilder<ThreadsPending> {
        self.queue(ChannelQueue::rendezvous())
    }

    pub fn bounded_queue(self, capacity: usize) -> ThreadPoolBuilder<ThreadsPending> {
        self.queue(ChannelQueue::bounded(capacity))
    }

    pub fn unbounded_queue(self) -> ThreadPoolBuilder<ThreadsPending> {
        self.queue(ChannelQueue::unbounded())
    }

    pub fn queue<Q>(self, queue: Q) -> ThreadPoolBuilder<ThreadsPending>
    where
        Q: WorkQueue + 'static,
    {
        self.advance(ThreadsPending {
            queue: Box::new(queue),
        })
    }
}


impl ThreadPoolBuilder<ThreadsPending> {
    pub fn thread_factory<F>(self, factory: F) -> ThreadPoolBuilder<PreStartPending>
    where
        F: ThreadFactory + 'static,
    {
        let ThreadPoolBuilder { settings, stage } = self;
        ThreadPoolBuilder {
            settings,
            stage: PreStartPending {
                queue: stage.queue,
                thread_factory: Box::new(factory),
            },
        }
    }

    pub fn prestart_core_threads(self, prestart: bool) -> ThreadPoolBuilder<HandlerPending> {
        self.thread_factory(DefaultThreadFactory)
            .prestart_core_threads(prestart)
    }

    pub fn saturation_policy<P>(self, policy: P) -> ThreadPoolBuilder<Buildable>
    where
        P: SaturationPolicy + 'static,
    {
        self.thread_factory(DefaultThreadFactory)
            .saturation_policy(policy)
    }

    pub fn build(self) -> Result<ThreadPool, BuildError> {
        self.thread_factory(DefaultThreadFactory).build()
    }
}


impl ThreadPoolBuilder<PreStartPending> {
    /// Создать все core-потоки в `build()`, а не по первой задаче
    pub fn prestart_core_threads(self, prestart: bool) -> ThreadPoolBuilder<HandlerPending> {
        let ThreadPoolBuilder { settings, stage } = self;
        ThreadPoolBuilder {
            settings,
            stage: HandlerPending {
                queue: stage.queue,
                thread_factory: stage.thread_factory,
                prestart_core_threads: prestart,
            },
        }
    }

    pub fn saturation_policy<P>(self, policy: P) -> ThreadPoolBuilder<Buildable>
    where
        P: SaturationPolicy + 'static,
    {
        self.prestart_core_threads(false).saturation_policy(policy)
    }

    pub fn build(self) -> Result<ThreadPool, BuildError> {
        self.prestart_core_threads(false).build()
    }
}


impl ThreadPoolBuilder<HandlerPending> {
    pub fn saturation_policy<P>(self, policy: P) -> ThreadPoolBuilder<Buildable>
    where
        P: SaturationPolicy + 'static,
    {
        let ThreadPoolBuilder { settings, stage } = self;
        ThreadPoolBuilder {
            settings,
            stage: Buildable {
                queue: stage.queue,
                thread_factory: stage.thread_factory,
                prestart_core_threads: stage.prestart_core_threads,
                saturation_policy: Box::new(policy),
            },
        }
    }

    pub fn build(self) -> Result<ThreadPool, BuildError> {
        self.saturation_policy(AbortPolicy).build()
    }
}


impl ThreadPoolBuilder<Buildable> {
    /// Создаёт пул. Ошибка запуска потока при prestart возвращается здесь
    pub fn build(self) -> Result<ThreadPool, BuildError> {
        let ThreadPoolBuilder { settings, stage } = self;
        let Buildable {
            queue,
            thread_factory,
            prestart_core_threads,
            saturation_policy,
        } = stage;

        let (queue, saturation_policy) = if settings.adapter {
            scale_first::install(queue, saturation_policy)
        } else {
            (queue, saturation_policy)
        };

        debug!(
            core_size = settings.core_size,
            max_size = settings.max_size,
            admission = ?settings.admission,
            adapter = settings.adapter,
            prestart_core_threads,
            "building thread pool"
        );

        ThreadPoolInner::with_config(PoolConfig {
            core_size: settings.core_size,
            max_size: settings.max_size,
            keep_alive: settings.keep_alive,
            allow_core_timeout: settings.allow_core_timeout,
            queue,
            thread_factory,
            prestart_core_threads,
            saturation_policy,
        })
    }
}
