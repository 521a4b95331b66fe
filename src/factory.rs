use std::{
    fmt,
    io,
    sync::atomic::{AtomicUsize, Ordering},
    thread::{self, JoinHandle},
};


/// Тело воркера, которое фабрика должна запустить в новом потоке
pub type WorkerFn = Box<dyn FnOnce() + Send + 'static>;


/// Создаёт потоки для воркеров пула.
///
/// Ошибка запуска потока при `build()` с prestart возвращается вызывающему,
/// при обычной подаче задач она приводит к срабатыванию политики насыщения.
pub trait ThreadFactory: Send + Sync {
    fn spawn(&self, worker: WorkerFn) -> io::Result<JoinHandle<()>>;
}

impl<F> ThreadFactory for F
where
    F: Fn(WorkerFn) -> io::Result<JoinHandle<()>> + Send + Sync,
{
    fn spawn(&self, worker: WorkerFn) -> io::Result<JoinHandle<()>> {
        self(worker)
    }
}


/// Безымянные потоки с настройками std по умолчанию
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultThreadFactory;

impl ThreadFactory for DefaultThreadFactory {
    fn spawn(&self, worker: WorkerFn) -> io::Result<JoinHandle<()>> {
        thread::Builder::new().spawn(worker)
    }
}


/// Потоки с именами `{prefix}-{n}`, n начинается с 1
pub struct NamedThreadFactory {
    prefix: String,
    stack_size: Option<usize>,
    counter: AtomicUsize,
}

impl NamedThreadFactory {
    pub fn new<S: Into<String>>(prefix: S) -> Self {
        Self {
            prefix: prefix.into(),
            stack_size: None,
            counter: AtomicUsize::new(0),
        }
    }

    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// Сколько потоков уже создано
    pub fn created(&self) -> usize {
        self.counter.load(Ordering::Relaxed)
    }
}

impl ThreadFactory for NamedThreadFactory {
    fn spawn(&self, worker: WorkerFn) -> io::Result<JoinHandle<()>> {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let mut builder = thread::Builder::new().name(format!("{}-{}", self.prefix, n));
        if let Some(size) = self.stack_size {
            builder = builder.stack_size(size);
        }
        builder.spawn(worker)
    }
}

impl fmt::Debug for NamedThreadFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedThreadFactory")
            .field("prefix", &self.prefix)
            .field("stack_size", &self.stack_size)
            .field("created", &self.created())
            .finish()
    }
}
