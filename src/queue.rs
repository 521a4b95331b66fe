//! Очереди задач пула.
//!
//! [`WorkQueue`] описывает всё, что пул делает с очередью: неблокирующая
//! попытка положить задачу, блокирующие put/take, размер и очистка.
//! [`ChannelQueue`] реализует его поверх каналов crossbeam.

use super::handle::Job;
use crossbeam::channel::{
    self,
    Receiver,
    RecvError,
    RecvTimeoutError,
    SendError,
    Sender,
    TrySendError,
};
use parking_lot::RwLock;
use std::{fmt, time::Duration};


/// Потокобезопасная блокирующая очередь задач.
///
/// После [`close`](WorkQueue::close) очередь отдаёт оставшиеся задачи,
/// затем `pop` возвращает ошибку, а `push` перестаёт принимать задачи.
pub trait WorkQueue: Send + Sync {
    /// Положить задачу без ожидания
    fn try_push(&self, job: Job) -> Result<(), TrySendError<Job>>;

    /// Положить задачу, дождавшись свободного места
    fn push(&self, job: Job) -> Result<(), SendError<Job>>;

    /// Забрать задачу, ожидая сколько потребуется
    fn pop(&self) -> Result<Job, RecvError>;

    fn pop_timeout(&self, timeout: Duration) -> Result<Job, RecvTimeoutError>;

    fn try_pop(&self) -> Option<Job>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `None` для неограниченной очереди
    fn capacity(&self) -> Option<usize>;

    fn drain(&self) -> Vec<Job>;

    fn close(&self);
}


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    /// Нулевая ёмкость: put завершается только вместе с take
    Rendezvous,
    Bounded(usize),
    Unbounded,
}


/// Очередь на канале crossbeam
pub struct ChannelQueue {
    kind: QueueKind,
    sender: RwLock<Option<Sender<Job>>>,
    receiver: Receiver<Job>,
}

impl ChannelQueue {
    pub fn new(kind: QueueKind) -> Self {
        let (sender, receiver) = match kind {
            QueueKind::Rendezvous => channel::bounded(0),
            QueueKind::Bounded(capacity) => channel::bounded(capacity),
            QueueKind::Unbounded => channel::unbounded(),
        };
        Self {
            kind,
            sender: RwLock::new(Some(sender)),
            receiver,
        }
    }

    pub fn rendezvous() -> Self {
        Self::new(QueueKind::Rendezvous)
    }

    /// Ёмкость 0 даёт rendezvous-очередь
    pub fn bounded(capacity: usize) -> Self {
        Self::new(QueueKind::Bounded(capacity))
    }

    pub fn unbounded() -> Self {
        Self::new(QueueKind::Unbounded)
    }

    #[inline]
    pub fn kind(&self) -> QueueKind {
        self.kind
    }

    pub fn is_closed(&self) -> bool {
        self.sender.read().is_none()
    }

    // Клон отпускает lock до блокирующей отправки, close() не ждёт put
    #[inline]
    fn sender(&self) -> Option<Sender<Job>> {
        self.sender.read().clone()
    }
}

impl WorkQueue for ChannelQueue {
    fn try_push(&self, job: Job) -> Result<(), TrySendError<Job>> {
        match self.sender() {
            Some(tx) => tx.try_send(job),
            None => Err(TrySendError::Disconnected(job)),
        }
    }

    fn push(&self, job: Job) -> Result<(), SendError<Job>> {
        match self.sender() {
            Some(tx) => tx.send(job),
            None => Err(SendError(job)),
        }
    }

    fn pop(&self) -> Result<Job, RecvError> {
        self.receiver.recv()
    }

    fn pop_timeout(&self, timeout: Duration) -> Result<Job, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    fn try_pop(&self) -> Option<Job> {
        self.receiver.try_recv().ok()
    }

    fn len(&self) -> usize {
        self.receiver.len()
    }

    fn capacity(&self) -> Option<usize> {
        match self.kind {
            QueueKind::Rendezvous => Some(0),
            QueueKind::Bounded(capacity) => Some(capacity),
            QueueKind::Unbounded => None,
        }
    }

    fn drain(&self) -> Vec<Job> {
        self.receiver.try_iter().collect()
    }

    fn close(&self) {
        self.sender.write().take();
    }
}

impl fmt::Debug for ChannelQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelQueue")
            .field("kind", &self.kind)
            .field("len", &self.receiver.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        thread,
    };

    fn counting_job(counter: &Arc<AtomicUsize>) -> Job {
        let counter = counter.clone();
        Job::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn bounded_queue_refuses_when_full() {
        let counter = Arc::new(AtomicUsize::new(0));
        let queue = ChannelQueue::bounded(2);

        assert!(queue.try_push(counting_job(&counter)).is_ok());
        assert!(queue.try_push(counting_job(&counter)).is_ok());
        assert!(matches!(
            queue.try_push(counting_job(&counter)),
            Err(TrySendError::Full(_))
        ));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.capacity(), Some(2));
    }

    #[test]
    fn rendezvous_queue_never_holds_items() {
        let counter = Arc::new(AtomicUsize::new(0));
        let queue = ChannelQueue::rendezvous();

        assert!(matches!(
            queue.try_push(counting_job(&counter)),
            Err(TrySendError::Full(_))
        ));
        assert_eq!(queue.len(), 0);
        assert_eq!(queue.capacity(), Some(0));
    }

    #[test]
    fn rendezvous_push_completes_with_take() {
        let counter = Arc::new(AtomicUsize::new(0));
        let queue = Arc::new(ChannelQueue::rendezvous());

        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || queue.pop().map(Job::run).is_ok())
        };

        assert!(queue.push(counting_job(&counter)).is_ok());
        assert!(consumer.join().unwrap());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn closed_queue_drains_then_disconnects() {
        let counter = Arc::new(AtomicUsize::new(0));
        let queue = ChannelQueue::unbounded();

        assert!(queue.push(counting_job(&counter)).is_ok());
        queue.close();

        assert!(queue.is_closed());
        assert!(queue.push(counting_job(&counter)).is_err());
        assert!(queue.pop().is_ok());
        assert!(queue.pop().is_err());
        assert_eq!(queue.capacity(), None);
    }

    #[test]
    fn drain_returns_pending_jobs_in_order() {
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let queue = ChannelQueue::unbounded();

        for i in 0..3 {
            let order = order.clone();
            assert!(queue.push(Job::new(move || order.lock().push(i))).is_ok());
        }

        for job in queue.drain() {
            job.run();
        }
        assert_eq!(*order.lock(), vec![0, 1, 2]);
        assert!(queue.is_empty());
    }
}
