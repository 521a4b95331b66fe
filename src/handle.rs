use super::errors::{TaskError, TaskResult};
use std::{
    any::Any,
    fmt,
    future::Future,
    panic::{self, AssertUnwindSafe},
    pin::Pin,
    task::{Context, Poll},
};
use tokio::{
    sync::oneshot,
    time::Duration,
};
use tokio_util::sync::CancellationToken;


/// Единица работы, которую исполняет воркер пула
pub struct Job(Box<dyn FnOnce() + Send + 'static>);

impl Job {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self(Box::new(f))
    }

    #[inline]
    pub fn run(self) {
        (self.0)()
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Job")
    }
}


/// Handle на задачу с поддержкой отмены и timeout
///
/// Если задачу выбросила политика насыщения, результатом будет
/// [`TaskError::Discarded`].
pub struct TaskHandle<T> {
    cancel_token: CancellationToken,
    receiver: oneshot::Receiver<TaskResult<T>>,
}

impl<T> TaskHandle<T> {

    pub(crate) fn new
    (
        cancel_token: CancellationToken,
        receiver: oneshot::Receiver<TaskResult<T>>,
    ) -> Self {
        Self {
            cancel_token,
            receiver
        }
    }

    /// Отменяет задачу, если воркер ещё не начал её выполнять
    #[inline]
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Блокирующее ожидание результата.
    ///
    /// # Panics
    /// Паникует при вызове внутри async-контекста tokio, там нужно `.await`.
    pub fn join(self) -> TaskResult<T> {
        self.receiver
            .blocking_recv()
            .unwrap_or(Err(TaskError::Discarded))
    }

    pub async fn await_timeout(self, timeout: Duration) -> TaskResult<T> {
        match tokio::time::timeout(timeout, self.receiver).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(TaskError::Discarded),
            Err(_) => Err(TaskError::Timeout),
        }
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = TaskResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(res) => Poll::Ready(res.unwrap_or(Err(TaskError::Discarded))),
            Poll::Pending => Poll::Pending,
        }
    }
}


/// Упаковывает замыкание в `Job` и связанный с ним handle.
///
/// Паника фиксируется в результате и пробрасывается дальше, чтобы пул
/// посчитал задачу проваленной.
pub(crate) fn task<T, F>(f: F) -> (Job, TaskHandle<T>)
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = oneshot::channel::<TaskResult<T>>();
    let cancel_token = CancellationToken::new();
    let ct = cancel_token.clone();

    let job = Job::new(move || {
        if ct.is_cancelled() {
            let _ = tx.send(Err(TaskError::Cancelled));
            return;
        }

        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => {
                let _ = tx.send(Ok(value));
            }
            Err(payload) => {
                let _ = tx.send(Err(TaskError::Panic(panic_message(payload.as_ref()))));
                panic::resume_unwind(payload);
            }
        }
    });

    (job, TaskHandle::new(cancel_token, rx))
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
