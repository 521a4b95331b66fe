/// Снимок состояния пула
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolMetrics {
    pub pool_size: usize,
    pub core_size: usize,
    pub max_size: usize,
    pub largest_pool_size: usize,
    pub active_tasks: usize,
    pub idle_workers: usize,
    pub queued_tasks: usize,
    pub total_submitted: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    /// Сколько раз сработала политика насыщения
    pub saturation_events: usize,
}

impl PoolMetrics {
    pub fn utilization(&self) -> f64 {
        if self.active_tasks + self.idle_workers == 0 {
            return 0.0;
        }
        self.active_tasks as f64 / (self.active_tasks + self.idle_workers) as f64
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.completed_tasks + self.failed_tasks;
        if total == 0 {
            return 1.0;
        }
        self.completed_tasks as f64 / total as f64
    }

    /// Все потоки созданы и заняты
    pub fn is_saturated(&self) -> bool {
        self.pool_size >= self.max_size && self.idle_workers == 0
    }
}


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Новые задачи не принимаются, очередь дорабатывается
    Graceful,
    /// Очередь очищается, невыполненные задачи возвращаются вызывающему
    Immediate,
}


/// Порядок приёма задач пулом
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdmissionMode {
    /// Сначала очередь, потоки сверх core только при полной очереди
    #[default]
    QueueFirst,
    /// Сначала потоки до max, очередь только потом
    ScaleFirst,
}
