use elastic_pool::{
    builder,
    errors::BuildError,
    policy::AbortPolicy,
    ShutdownMode,
};
use crossbeam::channel;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;


fn main() -> Result<(), BuildError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let now = Instant::now();
    let pool = builder()
        .elastic_size(2, 4)
        .keep_alive(Duration::from_secs(30))
        .scale_first()
        .bounded_queue(10)
        .saturation_policy(AbortPolicy)
        .build()?;

    // задачи держат поток, пока не закрыт канал
    let (release_tx, release_rx) = channel::unbounded::<()>();

    for i in 0..14 {
        let release_rx = release_rx.clone();
        if let Err(err) = pool.execute(move || {
            let _ = release_rx.recv();
            let _task = i;
        }) {
            tracing::warn!(task = i, error = %err, "submit failed");
        }
        let m = pool.metrics();
        println!(
            "task {:>2}: threads {}, active {}, queued {}",
            i, m.pool_size, m.active_tasks, m.queued_tasks
        );
    }

    drop(release_tx);
    let pending = pool.shutdown(ShutdownMode::Graceful);
    let terminated = pool.await_termination(Duration::from_secs(5));

    let m = pool.metrics();
    println!(
        "terminated: {}, pending: {}, completed: {}, largest pool: {}",
        terminated,
        pending.len(),
        m.completed_tasks,
        m.largest_pool_size
    );
    println!("elapsed: {:?}", now.elapsed());
    Ok(())
}
