use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use clap::Parser;
use eyre::Result;
use tokio::task::JoinSet;
use tokio::time::{Instant, sleep};
use tracing::info;
use tracing_subscriber::EnvFilter;

use taskqueue_core::{QueueConfig, TaskError, TaskId, TaskOptions, TaskQueue};

/// Run a synthetic batch through the task queue and report what happened.
#[derive(Debug, Parser)]
#[command(name = "taskqueue", version, about)]
struct Cli {
    /// Maximum tasks running at once (omit for unbounded)
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Number of tasks to submit
    #[arg(short, long, default_value_t = 8)]
    tasks: u32,

    /// Every Nth task fails its first attempt (0 disables)
    #[arg(long, default_value_t = 3)]
    fail_every: u32,

    /// Retries allowed per task
    #[arg(short, long, default_value_t = 1)]
    retries: u32,

    /// Per-attempt timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Print the final stats as JSON
    #[arg(long)]
    json: bool,
}

/// Work that sleeps for a while and fails its first `failures` attempts.
struct Flaky {
    label: String,
    duration: Duration,
    remaining_failures: AtomicU32,
}

impl Flaky {
    fn new(index: u32, failures: u32) -> Self {
        Self {
            label: format!("job-{index}"),
            duration: Duration::from_millis(20 + u64::from(index) * 7 % 50),
            remaining_failures: AtomicU32::new(failures),
        }
    }

    async fn run(&self) -> Result<Duration, String> {
        sleep(self.duration).await;
        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(format!("{}: intentional failure (left={left})", self.label));
        }
        Ok(self.duration)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = QueueConfig {
        concurrency: cli.concurrency,
    };
    let queue = TaskQueue::with_config(config)?;

    let started = Instant::now();
    let mut settled = JoinSet::new();
    for index in 0..cli.tasks {
        let failures = u32::from(cli.fail_every > 0 && index % cli.fail_every == 0);
        let flaky = Arc::new(Flaky::new(index, failures));
        let priority = i64::from(index % 3) * 5;

        let mut options = TaskOptions::new().priority(priority).retries(cli.retries);
        if let Some(ms) = cli.timeout_ms {
            options = options.timeout_ms(ms);
        }

        let handle = queue.add_with(
            move || {
                let flaky = Arc::clone(&flaky);
                async move { flaky.run().await }
            },
            options,
        )?;
        let id = handle.id();
        info!(task_id = %id, priority, "submitted");
        settled.spawn(async move { (id, handle.await) });
    }
    info!(pending = queue.size(), running = queue.running(), "batch submitted");

    let mut order = Vec::with_capacity(cli.tasks as usize);
    while let Some(joined) = settled.join_next().await {
        let (id, result) = joined?;
        println!("{}", report(id, &result));
        order.push(id.to_string());
    }
    queue.on_empty().await;

    println!("completion order: {}", order.join(", "));
    println!("elapsed: {}ms", started.elapsed().as_millis());

    let stats = queue.stats();
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!(
            "submitted={} succeeded={} failed={} retried={} timed_out={}",
            stats.submitted, stats.succeeded, stats.failed, stats.retried, stats.timed_out
        );
    }
    Ok(())
}

/// One line per settled task.
fn report(id: TaskId, result: &Result<Duration, TaskError<String>>) -> String {
    match result {
        Ok(took) => format!("{id}: ok in {}ms", took.as_millis()),
        Err(e) => format!("{id}: failed: {e}"),
    }
}
