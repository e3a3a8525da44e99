//! shepherd CLI entry point.
//!
//! Reads startup configuration from flags or the environment, initializes
//! logging and runs the scheduler until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{ArgAction, Args, Parser, Subcommand};
use shepherd_core::impls::{
    ExitSource, InMemoryCluster, InMemoryLogs, InMemoryWorkQueue, RecordingNotifier,
};
use shepherd_core::ports::{Clock, SystemClock, UlidGenerator};
use shepherd_core::{SupervisorBuilder, SupervisorConfig, SupervisorHandle, Tuning};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(name = "shepherd")]
#[command(version, about = "Runs one container task per queued work item", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes priority
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct SupervisorArgs {
    #[arg(long, env = "CLUSTER")]
    cluster: String,

    #[arg(long, env = "TASK_DEFINITION")]
    task_definition: String,

    /// Container whose environment receives the work item
    #[arg(long, env = "CONTAINER_NAME")]
    container_name: String,

    /// Ceiling on tasks in flight
    #[arg(long, env = "DESIRED_COUNT")]
    desired_count: usize,

    #[arg(long, env = "QUEUE_URL")]
    queue_url: String,

    /// Alert destination
    #[arg(long, env = "TOPIC_ARN")]
    topic_arn: String,

    #[arg(long, env = "STACK_NAME")]
    stack_name: String,

    #[arg(long, env = "EXPONENTIAL_BACKOFF", action = ArgAction::Set)]
    exponential_backoff: bool,

    /// Log group for alert excerpts; empty disables them
    #[arg(long, env = "LOG_GROUP", default_value = "")]
    log_group: String,

    /// Retries up to this receive count requeue without an alert
    #[arg(long, env = "NOTIFY_AFTER_RETRIES")]
    notify_after_retries: u32,

    /// Queue long-poll wait in seconds
    #[arg(long, env = "POLL_WAIT_SECS", default_value_t = 20)]
    poll_wait_secs: u64,
}

impl SupervisorArgs {
    fn into_config(self) -> SupervisorConfig {
        let log_group = Some(self.log_group).filter(|group| !group.trim().is_empty());
        SupervisorConfig {
            cluster: self.cluster,
            task_definition: self.task_definition,
            container_name: self.container_name,
            concurrency: self.desired_count,
            queue: self.queue_url,
            topic: self.topic_arn,
            stack_name: self.stack_name,
            exponential_backoff: self.exponential_backoff,
            log_group,
            notify_after_retries: self.notify_after_retries,
            tuning: Tuning {
                poll_wait: Duration::from_secs(self.poll_wait_secs),
                ..Tuning::default()
            },
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run against in-memory queue and cluster adapters
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    supervisor: SupervisorArgs,

    /// Message bodies to enqueue before starting; a numeric body becomes the
    /// simulated task's exit code
    #[arg(long = "seed")]
    seed: Vec<String>,

    /// Running tasks the simulated cluster has room for
    #[arg(long)]
    capacity: Option<usize>,

    /// Status queries a simulated task answers as running before it stops
    #[arg(long, default_value_t = 1)]
    polls_until_stop: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > --log-level / LOG_LEVEL > default "info"
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| cli.log_level.clone());
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter)))
        .init();

    match cli.command {
        Command::Run(args) => run_local(args).await,
    }
}

async fn run_local(args: RunArgs) -> anyhow::Result<()> {
    let config = args.supervisor.into_config();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let ids = Arc::new(UlidGenerator::new(clock.clone()));

    let queue = Arc::new(InMemoryWorkQueue::new(clock.clone(), ids.clone()));
    let mut cluster = InMemoryCluster::new(&config.cluster, clock.clone(), ids).with_exit_source(
        ExitSource::FromMessage {
            polls_until_stop: args.polls_until_stop,
        },
    );
    if let Some(capacity) = args.capacity {
        cluster = cluster.with_capacity(capacity);
    }
    let notifier = Arc::new(RecordingNotifier::new());

    for body in args.seed {
        let message_id = queue.send(body).await;
        info!(%message_id, "seeded work item");
    }

    let scheduler = SupervisorBuilder::new(config)
        .queue(queue.clone())
        .cluster(Arc::new(cluster))
        .notifier(notifier.clone())
        .logs(Arc::new(InMemoryLogs::new()))
        .clock(clock)
        .build()
        .context("invalid supervisor configuration")?;

    let handle = SupervisorHandle::spawn(scheduler);
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutdown requested; finishing the current cycle");

    let summary = handle
        .shutdown_and_join()
        .await
        .context("scheduler task failed")?;

    for alert in notifier.sent().await {
        info!(topic = %alert.topic, subject = %alert.subject, "alert published");
    }
    info!(
        cycles = summary.cycles,
        dispatched = summary.dispatched,
        resolved = summary.resolved,
        stage_errors = summary.stage_errors,
        tasks_left_running = summary.counts.tasks_in_flight,
        queue_depth = queue.depth().await,
        "shepherd stopped"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const STARTUP: [&str; 18] = [
        "--cluster",
        "jobs",
        "--task-definition",
        "worker:7",
        "--container-name",
        "worker",
        "--desired-count",
        "3",
        "--queue-url",
        "work-queue",
        "--topic-arn",
        "alerts",
        "--stack-name",
        "prod",
        "--exponential-backoff",
        "true",
        "--notify-after-retries",
        "1",
    ];

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn startup_flags_follow_the_subcommand() {
        let argv = ["shepherd", "run"]
            .into_iter()
            .chain(STARTUP)
            .chain(["--seed", "0", "--log-group", ""]);
        let cli = Cli::try_parse_from(argv).unwrap();

        let Command::Run(args) = cli.command;
        assert_eq!(args.seed, vec!["0".to_string()]);
        let config = args.supervisor.into_config();
        assert_eq!(config.cluster, "jobs");
        assert_eq!(config.concurrency, 3);
        assert_eq!(config.notify_after_retries, 1);
        assert_eq!(config.log_group, None);
        assert_eq!(config.validate(), Ok(()));
    }
}
