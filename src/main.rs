use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use courier_config::{
  CourierConfig, ExecutionConfig, Secret, SourceConfig, SourceDriver, StoreConfig, TransferConfig,
  TransferProtocol,
};
use courier_export::SqlExportSource;
use courier_scheduler::{
  CreateTaskError, Job, NewTaskRequest, Pipeline, Scheduler, TaskService, bootstrap, watch,
};
use courier_store::{SqliteConnector, StoreConnector, TaskId, TaskStatus};

/// Courier - run database exports on a cron schedule and deliver the files
#[derive(Parser)]
#[command(name = "courier")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the task database (default: ~/.courier/scheduled_tasks.db)
  #[arg(long, env = "COURIER_DATABASE", global = true)]
  database: Option<PathBuf>,

  /// Seconds between scans for tasks added while `run` is active
  #[arg(long, env = "COURIER_RESCAN_SECS", default_value_t = 30, global = true)]
  rescan_secs: u64,

  #[command(flatten)]
  source: SourceArgs,

  #[command(flatten)]
  transfer: TransferArgs,

  #[command(flatten)]
  limits: LimitArgs,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Args)]
struct SourceArgs {
  /// Database product queried by tasks (postgres, mysql, sqlite)
  #[arg(long, env = "SOURCE_DRIVER", default_value = "postgres", global = true)]
  source_driver: SourceDriver,

  #[arg(long, env = "SOURCE_HOST", global = true)]
  source_host: Option<String>,

  #[arg(long, env = "SOURCE_PORT", global = true)]
  source_port: Option<u16>,

  /// Database name, or file path for sqlite
  #[arg(long, env = "SOURCE_DATABASE", global = true)]
  source_database: Option<String>,

  #[arg(long, env = "SOURCE_USER", global = true)]
  source_user: Option<String>,

  #[arg(long, env = "SOURCE_PASSWORD", hide_env_values = true, global = true)]
  source_password: Option<String>,
}

#[derive(Args)]
struct TransferArgs {
  /// Protocol spoken to transfer endpoints (sftp, https, http)
  #[arg(long, env = "TRANSFER_SCHEME", default_value = "sftp", global = true)]
  transfer_scheme: TransferProtocol,

  /// Port used when a task's host does not include one (default: the protocol's)
  #[arg(long, env = "TRANSFER_PORT", global = true)]
  transfer_port: Option<u16>,
}

#[derive(Args)]
struct LimitArgs {
  #[arg(long, env = "CONNECT_TIMEOUT_SECS", default_value_t = 30, global = true)]
  connect_timeout_secs: u64,

  #[arg(long, env = "EXPORT_TIMEOUT_SECS", default_value_t = 300, global = true)]
  export_timeout_secs: u64,

  #[arg(long, env = "TRANSFER_TIMEOUT_SECS", default_value_t = 300, global = true)]
  transfer_timeout_secs: u64,
}

#[derive(Subcommand)]
enum Commands {
  /// Schedule every stored task and run until interrupted
  Run,

  /// Create a scheduled task
  Add(AddArgs),

  /// Print stored tasks as JSON
  List,

  /// Run one task now
  Trigger {
    /// Id of the task to run
    id: TaskId,
  },
}

#[derive(Args)]
struct AddArgs {
  #[arg(long)]
  name: String,

  /// SQL query whose result set is exported
  #[arg(long)]
  query: String,

  /// Local path of the CSV file
  #[arg(long)]
  output_file: String,

  /// Destination path on the transfer endpoint (default: output file name)
  #[arg(long, default_value = "")]
  remote_path: String,

  #[arg(long)]
  sftp_host: String,

  #[arg(long)]
  sftp_user: String,

  #[arg(long, env = "SFTP_PASSWORD", hide_env_values = true)]
  sftp_password: String,

  /// Five-field cron expression, e.g. "0 2 * * *"
  #[arg(long)]
  cron: String,
}

impl Cli {
  fn config(&self) -> CourierConfig {
    let database_path = self.database.clone().unwrap_or_else(|| {
      dirs::home_dir()
        .map(|home| home.join(".courier").join("scheduled_tasks.db"))
        .unwrap_or_else(|| StoreConfig::default().database_path)
    });

    CourierConfig {
      store: StoreConfig {
        database_path,
        rescan_interval: Duration::from_secs(self.rescan_secs.max(1)),
      },
      source: SourceConfig {
        driver: self.source.source_driver,
        host: self.source.source_host.clone(),
        port: self.source.source_port,
        database: self.source.source_database.clone().unwrap_or_default(),
        user: self.source.source_user.clone(),
        password: Secret::from(self.source.source_password.clone().unwrap_or_default()),
      },
      transfer: TransferConfig {
        protocol: self.transfer.transfer_scheme,
        default_port: self
          .transfer
          .transfer_port
          .unwrap_or(self.transfer.transfer_scheme.default_port()),
      },
      execution: ExecutionConfig {
        connect_timeout: Duration::from_secs(self.limits.connect_timeout_secs),
        export_timeout: Duration::from_secs(self.limits.export_timeout_secs),
        transfer_timeout: Duration::from_secs(self.limits.transfer_timeout_secs),
      },
    }
  }
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let config = cli.config();
  let Some(command) = cli.command else {
    println!("courier - use --help to see available commands");
    return Ok(());
  };

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async {
    let store = open_store(&config).await?;
    match command {
      Commands::Run => run(config, store).await,
      Commands::Add(args) => add(store, args).await,
      Commands::List => list(store).await,
      Commands::Trigger { id } => trigger(config, store, id).await,
    }
  })
}

/// Create the task database if needed and apply migrations.
async fn open_store(config: &CourierConfig) -> Result<Arc<SqliteConnector>> {
  let path = &config.store.database_path;
  if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
    tokio::fs::create_dir_all(parent)
      .await
      .with_context(|| format!("failed to create directory: {}", parent.display()))?;
  }

  let connector = SqliteConnector::new(path);
  connector
    .initialize()
    .await
    .with_context(|| format!("failed to open task store: {}", path.display()))?;
  Ok(Arc::new(connector))
}

fn pipeline(config: &CourierConfig, store: Arc<SqliteConnector>) -> Result<Pipeline> {
  let source =
    SqlExportSource::new(&config.source).context("invalid data source configuration")?;
  let transfer = courier_transfer::connector(&config.transfer, config.execution.connect_timeout);
  Ok(Pipeline::new(config, store, Arc::new(source), transfer))
}

async fn run(config: CourierConfig, store: Arc<SqliteConnector>) -> Result<()> {
  let scheduler = Scheduler::new(Arc::new(pipeline(&config, store.clone())?));
  bootstrap(store.as_ref(), &scheduler).await;

  let cancel = CancellationToken::new();
  let handle = scheduler.start(cancel.clone());
  let watcher = tokio::spawn(watch(
    store,
    scheduler.clone(),
    config.store.rescan_interval,
    cancel.clone(),
  ));

  tokio::signal::ctrl_c()
    .await
    .context("failed to listen for shutdown signal")?;
  info!("shutdown requested; waiting for running tasks");
  cancel.cancel();

  watcher.await.context("store watcher failed")?;
  handle.await.context("scheduler task failed")?;
  Ok(())
}

async fn add(store: Arc<SqliteConnector>, args: AddArgs) -> Result<()> {
  let request = NewTaskRequest {
    name: args.name,
    query: args.query,
    output_file: args.output_file,
    remote_path: args.remote_path,
    sftp_host: args.sftp_host,
    sftp_user: args.sftp_user,
    sftp_password: Secret::from(args.sftp_password),
    cron_expression: args.cron,
  };

  match TaskService::new(store).create_task(request).await {
    Ok(id) => {
      println!("{}", id);
      Ok(())
    }
    Err(CreateTaskError::Invalid(errors)) => {
      for error in &errors {
        eprintln!("  {}", error);
      }
      bail!("task rejected with {} problem(s)", errors.len())
    }
    Err(e) => Err(e).context("failed to create task"),
  }
}

async fn list(store: Arc<SqliteConnector>) -> Result<()> {
  let handle = store.connect().await?;
  let tasks = handle.list_tasks().await;
  handle.close().await;

  println!("{}", serde_json::to_string_pretty(&tasks?)?);
  Ok(())
}

async fn trigger(config: CourierConfig, store: Arc<SqliteConnector>, id: TaskId) -> Result<()> {
  let handle = store.connect().await?;
  let task = handle.get_task(id).await;
  handle.close().await;
  let task = task?.with_context(|| format!("task {} not found", id))?;

  let status = pipeline(&config, store)?.run(&task, None).await;
  println!("{}", status);

  if status != TaskStatus::Completed {
    bail!("task {} ({}) ended with status {}", task.id, task.name, status);
  }
  Ok(())
}
