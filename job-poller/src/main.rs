//! Job poller - Main entry point
//!
//! Starts stamping or binding jobs on a Lupapiste backend (or follows an
//! existing job) and prints per-item progress until the job finishes.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use job_poller::attachments::{AttachmentJobs, BindRequest, FileData, JobKind, StampRequest};
use job_poller::daemon::shutdown::ShutdownCoordinator;
use job_poller::job::{ItemStatus, JobHandle};
use job_poller::poller::{ItemSink, PollEnd};
use job_poller::progress::JobProgress;
use job_poller::tracker::JobTracker;
use job_poller::transport::HttpTransport;
use job_poller::{utils, Config, JobEvent};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Backend URL (overrides config)
    #[arg(short, long, global = true)]
    server: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stamp attachments of an application
    Stamp {
        /// Application id
        #[arg(long)]
        application: String,

        /// Attachment id to stamp (repeatable)
        #[arg(long = "file", required = true)]
        files: Vec<String>,

        #[arg(long, default_value = "fi")]
        lang: String,

        /// JSON file with the stamp definition
        #[arg(long, value_name = "FILE")]
        stamp_json: Option<PathBuf>,
    },

    /// Bind uploaded files to an application
    Bind {
        /// Application id
        #[arg(long)]
        application: String,

        /// Uploaded file id (repeatable)
        #[arg(long = "file", required = true)]
        files: Vec<String>,

        /// Bind a single file to this existing attachment
        #[arg(long)]
        attachment: Option<String>,

        /// Sign the bound files. Single-attachment binds cannot sign.
        #[arg(long, requires = "password", conflicts_with = "attachment")]
        sign: bool,

        #[arg(long)]
        password: Option<String>,
    },

    /// Follow a job that is already running
    Watch {
        #[arg(long, value_enum)]
        kind: KindArg,

        #[arg(long)]
        job_id: String,

        /// Last version already seen
        #[arg(long, default_value_t = 0)]
        version: u64,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    Stamp,
    Bind,
}

impl From<KindArg> for JobKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Stamp => JobKind::Stamp,
            KindArg::Bind => JobKind::Bind,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(server) = &args.server {
        config.server.url = server.clone();
    }

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::info!(
        "Starting job-poller v{} against {}",
        env!("CARGO_PKG_VERSION"),
        config.server.url
    );

    let shutdown = ShutdownCoordinator::new();
    let tracker = JobTracker::with_root(shutdown.token());
    let policy = config.poll_policy();
    let transport = HttpTransport::new(
        &config.server.url,
        config.server.token.clone(),
        policy.request_grace,
    )?
    .with_command_timeout(config.command_timeout());
    let jobs = AttachmentJobs::new(Arc::new(transport), policy, tracker);

    let (tx, mut rx) = mpsc::unbounded_channel::<JobEvent>();
    let sink: Arc<dyn ItemSink> = Arc::new(tx);

    let (handle, mut progress) = match args.command {
        Command::Stamp {
            application,
            files,
            lang,
            stamp_json,
        } => {
            let stamp = match stamp_json {
                Some(path) => {
                    let content = std::fs::read_to_string(&path)
                        .with_context(|| format!("reading {}", path.display()))?;
                    serde_json::from_str(&content)?
                }
                None => serde_json::json!({}),
            };
            let request = StampRequest {
                application_id: application,
                lang,
                timestamp: chrono::Utc::now(),
                files: files.clone(),
                stamp,
            };
            let handle = jobs.stamp(&request, sink).await?;
            (handle, seeded(&files, ItemStatus::Pending))
        }
        Command::Bind {
            application,
            files,
            attachment,
            sign,
            password,
        } => {
            let handle = match (&attachment, files.as_slice()) {
                (Some(attachment_id), [file_id]) => {
                    jobs.bind_one(&application, attachment_id, file_id, sink).await?
                }
                (Some(_), _) => anyhow::bail!("--attachment takes exactly one --file"),
                (None, _) => {
                    let request = BindRequest {
                        application_id: application,
                        filedatas: files
                            .iter()
                            .map(|file_id| FileData {
                                sign,
                                ..FileData::new(file_id.clone())
                            })
                            .collect(),
                        password,
                    };
                    jobs.bind(&request, sink).await?
                }
            };
            (handle, seeded(&files, ItemStatus::Running))
        }
        Command::Watch {
            kind,
            job_id,
            version,
        } => {
            let handle = jobs
                .watch(kind.into(), JobHandle::new(job_id, version), sink)
                .await?;
            (handle, JobProgress::new(Vec::new()))
        }
    };

    // Stop polling on SIGINT/SIGTERM
    let signals = shutdown.clone();
    tokio::spawn(async move { signals.wait_for_signal().await });

    while let Some(event) = rx.recv().await {
        if let Some(report) = progress.apply(&event) {
            let previous = report.previous.map(|s| s.to_string()).unwrap_or_else(|| "-".into());
            match &report.file_id {
                Some(file_id) => println!("{}: {} -> {} (file {})", report.item_id, previous, report.status, file_id),
                None => println!("{}: {} -> {}", report.item_id, previous, report.status),
            }
            println!("  {}", progress.summary());
        }
        if matches!(event, JobEvent::Finished(_)) {
            break;
        }
    }

    let outcome = handle.outcome().await?;
    println!("Job {} {:?}: {}", outcome.job_id, outcome.end, progress.summary());

    let code = match outcome.end {
        PollEnd::Done if outcome.succeeded() => ExitCode::SUCCESS,
        PollEnd::Cancelled => ExitCode::from(130),
        _ => ExitCode::FAILURE,
    };
    Ok(code)
}

fn seeded(ids: &[String], status: ItemStatus) -> JobProgress {
    JobProgress::new(ids.iter().map(|id| (id.clone(), status)))
}
