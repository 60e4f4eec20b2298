/// Version injected at compile time via KUBEWIRE_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("KUBEWIRE_VERSION") {
    Some(v) => v,
    None => "dev",
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use kubewire::api::meta::{ObjectList, Unknown};
use kubewire::api::watch::Event;
use kubewire::config::Config;
use kubewire::kube::format_api_error;
use kubewire::{Client, ErrorKind, ListOptions, Watcher};
use serde::Serialize;
use serde_json::Value;
use std::io::Write;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Kubernetes API discovery and third party resource client
#[derive(Parser, Debug)]
#[command(name = "kubewire", version, about, long_about = None)]
struct Args {
    /// API server URL (overrides the config file)
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Namespace for third party resources
    #[arg(short, long)]
    namespace: Option<String>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off")]
    log_level: LogLevel,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    output: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the API server version
    Version,
    /// List API groups
    Groups,
    /// Show one API group
    Group { name: String },
    /// List the resources of a group version ("" for the core group)
    Resources { group: String, version: String },
    /// Work with a user defined API group
    Tpr {
        group: String,
        version: String,
        #[command(subcommand)]
        action: TprAction,
    },
}

#[derive(Subcommand, Debug)]
enum TprAction {
    /// List objects
    List {
        resource: String,
        /// Label selector, e.g. `app=web`
        #[arg(short = 'l', long)]
        selector: Option<String>,
    },
    /// Get one object
    Get { resource: String, name: String },
    /// Delete one object
    Delete { resource: String, name: String },
    /// Stream changes until interrupted
    Watch {
        resource: String,
        /// Start after this resource version
        #[arg(long)]
        resource_version: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_directive(self) -> Option<&'static str> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some("error"),
            LogLevel::Warn => Some("warn"),
            LogLevel::Info => Some("info"),
            LogLevel::Debug => Some("debug"),
            LogLevel::Trace => Some("trace"),
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Yaml,
}

fn setup_logging(level: LogLevel) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let directive = level.as_directive()?;

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(err) => {
            eprintln!("Failed to open log file {}: {}", log_path.display(), err);
            return None;
        },
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    // KUBEWIRE_LOG takes full filter directives, e.g. "kubewire::watch=trace"
    let filter =
        EnvFilter::try_from_env("KUBEWIRE_LOG").unwrap_or_else(|_| EnvFilter::new(directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("kubewire {} started with log level: {:?}", VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("kubewire").join("kubewire.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".kubewire").join("kubewire.log");
    }
    PathBuf::from("kubewire.log")
}

/// Attach a user facing summary to a library error
fn report(err: kubewire::Error) -> anyhow::Error {
    let summary = format_api_error(&err);
    anyhow::Error::new(err).context(summary)
}

fn print<T: Serialize>(value: &T, format: OutputFormat) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut stdout, value)?;
            writeln!(stdout)?;
        },
        OutputFormat::Yaml => {
            writeln!(stdout, "---")?;
            serde_yaml::to_writer(&mut stdout, value)?;
        },
    }
    stdout.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct PrintedEvent {
    #[serde(rename = "type")]
    event_type: String,
    object: Value,
}

fn printed_event(event: &Event, unknown: &Unknown) -> Result<PrintedEvent> {
    let object = serde_json::from_slice(unknown.raw())
        .with_context(|| format!("{} event does not carry a JSON object", event.event_type))?;
    Ok(PrintedEvent {
        event_type: event.event_type.to_string(),
        object,
    })
}

/// Print events until the server ends the watch or the user interrupts
async fn stream_events(mut watcher: Watcher, format: OutputFormat) -> Result<()> {
    loop {
        match watcher.next().await {
            Ok((event, unknown)) => print(&printed_event(&event, &unknown)?, format)?,
            Err(err) if err.is_end_of_stream() => {
                tracing::info!("Watch ended by server");
                return Ok(());
            },
            Err(err) if err.kind() == ErrorKind::Cancelled => return Ok(()),
            Err(err) if err.kind() == ErrorKind::Decode && watcher.is_open() => {
                tracing::warn!("Skipping event: {}", err);
                eprintln!("warning: {}", err);
            },
            Err(err) => return Err(report(err)),
        }
    }
}

async fn run(args: Args, client: Client, ctx: CancellationToken) -> Result<()> {
    let format = args.output;
    match args.command {
        Command::Version => {
            let version = client.discovery().version(&ctx).await.map_err(report)?;
            print(&version, format)
        },
        Command::Groups => {
            let groups = client.discovery().api_groups(&ctx).await.map_err(report)?;
            print(&groups, format)
        },
        Command::Group { name } => {
            let group = client
                .discovery()
                .api_group(&ctx, &name)
                .await
                .map_err(report)?;
            print(&group, format)
        },
        Command::Resources { group, version } => {
            let resources = client
                .discovery()
                .api_resources(&ctx, &group, &version)
                .await
                .map_err(report)?;
            print(&resources, format)
        },
        Command::Tpr {
            group,
            version,
            action,
        } => {
            let tpr = client.third_party_resources(group, version);
            let namespace = client.namespace();
            match action {
                TprAction::List { resource, selector } => {
                    let options = ListOptions {
                        label_selector: selector,
                        ..ListOptions::default()
                    };
                    let list: ObjectList<Value> = tpr
                        .list(&ctx, &resource, namespace, &options)
                        .await
                        .map_err(report)?;
                    print(&list, format)
                },
                TprAction::Get { resource, name } => {
                    let object: Value = tpr
                        .get(&ctx, &resource, namespace, &name)
                        .await
                        .map_err(report)?;
                    print(&object, format)
                },
                TprAction::Delete { resource, name } => {
                    tpr.delete(&ctx, &resource, namespace, &name)
                        .await
                        .map_err(report)?;
                    eprintln!("{} \"{}\" deleted", resource, name);
                    Ok(())
                },
                TprAction::Watch {
                    resource,
                    resource_version,
                } => {
                    let options = ListOptions {
                        resource_version,
                        ..ListOptions::default()
                    };
                    let watcher = tpr
                        .watch(&ctx, &resource, namespace, &options)
                        .await
                        .map_err(report)?;
                    stream_events(watcher, format).await
                },
            }
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level);

    let config = Config::load().merge_in_cluster();
    let mut client = Client::from_config(&config, args.endpoint.as_deref())?;
    if let Some(namespace) = &args.namespace {
        client = client.with_namespace(namespace.clone());
    }

    // Ctrl-C cancels whatever request or watch is in flight
    let ctx = CancellationToken::new();
    let interrupt = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted");
            interrupt.cancel();
        }
    });

    run(args, client, ctx).await
}
