use clap::{Args, Parser, Subcommand};
use collection_panel::client::{ControlApi, HttpControlClient};
use collection_panel::config::{ConfigLoader, PanelConfig};
use collection_panel::controller::{CollectionController, CollectionForm, PanelEvent};
use collection_panel::output::EntrySink;
use collection_panel::output::console::ConsoleOutput;
use collection_panel::render::render_snapshot;
use collection_panel::snapshot::PollSnapshot;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "collection-panel")]
#[command(version = "0.1.0")]
#[command(about = "Control panel for a remote data-collection service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ServerArgs {
    /// Path to the configuration file (JSON/YAML/TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Base URL of the collection service, overrides the config file
    #[arg(short, long)]
    server: Option<String>,
}

impl ServerArgs {
    fn resolve(&self) -> anyhow::Result<PanelConfig> {
        let mut config = ConfigLoader::load_or_default(self.config.as_deref())?;
        if let Some(server) = &self.server {
            config.server_url = server.clone();
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start collection, stream the log until Ctrl-C, then stop
    Run {
        #[command(flatten)]
        server: ServerArgs,

        /// Page to collect from
        #[arg(short, long)]
        target: Option<String>,

        /// Collection interval in seconds, sent as typed
        #[arg(short, long)]
        interval: Option<String>,

        /// Print HTML fragments instead of text
        #[arg(long)]
        html: bool,

        /// Show a status spinner (stderr)
        #[arg(short, long, default_value_t = true, action = clap::ArgAction::Set)]
        progress: bool,
    },
    /// Fetch and render the latest snapshot once
    Fetch {
        #[command(flatten)]
        server: ServerArgs,

        /// Print HTML fragments instead of text
        #[arg(long)]
        html: bool,
    },
    /// Ask the service to stop collecting
    Stop {
        #[command(flatten)]
        server: ServerArgs,
    },
    /// Request a deep encryption analysis of a page
    Analyze {
        #[command(flatten)]
        server: ServerArgs,

        /// Page to analyze
        #[arg(short, long)]
        target: String,
    },
    /// Validate a configuration file
    Check {
        /// Path to the configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn init_logging(multi: Option<&MultiProgress>) -> anyhow::Result<()> {
    let logger = env_logger::Builder::from_default_env().build();
    let level = logger.filter();
    match multi {
        Some(multi) => {
            indicatif_log_bridge::LogWrapper::new(multi.clone(), logger).try_init()?;
        }
        None => log::set_boxed_logger(Box::new(logger))?,
    }
    log::set_max_level(level);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        unsafe {
            std::env::set_var("RUST_LOG", "info");
        }
    }
    let cli = Cli::parse();
    let multi = Arc::new(MultiProgress::new());

    match cli.command {
        Commands::Run {
            server,
            target,
            interval,
            html,
            progress,
        } => {
            init_logging(progress.then_some(multi.as_ref()))?;
            let config = server.resolve()?;
            log::info!("Using collection service at {}", config.server_url);

            let client = Arc::new(HttpControlClient::from_config(&config)?);
            let sink = Arc::new(
                ConsoleOutput::new(progress.then(|| multi.clone())).with_html(html),
            );
            let controller = CollectionController::with_sink(client, sink);

            let mut spinner: Option<ProgressBar> = None;
            let mut _status_task = None;
            if progress {
                let pb = multi.add(ProgressBar::new_spinner());
                pb.set_style(
                    ProgressStyle::default_spinner()
                        .template("{spinner:.green} [{elapsed_precise}] {msg}")?,
                );
                pb.enable_steady_tick(Duration::from_millis(120));

                let mut status_rx = controller.watch_status();
                let pb_clone = pb.clone();
                spinner = Some(pb);
                _status_task = Some(tokio::spawn(async move {
                    while status_rx.changed().await.is_ok() {
                        let status = status_rx.borrow().clone();
                        pb_clone.set_message(format!(
                            "{:?} | Entries: {}",
                            status.phase, status.entries
                        ));
                    }
                }));
            }

            let form = CollectionForm::new(
                target.or_else(|| config.target_url.clone()).unwrap_or_default(),
                interval.unwrap_or_else(|| config.interval.to_string()),
            );
            controller.handle(PanelEvent::Submit(form)).await;

            let started = controller.is_active().await;
            if started {
                log::info!("Collecting, press Ctrl-C to stop");
                tokio::signal::ctrl_c().await?;
                controller.handle(PanelEvent::StopClicked).await;
            }

            if let Some(task) = _status_task {
                task.abort();
            }
            if let Some(pb) = spinner {
                pb.finish_and_clear();
            }

            if !started {
                std::process::exit(1);
            }
            if controller.is_active().await {
                eprintln!("❌ Stop failed, collection may still be running on the service");
                std::process::exit(1);
            }
        }
        Commands::Fetch { server, html } => {
            init_logging(None)?;
            let config = server.resolve()?;
            let client = HttpControlClient::from_config(&config)?;
            let output = ConsoleOutput::default().with_html(html);

            match PollSnapshot::from_value(client.fetch_data().await?)? {
                Some(snapshot) => {
                    for entry in render_snapshot(&snapshot, chrono::Local::now().time()) {
                        output.write(&entry)?;
                    }
                }
                None => log::info!("Service has no data yet"),
            }
        }
        Commands::Stop { server } => {
            init_logging(None)?;
            let config = server.resolve()?;
            let client = HttpControlClient::from_config(&config)?;
            client.stop().await?;
            println!("✅ Stop requested at {}", client.base_url());
        }
        Commands::Analyze { server, target } => {
            init_logging(None)?;
            let config = server.resolve()?;
            let client = HttpControlClient::from_config(&config)?;
            let analysis = client.analyze_encryption(&target).await?;

            if let Some(error) = analysis.error {
                eprintln!("❌ Analysis failed: {}", error);
                std::process::exit(1);
            }
            println!("🔍 Encryption analysis for {}", target);
            if let Some(status) = analysis.status {
                println!("   Status: {}", status);
            }
            if let Some(message) = analysis.message {
                println!("   {}", message);
            }
            for step in analysis.recommended_steps {
                println!("   {}", step);
            }
        }
        Commands::Check { config } => match ConfigLoader::load(&config) {
            Ok(cfg) => {
                println!("✅ Config is valid:");
                println!("   Server: {}", cfg.server_url);
                println!("   Target: {}", cfg.target_url.as_deref().unwrap_or("(none)"));
                println!("   Interval: {}s", cfg.interval);
                println!("   Timeout: {}s", cfg.timeout_secs);
            }
            Err(e) => {
                eprintln!("❌ Config error: {}", e);
                std::process::exit(1);
            }
        },
    }

    Ok(())
}
