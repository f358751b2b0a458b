//! A terminal sidebar for the Dask cluster manager.

use anyhow::{format_err, Context, Result};
use dask_clusters::{
    panel::{EventTarget, ListenerRegistry, Panel},
    snippet::{client_code, ClientCodeInjector},
    view::{ClickTarget, Intent, ItemButton},
    Client, ClusterApi, ClusterId, ClusterManager, Config, PollOptions,
};
use std::{process::exit, sync::Arc, time::Duration};
use structopt::StructOpt;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod prompt;
mod terminal;

use prompt::CliDialog;
use terminal::{LogDashboard, StdoutInjector, TerminalRenderer};

/// Our command-line arguments.
#[derive(Debug, StructOpt)]
#[structopt(
    name = "dask-clusters",
    about = "List, start, scale and stop Dask clusters managed by a notebook server."
)]
struct Opt {
    /// Base URL of the notebook server (defaults to $DASK_CLUSTERS_URL).
    #[structopt(long = "url", short = "u")]
    url: Option<String>,

    /// Seconds between background refreshes (defaults to
    /// $DASK_CLUSTERS_REFRESH_SECS, or 5).
    #[structopt(long = "refresh-secs")]
    refresh_secs: Option<u64>,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// List running clusters.
    #[structopt(name = "list")]
    List {
        /// Print the clusters as JSON.
        #[structopt(long = "json")]
        json: bool,
    },

    /// Start a new cluster.
    #[structopt(name = "start")]
    Start,

    /// Stop a cluster.
    #[structopt(name = "stop")]
    Stop {
        /// The cluster to stop.
        id: String,
    },

    /// Rescale a cluster. Without flags, asks interactively.
    #[structopt(name = "scale")]
    Scale {
        /// The cluster to scale.
        id: String,

        /// Run exactly this many workers.
        #[structopt(long = "workers", conflicts_with = "adapt")]
        workers: Option<u32>,

        /// Scale adaptively between MIN and MAX workers.
        #[structopt(long = "adapt", number_of_values = 2, value_names = &["MIN", "MAX"])]
        adapt: Option<Vec<u32>>,
    },

    /// Print Python code connecting a client to a cluster.
    #[structopt(name = "code")]
    Code {
        /// The cluster to connect to.
        id: String,
    },

    /// Show an interactive cluster panel that refreshes in the background.
    #[structopt(name = "panel")]
    Panel,
}

impl Opt {
    fn config(&self) -> Result<Config> {
        let mut config = match &self.url {
            Some(url) => Config::new(url)?,
            None => Config::from_env().context("no --url given")?,
        };
        if let Some(secs) = self.refresh_secs {
            if secs == 0 {
                return Err(format_err!("--refresh-secs must be at least 1"));
            }
            config = config.refresh_interval(Duration::from_secs(secs));
        }
        Ok(config)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_writer(std::io::stderr);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(layer).with(filter).init();

    if let Err(err) = run().await {
        error!("{:?}", err);
        exit(1);
    }
}

async fn run() -> Result<()> {
    let opt = Opt::from_args();
    let config = opt.config()?;
    let client = Client::new(&config);
    match opt.cmd {
        Command::List { json } => run_list(client, json).await,
        Command::Start => run_start(client).await,
        Command::Stop { id } => run_stop(client, id.into()).await,
        Command::Scale { id, workers, adapt } => {
            run_scale(client, id.into(), CliDialog::from_flags(workers, adapt)).await
        }
        Command::Code { id } => run_code(client, id.into()).await,
        Command::Panel => run_panel(client, &config).await,
    }
}

async fn run_list(client: Client, json: bool) -> Result<()> {
    let manager = ClusterManager::builder(client, CliDialog::Prompt)
        .connect()
        .await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&manager.clusters())?);
    } else {
        print!("{}", manager.listing());
    }
    Ok(())
}

async fn run_start(client: Client) -> Result<()> {
    let manager = ClusterManager::builder(client, CliDialog::Prompt)
        .connect()
        .await?;
    let model = manager.start().await?;
    println!("{}", serde_json::to_string_pretty(&model)?);
    Ok(())
}

async fn run_stop(client: Client, id: ClusterId) -> Result<()> {
    let manager = ClusterManager::builder(client, CliDialog::Prompt)
        .connect()
        .await?;
    manager.stop(&id).await?;
    info!("stopped {}", id);
    Ok(())
}

async fn run_scale(client: Client, id: ClusterId, dialog: CliDialog) -> Result<()> {
    let manager = ClusterManager::builder(client, dialog).connect().await?;
    let model = manager.scale(&id).await?;
    println!("{}", serde_json::to_string_pretty(&model)?);
    Ok(())
}

async fn run_code(client: Client, id: ClusterId) -> Result<()> {
    let manager = ClusterManager::builder(client, CliDialog::Prompt)
        .connect()
        .await?;
    let model = manager
        .clusters()
        .into_iter()
        .find(|c| c.id == id)
        .ok_or_else(|| format_err!("no cluster with id {}", id))?;
    println!("{}", client_code(&model));
    Ok(())
}

const PANEL_HELP: &str = "\
commands:
  select <id>   make a cluster active
  code <id>     print client code for a cluster
  scale <id>    rescale a cluster
  stop <id>     shut a cluster down
  new           start a new cluster
  refresh       fetch the cluster list now
  hide | show   stop or resume drawing the list
  quit          leave";

async fn run_panel(client: Client, config: &Config) -> Result<()> {
    let manager = ClusterManager::builder(client, CliDialog::Prompt)
        .dashboard_link(LogDashboard::new(config.base_url()))
        .renderer(TerminalRenderer::default())
        .build();
    // The panel keeps running without a first listing; polling will retry.
    if let Err(err) = manager.refresh().await {
        warn!("initial cluster refresh failed: {}", err);
    }

    let registry: Arc<dyn EventTarget> = Arc::new(ListenerRegistry::default());
    let mut panel = Panel::new(Arc::clone(&manager), registry);
    panel.attach();
    let _polling = manager.spawn_polling(PollOptions::from(config));

    let mut changes = manager.subscribe();
    let watcher = tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(change) => info!(
                    "active cluster: {}",
                    change
                        .new
                        .map(|c| c.name)
                        .unwrap_or_else(|| "(none)".to_owned()),
                ),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    eprintln!("{}", PANEL_HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let mut words = line.split_whitespace();
        let (cmd, arg) = (words.next(), words.next());
        match (cmd, arg) {
            (None, _) => continue,
            (Some("quit"), _) | (Some("q"), _) => break,
            (Some("new"), _) => match manager.start().await {
                Ok(model) => info!("started {} ({})", model.name, model.id),
                Err(err) => error!("{}", err),
            },
            (Some("refresh"), _) => {
                if let Err(err) = manager.refresh().await {
                    error!("{}", err);
                }
            }
            (Some("hide"), _) => manager.set_visible(false),
            (Some("show"), _) => manager.set_visible(true),
            (Some(cmd), Some(id)) => {
                let target = match cmd {
                    "select" => ClickTarget::Body,
                    "code" => ClickTarget::Button(ItemButton::InjectClientCode),
                    "scale" => ClickTarget::Button(ItemButton::Scale),
                    "stop" => ClickTarget::Button(ItemButton::Stop),
                    _ => {
                        eprintln!("{}", PANEL_HELP);
                        continue;
                    }
                };
                click(&manager, &StdoutInjector, &ClusterId::from(id), target).await;
            }
            _ => eprintln!("{}", PANEL_HELP),
        }
    }

    watcher.abort();
    panel.detach();
    Ok(())
}

/// Click on the listing item for `id`, and carry out whatever it asks for.
async fn click<A: ClusterApi>(
    manager: &ClusterManager<A>,
    injector: &dyn ClientCodeInjector,
    id: &ClusterId,
    target: ClickTarget,
) {
    let listing = manager.listing();
    let item = match listing.item(id) {
        Some(item) => item,
        None => {
            warn!("no cluster with id {}", id);
            return;
        }
    };
    for intent in item.click(target) {
        let result = match intent {
            Intent::Select(id) => {
                manager.set_active_cluster(&id);
                Ok(())
            }
            Intent::InjectClientCode(model) => {
                injector.inject_client_code(&model);
                Ok(())
            }
            Intent::Scale(id) => {
                // Background refreshes would print over the scaling form.
                let _hidden = manager.hidden();
                manager.scale(&id).await.map(|_| ())
            }
            Intent::Stop(id) => manager.stop(&id).await,
        };
        if let Err(err) = result {
            error!("{}", err);
        }
    }
}
