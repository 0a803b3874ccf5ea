//! Command-line interface for meterflow.
//!
//! Runs the configured metric roles against in-memory storage until Ctrl-C.
//! With `--local-cluster` every configured peer is started inside this
//! process, connected by the in-process transport.

pub mod demo;

use crate::cluster::{InProcessTransport, Transport};
use crate::core::{Config, ConfigBuilder, LoggingConfig, MeterflowError, Result, RoleConfig};
use crate::model::{Record, ServiceCallsMetric};
use crate::persistence::{InMemoryMetricsDao, MetricsDao};
use crate::pipeline::Node;
use clap::Parser;
use demo::TrafficGenerator;
use rand::Rng;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Cluster-partitioned streaming metrics aggregation node
#[derive(Parser, Debug)]
#[command(name = "meterflow")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (default: ~/.config/meterflow/config.yaml)
    #[arg(short, long, env = "MF_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address of this node, overrides `node.address`
    #[arg(long, env = "MF_NODE_ADDRESS")]
    pub node_address: Option<String>,

    /// Batch boundary interval in milliseconds, overrides `aggregation.flush_interval`
    #[arg(long, env = "MF_FLUSH_INTERVAL_MS")]
    pub flush_interval_ms: Option<u64>,

    /// Enable debug logging
    #[arg(short, long, env = "MF_DEBUG")]
    pub debug: bool,

    /// Validate configuration and exit
    #[arg(long)]
    pub check_config: bool,

    /// Feed synthetic service-call traffic
    #[arg(long, env = "MF_DEMO")]
    pub demo: bool,

    /// Demo records per second
    #[arg(long, default_value = "500")]
    pub demo_rate: usize,

    /// Start every configured peer in this process
    #[arg(long)]
    pub local_cluster: bool,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Load configuration with precedence: CLI arguments, config file, defaults.
    pub async fn load_config(&self) -> Result<Config> {
        let mut builder = ConfigBuilder::new();

        let config_path = match &self.config {
            Some(path) => Some(path.clone()),
            None => dirs::config_dir()
                .map(|d| d.join("meterflow").join("config.yaml"))
                .filter(|path| path.exists()),
        };

        if let Some(path) = config_path {
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => builder = builder.from_yaml(&content)?,
                Err(e) if self.config.is_some() => {
                    return Err(MeterflowError::config(format!(
                        "Failed to read config file {:?}: {}",
                        path, e
                    )));
                },
                Err(_) => {},
            }
        }

        self.build_config_from_args(builder)
    }

    fn build_config_from_args(&self, mut builder: ConfigBuilder) -> Result<Config> {
        if let Some(address) = &self.node_address {
            builder = builder.node_address(address.as_str());
        }
        if let Some(ms) = self.flush_interval_ms {
            builder = builder.flush_interval(Duration::from_millis(ms));
        }
        builder = builder.debug(self.debug);

        let config = builder.build()?;
        if self.demo && config.role(ServiceCallsMetric::ROLE).is_none() {
            let mut config = config;
            config.roles.push(RoleConfig::new(ServiceCallsMetric::ROLE, true));
            config.validate()?;
            return Ok(config);
        }
        Ok(config)
    }

    /// Initialize logging.
    ///
    /// `--debug` wins over `MF_LOG_LEVEL`, which wins over `logging.level`;
    /// `RUST_LOG` overrides all of them.
    pub fn init_logging(&self, logging: &LoggingConfig) -> Result<()> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

        let env_log_level = std::env::var("MF_LOG_LEVEL").ok();
        let log_level = if self.debug {
            "debug"
        } else {
            env_log_level.as_deref().unwrap_or(logging.level.as_str())
        };

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

        let fmt_layer = if logging.structured {
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .compact()
        } else {
            tracing_subscriber::fmt::layer().with_target(false).compact()
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| MeterflowError::config(format!("Failed to initialize logging: {}", e)))?;

        Ok(())
    }
}

/// Execute the meterflow binary.
pub async fn execute(cli: Cli) -> Result<()> {
    let config = cli.load_config().await?;
    cli.init_logging(&config.logging)?;

    if cli.check_config {
        println!("Configuration is valid!");
        println!("  Node address: {}", config.node.address);
        println!("  Peers: {}", config.cluster.peers.len());
        println!("  Flush interval: {:?}", config.aggregation.flush_interval);
        println!("  Max identities per generation: {}", config.aggregation.max_identities_per_generation);
        for role in &config.roles {
            println!(
                "  Role {}: merge_with_storage={} forward_to={}",
                role.name,
                role.need_merge_with_storage,
                role.forward_to.as_deref().unwrap_or("-")
            );
        }
        return Ok(());
    }

    if config.roles.is_empty() {
        return Err(MeterflowError::config("no roles configured; add `roles` or pass --demo"));
    }

    run(&cli, config).await
}

/// One running node plus the storage behind each of its persisting roles.
struct RunningNode {
    node: Node<Record>,
    daos: Vec<(String, Arc<InMemoryMetricsDao<Record>>)>,
}

fn start_node(config: Config, transport: &Arc<InProcessTransport<Record>>) -> Result<RunningNode> {
    let mut builder = Node::builder(config.clone()).transport(Arc::clone(transport) as Arc<dyn Transport<Record>>);
    let mut daos = Vec::new();
    for role in config.roles.iter().filter(|r| r.forward_to.is_none()) {
        let dao = Arc::new(InMemoryMetricsDao::<Record>::new());
        builder = builder.dao(role.name.as_str(), Arc::clone(&dao) as Arc<dyn MetricsDao<Record>>);
        daos.push((role.name.clone(), dao));
    }

    let node = builder.start()?;
    transport.register(node.address().clone(), Arc::clone(node.registry()));
    Ok(RunningNode { node, daos })
}

async fn run(cli: &Cli, config: Config) -> Result<()> {
    let transport = Arc::new(InProcessTransport::new());

    let mut nodes = Vec::new();
    if cli.local_cluster && !config.cluster.peers.is_empty() {
        for peer in &config.cluster.peers {
            let mut node_config = config.clone();
            node_config.node.address = peer.clone();
            nodes.push(start_node(node_config, &transport)?);
        }
        tracing::info!(nodes = nodes.len(), "Local cluster started");
    } else {
        if !config.cluster.peers.is_empty() {
            tracing::warn!("No network transport in this binary; records owned by other peers are dropped");
        }
        nodes.push(start_node(config, &transport)?);
    }

    let generator = TrafficGenerator::new();
    // Demo traffic is produced in 10 slices per second.
    let slice = (cli.demo_rate / 10).max(1);
    let mut demo_ticks = tokio::time::interval(Duration::from_millis(100));
    let mut report_ticks = tokio::time::interval(Duration::from_secs(10));
    report_ticks.tick().await;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Received shutdown signal, stopping...");
                break;
            },
            _ = demo_ticks.tick(), if cli.demo => {
                let now = chrono::Utc::now().timestamp_millis();
                for record in generator.next_batch(slice, now)? {
                    // Records may enter at any node; the router finds the owner.
                    let entry = rand::thread_rng().gen_range(0..nodes.len());
                    nodes[entry].node.ingest(ServiceCallsMetric::ROLE, record).await;
                }
            },
            _ = report_ticks.tick() => report(&nodes),
        }
    }

    let mut summaries = Vec::with_capacity(nodes.len());
    for running in nodes {
        let address = running.node.address().clone();
        running.node.shutdown().await?;
        for (role, dao) in running.daos {
            summaries.push((address.clone(), role, dao.len(), dao.batch_count()));
        }
    }
    for (address, role, rows, batches) in summaries {
        tracing::info!(node = %address, role = %role, rows, batches, "Final storage state");
    }

    Ok(())
}

fn report(nodes: &[RunningNode]) {
    for running in nodes {
        let node = &running.node;
        let routed = node.router_stats();
        tracing::info!(
            node = %node.address(),
            local = routed.local,
            remote = routed.remote,
            dropped = routed.dropped,
            "Router stats"
        );
        for role in &node.config().roles {
            if let Some(stats) = node.stats(&role.name) {
                tracing::info!(
                    node = %node.address(),
                    role = %role.name,
                    received = stats.aggregator.received,
                    flushed = stats.aggregator.flushed_records,
                    rejected = stats.aggregator.rejected,
                    failed_batches = stats.flush.map(|f| f.failed_batches).unwrap_or(0),
                    "Role stats"
                );
            }
        }
    }
}
