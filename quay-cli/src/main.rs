//! Quay CLI Tool
//!
//! Command line interface for Quay load balancer demos and configuration

use anyhow::Result;
use clap::{Parser, Subcommand};
use quay_core::config::loader::load_config_from_path;
use quay_core::{BalancingStrategy, Config, InMemoryProvider, Provider, ProviderAction};
use quay_loadbalance::{
    LoadBalanceManager, LoadBalancer, LoadBalancerBuilder, LoadBalancerError, ProviderRegistry,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "quay-cli")]
#[command(about = "A CLI tool for Quay load balancer demos and configuration")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the load balancer walkthrough with in-memory providers
    Demo {
        /// Path to configuration file, built-in defaults when omitted
        #[arg(short, long)]
        config: Option<String>,
        /// Number of requests sent per round
        #[arg(short, long, default_value_t = 100)]
        requests: usize,
        /// Print request distribution as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate configuration file
    ValidateConfig {
        /// Path to configuration file
        #[arg(short, long, default_value = "quay.toml")]
        config: String,
    },
    /// Generate example configuration file
    GenerateConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "quay_example.toml")]
        output: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG未设置时默认info
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Demo {
            config,
            requests,
            json,
        } => {
            let cfg = match config {
                Some(path) => load_config_from_path(&path)?,
                None => Config::default(),
            };
            run_demo(cfg, requests, json).await?;
        }
        Commands::ValidateConfig { config } => {
            println!("Validating configuration file: {}", config);
            match load_config_from_path(&config) {
                Ok(cfg) => {
                    println!("✅ Configuration is valid");
                    println!("  - default strategy: {}", cfg.load_balancer.default_strategy);
                    println!(
                        "  - {} concurrent workers per provider",
                        cfg.load_balancer.max_concurrent_workers_per_provider
                    );
                    println!(
                        "  - up to {} registered providers",
                        cfg.registry.max_allowed_registered_providers
                    );
                    println!(
                        "  - health check every {}ms (timeout {}ms)",
                        cfg.registry.health_check_frequency_millis,
                        cfg.registry.health_check_request_timeout_millis
                    );
                }
                Err(e) => {
                    eprintln!("❌ Configuration validation failed: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::GenerateConfig { output } => {
            println!("Generating configuration file: {}", output);
            std::fs::write(&output, Config::example_toml())?;
            println!("✅ Configuration file generated successfully");
        }
    }

    Ok(())
}

/// 演示完整流程：注册、切换策略、摘除与新增provider、最后演示满载
async fn run_demo(config: Config, requests: usize, json: bool) -> Result<()> {
    info!("Start load balancer demo");
    let lb = LoadBalancerBuilder::new(&config).build();
    let registry = lb.registry();

    // 记录所有创建过的provider，摘除的和注册失败的也要在结束时关闭
    let mut providers: Vec<Arc<dyn Provider>> = Vec::new();
    for _ in 0..config.registry.max_allowed_registered_providers {
        let provider: Arc<dyn Provider> = Arc::new(InMemoryProvider::new(
            &config.load_balancer,
            registry.notifier(),
        ));
        providers.push(Arc::clone(&provider));
        if let Err(e) = registry.register(provider) {
            warn!("Unable to register instance: {}", e);
        }
    }

    println!("🎲 Dispatching with {} strategy", lb.strategy());
    call_and_print_stats(&lb, requests, json).await?;

    lb.clear_metrics();
    lb.set_strategy(BalancingStrategy::RoundRobin);
    println!("🔁 Dispatching with {} strategy", lb.strategy());
    call_and_print_stats(&lb, requests, json).await?;

    let available = registry.available();
    let excluded: Vec<_> = available.iter().take(2).cloned().collect();
    for provider in &excluded {
        registry.deregister(provider.as_ref());
    }
    for provider in &excluded {
        provider.teardown().await;
        println!("➖ Removed provider {}", provider.id());
    }
    lb.clear_metrics();
    call_and_print_stats(&lb, requests, json).await?;

    let newcomer: Arc<dyn Provider> = Arc::new(InMemoryProvider::new(
        &config.load_balancer,
        registry.notifier(),
    ));
    providers.push(Arc::clone(&newcomer));
    match registry.register(Arc::clone(&newcomer)) {
        Ok(()) => println!("➕ Registered provider {}", newcomer.id()),
        Err(e) => warn!("Unable to register instance: {}", e),
    }
    lb.clear_metrics();
    call_and_print_stats(&lb, requests, json).await?;

    teardown_all(&providers).await;
    registry.shutdown();

    demo_saturation(config).await
}

/// 同步发送请求并打印分布
async fn call_and_print_stats(lb: &LoadBalanceManager, requests: usize, json: bool) -> Result<()> {
    for _ in 0..requests {
        match lb.dispatch() {
            Ok(invocation) => {
                if let Err(e) = invocation.await {
                    error!("Request failed: {}", e);
                }
            }
            Err(e) => {
                warn!("Unable to process request: {}", e);
                break;
            }
        }
    }

    let snapshot = lb.metrics_snapshot();
    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    println!("📊 Request distribution ({})", snapshot.strategy);
    println!("==================");
    for (provider, count) in &snapshot.per_provider {
        println!("  {} -- {}", provider, count);
    }
    println!("Total calls: {}", snapshot.total_dispatches);
    println!();
    Ok(())
}

/// 两个provider各自被长任务占满后，请求应被拒绝
async fn demo_saturation(mut config: Config) -> Result<()> {
    info!("Checking max capacity");
    config.load_balancer.max_concurrent_workers_per_provider = 2;
    let lb = LoadBalancerBuilder::new(&config).build();
    let registry = lb.registry();

    let providers: Vec<Arc<dyn Provider>> = (0..2)
        .map(|_| {
            Arc::new(InMemoryProvider::new(
                &config.load_balancer,
                registry.notifier(),
            )) as Arc<dyn Provider>
        })
        .collect();
    for provider in &providers {
        if let Err(e) = registry.register(Arc::clone(provider)) {
            warn!("Unable to register instance: {}", e);
        }
    }

    // 等待注册时的首次健康检查结束
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut long_running = Vec::new();
    for provider in &providers {
        for _ in 0..2 {
            let invocation = ProviderAction::SlowGet(Duration::from_secs(3600)).invoke_on(provider)?;
            long_running.push(invocation);
        }
    }

    match lb.dispatch() {
        Err(LoadBalancerError::ServiceUnavailable) => {
            println!("✅ Every provider is busy, request rejected as service unavailable");
        }
        Err(e) => return Err(e.into()),
        Ok(invocation) => {
            invocation.abort();
            println!("⚠️  Request was accepted although every provider should be busy");
        }
    }

    for invocation in &long_running {
        invocation.abort();
    }
    teardown_all(&providers).await;
    registry.shutdown();
    Ok(())
}

async fn teardown_all(providers: &[Arc<dyn Provider>]) {
    for provider in providers {
        if !provider.teardown().await {
            warn!("Provider {} did not drain before its grace period", provider.id());
        }
    }
}
