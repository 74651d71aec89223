use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use build_herald::clients::{GiteaClient, JenkinsClient};
use build_herald::config::{self, Config, RuleTable};
use build_herald::processor::{Deps, Dispatcher};
use build_herald::server::{self, AppState};
use build_herald::templates::{self, TemplateData};
use build_herald::types::PrNumber;

#[derive(Parser)]
#[command(name = "build-herald", version, about = "Gitea to Jenkins webhook bridge")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the webhook service.
    Run {
        /// Path to the configuration file.
        #[arg(long, default_value = "config.yaml")]
        config: PathBuf,

        /// Enable debug logging.
        #[arg(long)]
        debug: bool,
    },

    /// Validate the configuration and connectivity, then exit.
    Check {
        /// Path to the configuration file.
        #[arg(long)]
        config: PathBuf,

        /// Enable debug logging.
        #[arg(long)]
        debug: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run { config, debug } => {
            init_tracing(debug);
            run(&config).await
        }
        Command::Check { config, debug } => {
            init_tracing(debug);
            check(&config).await
        }
    }
}

fn init_tracing(debug: bool) {
    let default_filter = if debug {
        "build_herald=debug"
    } else {
        "build_herald=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn run(config_path: &PathBuf) -> anyhow::Result<()> {
    let config = config::load(config_path).context("loading configuration")?;

    let jenkins = JenkinsClient::new(
        &config.jenkins.base_url,
        &config.jenkins.username,
        &config.jenkins.api_token,
    )
    .context("building jenkins client")?;
    let gitea =
        GiteaClient::new(&config.gitea.base_url, &config.gitea.token).context("building gitea client")?;

    let rules = RuleTable::build(&config);
    let dispatcher = Arc::new(Dispatcher::new(
        config.worker_pool_size(),
        config.queue_size(),
        Deps {
            build_server: Arc::new(jenkins),
            source_control: Arc::new(gitea),
            defaults: config.defaults(),
        },
    ));
    dispatcher.start();

    let state = AppState::new(
        rules,
        dispatcher.clone(),
        config.server.webhook_secret.as_bytes().to_vec(),
    );
    let app = server::router(state);

    let listener = tokio::net::TcpListener::bind(config.listen_addr())
        .await
        .with_context(|| format!("binding {}", config.listen_addr()))?;
    tracing::info!(addr = config.listen_addr(), "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;

    let outcome = dispatcher.shutdown(config.shutdown_grace()).await;
    if !outcome.completed {
        tracing::warn!(
            abandoned = outcome.abandoned,
            "exiting with abandoned in-flight tasks"
        );
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

/// Staged preflight: configuration, connectivity, and pattern sanity.
/// Prints one line per stage and exits non-zero on the first hard failure.
async fn check(config_path: &PathBuf) -> anyhow::Result<()> {
    println!("Checking configuration...");
    println!();

    let config = match config::load(config_path) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("✗ Failed to load configuration: {error}");
            std::process::exit(1);
        }
    };
    println!("✓ Configuration file loaded and validated");

    let jenkins = JenkinsClient::new(
        &config.jenkins.base_url,
        &config.jenkins.username,
        &config.jenkins.api_token,
    )?;
    match jenkins.check_accessibility().await {
        Ok(()) => println!("✓ Jenkins is accessible at {}", config.jenkins.base_url),
        Err(error) => {
            eprintln!(
                "✗ Jenkins is not accessible at {}: {error}",
                config.jenkins.base_url
            );
            std::process::exit(1);
        }
    }

    let gitea = GiteaClient::new(&config.gitea.base_url, &config.gitea.token)?;
    match gitea.check_accessibility().await {
        Ok(()) => println!("✓ Gitea is accessible at {}", config.gitea.base_url),
        Err(error) => {
            eprintln!(
                "✗ Gitea is not accessible at {}: {error}",
                config.gitea.base_url
            );
            std::process::exit(1);
        }
    }

    let mut errors = 0;
    for rule in &config.repositories {
        if let Err(error) = gitea.repository_exists(&rule.name).await {
            eprintln!("✗ Repository {} not reachable in Gitea: {error}", rule.name);
            errors += 1;
        } else {
            println!("✓ Repository {} exists in Gitea", rule.name);
        }

        for pattern in &rule.patterns {
            let effective = pattern.effective(rule, &config.defaults());

            if let Err(error) = jenkins
                .check_job_root_exists(effective.job_root.as_deref())
                .await
            {
                eprintln!(
                    "✗ Job root {:?} for {} / {}: {error}",
                    effective.job_root.as_deref().unwrap_or(""),
                    rule.name,
                    pattern.name
                );
                errors += 1;
            }

            match rendered_sample_regex(&config, rule, pattern) {
                Ok(regex) => println!(
                    "✓ Pattern {} / {} compiles (sample: {regex})",
                    rule.name, pattern.name
                ),
                Err(error) => {
                    eprintln!("✗ Pattern {} / {}: {error}", rule.name, pattern.name);
                    errors += 1;
                }
            }
        }
    }

    println!();
    if errors > 0 {
        eprintln!("{errors} check(s) failed");
        std::process::exit(1);
    }
    println!("All checks passed");
    Ok(())
}

/// Renders a pattern's regex template with placeholder PR data and compiles
/// the result, mirroring what the pipeline will do at runtime.
fn rendered_sample_regex(
    config: &Config,
    rule: &config::RepositoryRule,
    pattern: &config::Pattern,
) -> anyhow::Result<String> {
    let effective = pattern.effective(rule, &config.defaults());
    let data = TemplateData {
        repo: rule.name.as_str().to_string(),
        pattern: pattern.name.clone(),
        number: PrNumber(1),
        title: "sample".to_string(),
        url: String::new(),
        source_branch: "feature".to_string(),
        target_branch: "main".to_string(),
        sender: "sample".to_string(),
        timeout: effective.wait_timeout,
        job_name: None,
        job_url: None,
        elapsed: None,
        attempts: None,
    };
    let rendered = templates::render(&pattern.regex, &data)?;
    regex::Regex::new(&rendered)
        .with_context(|| format!("rendered regex {rendered:?} does not compile"))?;
    Ok(rendered)
}
