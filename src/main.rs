use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use contactbook::accounts::AccountDirectory;
use contactbook::handlers::{self, AppState};
use contactbook::persistence::{self, DataStore, LoadStatus, LocalFile};
use contactbook::remote::GithubContents;
use contactbook::Store;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug, Clone)]
#[command(name = "contactbook", about = "Contacts, events and groups manager")]
struct Cli {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value = "8080")]
    port: u16,

    /// Local JSON document path
    #[arg(long, env = "CONTACTBOOK_DATA", default_value = "app_data.json")]
    data: String,

    /// Seed the contact book with sample data if empty
    #[arg(long, default_value_t = false)]
    seed: bool,

    /// `owner/repo` holding the remote documents; enables the remote store
    #[arg(long, env = "CONTACTBOOK_REMOTE_REPO")]
    remote_repo: Option<String>,

    /// API token for the remote store
    #[arg(long, env = "CONTACTBOOK_REMOTE_TOKEN", hide_env_values = true)]
    remote_token: Option<String>,

    /// Folder holding users.json and the per-user documents
    #[arg(long, env = "CONTACTBOOK_REMOTE_FOLDER", default_value = "DATA")]
    remote_folder: String,

    /// Base URL of the remote contents API
    #[arg(long, env = "CONTACTBOOK_REMOTE_API", default_value = "https://api.github.com")]
    remote_api: String,

    /// Account name on the remote store
    #[arg(long, env = "CONTACTBOOK_USER")]
    user: Option<String>,

    /// Account password on the remote store
    #[arg(long, env = "CONTACTBOOK_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Register the account before logging in
    #[arg(long, default_value_t = false)]
    register: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("contactbook=info".parse()?))
        .init();

    let cli = Cli::parse();

    // Remote calls block, keep them off the async workers.
    let backend: Arc<dyn DataStore> = match cli.remote_repo.clone() {
        Some(repo) => {
            let cli = cli.clone();
            tokio::task::spawn_blocking(move || remote_backend(&cli, &repo)).await??
        }
        None => Arc::new(LocalFile::new(&cli.data)),
    };

    let store = {
        let backend = backend.clone();
        let seed = cli.seed;
        tokio::task::spawn_blocking(move || prepare_store(backend.as_ref(), seed)).await??
    };

    let state = Arc::new(AppState::new(store, backend));
    let app = handlers::router(state);

    let addr = format!("0.0.0.0:{}", cli.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("contactbook listening on http://localhost:{}", cli.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!("failed to listen for CTRL+C: {}", err);
            }
            info!("Shutting down contactbook...");
        })
        .await?;

    Ok(())
}

fn remote_backend(cli: &Cli, repo: &str) -> Result<Arc<dyn DataStore>> {
    let token = cli
        .remote_token
        .clone()
        .context("--remote-token is required with --remote-repo")?;
    let user = cli
        .user
        .clone()
        .context("--user is required with --remote-repo")?;
    let password = cli.password.clone().unwrap_or_default();

    let remote = GithubContents::new(&cli.remote_api, repo, token);
    let directory = AccountDirectory::new(remote, &cli.remote_folder);

    if cli.register && !directory.register(&user, &password) {
        bail!("registration of `{user}` was denied");
    }
    if !directory.login(&user, &password) {
        bail!("login as `{user}` was denied");
    }
    Ok(Arc::new(directory.data_file(&user)))
}

fn prepare_store(backend: &dyn DataStore, seed: bool) -> Result<Store> {
    let (mut store, status) = persistence::load_store(backend);
    let seedable = match status {
        LoadStatus::Loaded => true,
        LoadStatus::Fresh => {
            info!("starting with an empty contact book");
            true
        }
        LoadStatus::Failed(err) => {
            warn!("starting with an empty contact book after load failure: {}", err);
            false
        }
    };

    if seed && seedable && store.is_empty() {
        info!("Seeding contact book with sample data...");
        store.seed_data()?;
        if persistence::save_store(backend, &store).is_err() {
            warn!("seeded data is kept in memory only");
        }
        info!("Seeded {} contacts.", store.contacts().len());
    }
    Ok(store)
}
