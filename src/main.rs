//! awsauth operator - keeps the EKS aws-auth ConfigMap in sync with MapRole / MapUser resources

use std::sync::Arc;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use awsauth::authmap::{AuthMapService, AuthMapStore, ServiceConfig};
use awsauth::controller::{error_policy, reconcile, Context};
use awsauth::crd::{MapRole, MapUser};
use awsauth::retry::RetryConfig;

/// awsauth - manage aws-auth ConfigMap entries declaratively
#[derive(Parser, Debug)]
#[command(name = "awsauth-operator", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    #[command(flatten)]
    retry: RetryArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Retry budget applied to every auth map operation
#[derive(Args, Debug)]
struct RetryArgs {
    /// Retry failed synchronization attempts with exponential backoff
    #[arg(
        long,
        env = "AWSAUTH_WITH_RETRIES",
        default_value_t = true,
        action = ArgAction::Set,
        global = true
    )]
    with_retries: bool,

    /// Delay after the first failed attempt, in milliseconds
    #[arg(long, env = "AWSAUTH_MIN_RETRY_MS", default_value_t = 200, global = true)]
    min_retry_ms: u64,

    /// Upper bound for any retry delay, in milliseconds
    #[arg(long, env = "AWSAUTH_MAX_RETRY_MS", default_value_t = 30_000, global = true)]
    max_retry_ms: u64,

    /// Maximum number of attempts per operation
    #[arg(long, env = "AWSAUTH_MAX_RETRY_COUNT", default_value_t = 12, global = true)]
    max_retry_count: u32,
}

impl RetryArgs {
    fn service_config(&self) -> ServiceConfig {
        let retry = self.with_retries.then(|| RetryConfig {
            max_attempts: self.max_retry_count,
            min_delay: Duration::from_millis(self.min_retry_ms),
            max_delay: Duration::from_millis(self.max_retry_ms),
        });
        ServiceConfig { retry }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as controller (default mode)
    ///
    /// Watches MapRole and MapUser resources and mirrors them into the
    /// aws-auth ConfigMap. Deleted resources are removed before their
    /// finalizer is released.
    Controller,

    /// Insert or update a single entry and exit
    Upsert(UpsertArgs),

    /// Remove a single entry by username and exit
    Remove(RemoveArgs),
}

/// Which aws-auth collection to operate on
#[derive(Clone, Copy, Debug, ValueEnum)]
enum Kind {
    /// A `mapRoles` entry
    Role,
    /// A `mapUsers` entry
    User,
}

/// Upsert mode arguments
#[derive(Args, Debug)]
struct UpsertArgs {
    /// Collection to upsert into
    #[arg(long, value_enum)]
    kind: Kind,

    /// Kubernetes username the ARN maps to
    #[arg(long)]
    username: String,

    /// IAM role or user ARN
    #[arg(long)]
    arn: String,

    /// Kubernetes group to grant (repeatable)
    #[arg(long = "group")]
    groups: Vec<String>,
}

/// Remove mode arguments
#[derive(Args, Debug)]
struct RemoveArgs {
    /// Collection to remove from
    #[arg(long, value_enum)]
    kind: Kind,

    /// Username of the entry to remove
    #[arg(long)]
    username: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.crd {
        let roles = serde_yaml::to_string(&MapRole::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize MapRole CRD: {}", e))?;
        let users = serde_yaml::to_string(&MapUser::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize MapUser CRD: {}", e))?;
        println!("{roles}---\n{users}");
        return Ok(());
    }

    let config = cli.retry.service_config();
    match cli.command {
        Some(Commands::Upsert(args)) => run_upsert(args, config).await,
        Some(Commands::Remove(args)) => run_remove(args, config).await,
        Some(Commands::Controller) | None => run_controller(config).await,
    }
}

async fn service(config: ServiceConfig) -> anyhow::Result<AuthMapService> {
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;
    Ok(AuthMapService::new(AuthMapStore::from_client(client), config)?)
}

/// Run a single upsert against the auth map
async fn run_upsert(args: UpsertArgs, config: ServiceConfig) -> anyhow::Result<()> {
    let service = service(config).await?;
    let outcome = match args.kind {
        Kind::Role => {
            service
                .upsert_map_role(&args.username, &args.arn, args.groups)
                .await?
        }
        Kind::User => {
            service
                .upsert_map_user(&args.username, &args.arn, args.groups)
                .await?
        }
    };
    println!("{:?} '{}': {}", args.kind, args.username, outcome);
    Ok(())
}

/// Run a single removal against the auth map
async fn run_remove(args: RemoveArgs, config: ServiceConfig) -> anyhow::Result<()> {
    let service = service(config).await?;
    let outcome = match args.kind {
        Kind::Role => service.remove_map_role(&args.username).await?,
        Kind::User => service.remove_map_user(&args.username).await?,
    };
    println!("{:?} '{}': {}", args.kind, args.username, outcome);
    Ok(())
}

/// Ensure the MapRole and MapUser CRDs are installed
///
/// The operator installs its own CRDs on startup using server-side apply,
/// so the stored schema always matches the running binary.
async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply("awsauth-controller").force();

    tracing::info!("Installing MapRole CRD...");
    crds.patch(
        "maproles.awsauth.dev",
        &params,
        &Patch::Apply(&MapRole::crd()),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to install MapRole CRD: {}", e))?;

    tracing::info!("Installing MapUser CRD...");
    crds.patch(
        "mapusers.awsauth.dev",
        &params,
        &Patch::Apply(&MapUser::crd()),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to install MapUser CRD: {}", e))?;

    tracing::info!("All awsauth CRDs installed/updated");
    Ok(())
}

/// Run in controller mode - mirrors MapRole / MapUser into aws-auth
async fn run_controller(config: ServiceConfig) -> anyhow::Result<()> {
    tracing::info!("awsauth controller starting...");

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    ensure_crds_installed(&client).await?;

    let ctx = Arc::new(Context::new(client.clone(), config)?);

    let roles: Api<MapRole> = Api::all(client.clone());
    let users: Api<MapUser> = Api::all(client);

    tracing::info!("Starting awsauth controllers...");
    tracing::info!("  - MapRole controller");
    tracing::info!("  - MapUser controller");

    let role_controller = Controller::new(roles, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile::<MapRole>, error_policy::<MapRole>, ctx.clone())
        .for_each(|result| async move {
            match result {
                Ok(action) => {
                    tracing::debug!(?action, "MapRole reconciliation completed");
                }
                Err(e) => {
                    tracing::error!(error = ?e, "MapRole reconciliation error");
                }
            }
        });

    let user_controller = Controller::new(users, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile::<MapUser>, error_policy::<MapUser>, ctx)
        .for_each(|result| async move {
            match result {
                Ok(action) => {
                    tracing::debug!(?action, "MapUser reconciliation completed");
                }
                Err(e) => {
                    tracing::error!(error = ?e, "MapUser reconciliation error");
                }
            }
        });

    tokio::select! {
        _ = role_controller => {
            tracing::info!("MapRole controller completed");
        }
        _ = user_controller => {
            tracing::info!("MapUser controller completed");
        }
    }

    tracing::info!("awsauth controller shutting down");
    Ok(())
}
