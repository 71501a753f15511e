// # hubctl - Service Hub Control
//
// ⚠️ ARCHITECTURAL CONSTRAINTS ⚠️
//
// - This is a THIN front end ONLY: parse flags, build collaborators, call
//   into hub-core, print the result
// - DO NOT add settings, composition or DNS logic here
// - Hub settings come from the settings sources (hub.toml, secrets/, .env,
//   HUB_* variables); hubctl's own flags are the only thing read here
//
// ## Configuration
//
// - `HUBCTL_PROJECT_DIR`: project directory holding hub.toml (default: `.`)
// - `HUBCTL_LOG_LEVEL`: trace, debug, info, warn, error (default: warn)
// - `CLOUDFLARE_API_TOKEN`: API token for `dns` commands
// - `CLOUDFLARE_ACCOUNT_ID`: restrict zone lookup to one account (optional)
//
// ## Example
//
// ```bash
// hubctl config init
// hubctl config set parent_dns_domain example.com
// hubctl config set traefik_stack_env.TZ Europe/Berlin
// hubctl env traefik --write stacks/traefik/.env
// CLOUDFLARE_API_TOKEN=... hubctl dns create whoami --verify
// ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use hub_core::config::{DnsPolicy, HubConfig};
use hub_core::net::{PublicIpCache, SystemHostProbe};
use hub_core::settings::RawSource;
use hub_core::{DnsReconciler, ResolvedSettings, SettingsProvider, hub_compositor};
use hub_net_http::{DohResolver, HttpPublicIp};
use serde_json::Value;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{Level, debug, error};
use tracing_subscriber::FmtSubscriber;

/// Exit codes for different termination scenarios
///
/// - 0: Success
/// - 1: Configuration error (missing or invalid settings, bad flags)
/// - 2: Runtime error (I/O, network, provider)
#[derive(Debug, Clone, Copy)]
enum HubExitCode {
    Success = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<HubExitCode> for ExitCode {
    fn from(code: HubExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

#[derive(Debug, Parser)]
#[command(name = "hubctl", version, about = "Manage a service hub's settings, stack environments and DNS records")]
struct Cli {
    /// Project directory holding hub.toml, .env and secrets/
    #[arg(long, env = "HUBCTL_PROJECT_DIR", default_value = ".", global = true)]
    project_dir: PathBuf,

    /// Log level written to stderr
    #[arg(long, env = "HUBCTL_LOG_LEVEL", default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Inspect and edit the settings document
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Print or write the environment dictionary of one stack
    Env {
        /// Dictionary name (base, traefik, portainer, app, portainer-runtime)
        dictionary: String,

        /// Write a dotenv file instead of printing
        #[arg(long, value_name = "FILE")]
        write: Option<PathBuf>,
    },

    /// Manage DNS records at the provider
    #[command(subcommand)]
    Dns(DnsCommand),
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Create the settings document with every setting documented
    Init,

    /// Print one stored value (`name` or `map_setting.KEY`)
    Get { path: String },

    /// Store one value, parsed as the setting's type; `null` removes it
    Set { path: String, value: String },

    /// Print the fully resolved settings
    Show {
        #[arg(long)]
        show_secrets: bool,
    },
}

#[derive(Debug, Subcommand)]
enum DnsCommand {
    /// Point a name at a target
    Create {
        /// Record name; a bare label is placed under parent_dns_domain
        name: String,

        /// IPv4 address or DNS name (default: stable_public_dns_name)
        #[arg(long)]
        target: Option<String>,

        /// Record TTL in seconds (default: dns_ttl)
        #[arg(long)]
        ttl: Option<u32>,

        /// Replace a record that differs from the desired one
        #[arg(long)]
        overwrite: bool,

        /// Fail when an identical record already exists
        #[arg(long)]
        no_allow_existing: bool,

        /// Require the target to resolve to the current public IP first
        #[arg(long)]
        verify: bool,

        #[command(flatten)]
        provider: ProviderArgs,
    },

    /// Remove the A or CNAME record at a name
    Delete {
        name: String,

        /// Fail when there is no record to delete
        #[arg(long)]
        require_existing: bool,

        #[command(flatten)]
        provider: ProviderArgs,
    },
}

#[derive(Debug, Args)]
struct ProviderArgs {
    #[arg(long, env = "CLOUDFLARE_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    #[arg(long, env = "CLOUDFLARE_ACCOUNT_ID")]
    account_id: Option<String>,

    /// Log the change batch instead of sending it
    #[arg(long)]
    dry_run: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => {
            eprintln!(
                "HUBCTL_LOG_LEVEL '{}' is not valid. Valid levels: trace, debug, info, warn, error",
                other
            );
            return HubExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return HubExitCode::RuntimeError.into();
    }

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return HubExitCode::RuntimeError.into();
        }
    };

    match rt.block_on(run(cli)) {
        Ok(()) => HubExitCode::Success.into(),
        Err(e) => {
            eprintln!("error: {:#}", e);
            exit_code_for(&e).into()
        }
    }
}

/// Configuration errors from hub-core map to 1, everything else to 2
fn exit_code_for(err: &anyhow::Error) -> HubExitCode {
    match err.downcast_ref::<hub_core::Error>() {
        Some(e) if e.is_configuration() => HubExitCode::ConfigError,
        _ => HubExitCode::RuntimeError,
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = HubConfig::new(&cli.project_dir);
    let provider = SettingsProvider::from_config(&config, Arc::new(SystemHostProbe::new()))?;
    debug!("Using settings document {}", config.settings_file.display());

    match cli.command {
        Command::Config(cmd) => run_config(cmd, &config, &provider).await,
        Command::Env { dictionary, write } => {
            let settings = provider.get(&RawSource::new()).await?;
            let compositor = hub_compositor(provider.resolver().schema())?;
            let dict = compositor.compose(&dictionary, &settings)?;
            match write {
                Some(path) => {
                    dict.write_dotenv(&path).await?;
                    println!("Wrote {} variable(s) to {}", dict.len(), path.display());
                }
                None => print!("{}", dict.to_dotenv()),
            }
            Ok(())
        }
        Command::Dns(cmd) => run_dns(cmd, &provider).await,
    }
}

async fn run_config(cmd: ConfigCommand, config: &HubConfig, provider: &SettingsProvider) -> Result<()> {
    let store = provider.store();
    match cmd {
        ConfigCommand::Init => {
            if config.settings_file.exists() {
                println!("{} already exists; left unchanged", config.settings_file.display());
            } else {
                store.load().await?;
                println!("Created {}", config.settings_file.display());
            }
        }
        ConfigCommand::Get { path } => match store.get(&path).await? {
            Some(value) => println!("{}", render(&value)),
            None => println!("{} is not set in {}", path, store.path().display()),
        },
        ConfigCommand::Set { path, value } => {
            provider.set(&path, parse_cli_value(&value)).await?;
            println!("Saved {} to {}", path, store.path().display());
        }
        ConfigCommand::Show { show_secrets } => {
            let settings = provider.get(&RawSource::new()).await?;
            let json = if show_secrets {
                settings.to_json()
            } else {
                settings.to_json_redacted()
            };
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }
    Ok(())
}

async fn run_dns(cmd: DnsCommand, provider: &SettingsProvider) -> Result<()> {
    let settings = provider.get(&RawSource::new()).await?;
    match cmd {
        DnsCommand::Create {
            name,
            target,
            ttl,
            overwrite,
            no_allow_existing,
            verify,
            provider: args,
        } => {
            let fqdn = qualify_name(&name, &settings)?;
            let target = match target {
                Some(target) => target,
                None => settings
                    .str("stable_public_dns_name")
                    .context("stable_public_dns_name is not resolved")?
                    .to_string(),
            };
            let ttl = match ttl {
                Some(ttl) => ttl,
                None => default_ttl(&settings)?,
            };

            let mut policy = DnsPolicy::default().with_ttl(ttl).overwrite(overwrite);
            policy.allow_existing = !no_allow_existing;
            if verify {
                policy = policy.verify_against(None);
            }

            let outcome = reconciler(&args)?.create_or_update(&fqdn, &target, &policy).await?;
            println!("{}", outcome);
        }
        DnsCommand::Delete {
            name,
            require_existing,
            provider: args,
        } => {
            let fqdn = qualify_name(&name, &settings)?;
            let policy = DnsPolicy {
                allow_missing: !require_existing,
                ..DnsPolicy::default()
            };
            let outcome = reconciler(&args)?.delete(&fqdn, &policy).await?;
            println!("{}", outcome);
        }
    }
    Ok(())
}

#[cfg(feature = "cloudflare")]
fn reconciler(args: &ProviderArgs) -> Result<DnsReconciler> {
    let token = args.api_token.clone().ok_or_else(|| {
        hub_core::Error::config(
            "CLOUDFLARE_API_TOKEN is required for dns commands. Set it via: export CLOUDFLARE_API_TOKEN=your_token",
        )
    })?;
    let zones = hub_dns_cloudflare::CloudflareZoneApi::new(token, args.account_id.clone(), args.dry_run)?;
    Ok(DnsReconciler::new(
        Box::new(zones),
        Box::new(DohResolver::new()?),
        Box::new(PublicIpCache::new(Box::new(HttpPublicIp::new()?))),
    ))
}

#[cfg(not(feature = "cloudflare"))]
fn reconciler(_args: &ProviderArgs) -> Result<DnsReconciler> {
    Err(hub_core::Error::config("hubctl was built without a DNS provider").into())
}

/// A bare label is placed under `parent_dns_domain`
fn qualify_name(name: &str, settings: &ResolvedSettings) -> Result<String> {
    let name = name.trim().trim_end_matches('.');
    if name.contains('.') {
        return Ok(name.to_string());
    }
    let parent = settings
        .str("parent_dns_domain")
        .context("parent_dns_domain is not resolved")?;
    Ok(format!("{}.{}", name, parent))
}

fn default_ttl(settings: &ResolvedSettings) -> Result<u32> {
    let ttl = settings.int("dns_ttl").context("dns_ttl is not resolved")?;
    u32::try_from(ttl).map_err(|_| hub_core::Error::config(format!("dns_ttl {} is out of range", ttl)).into())
}

/// Command-line text for the store
///
/// The text is passed through as a string so the store coerces it by the
/// setting's kind; only `null` is special and removes the entry.
fn parse_cli_value(raw: &str) -> Value {
    match raw {
        "null" => Value::Null,
        text => Value::String(text.to_string()),
    }
}

/// Strings print bare, everything else as JSON
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
