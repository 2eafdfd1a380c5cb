//! pkgrelay - package relay CLI
//!
//! Runs the relay service and exposes its building blocks for operators.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use pkgrelay_core::artifact::{ArtifactKind, WheelName};
use pkgrelay_core::config::ServiceConfig;
use pkgrelay_core::index::PypiIndex;
use pkgrelay_core::matcher::MatchPolicy;
use pkgrelay_core::server::{self, AppState};
use pkgrelay_core::tags::{compute_client_tags, Environment, OsFamily, RuntimeFamily, TagSet};
use pkgrelay_core::{ContentCache, FetchPipeline};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pkgrelay")]
#[command(version)]
#[command(about = "Resolve, verify and serve platform-matched package archives", long_about = None)]
struct Cli {
    /// Config file (YAML)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service
    Serve {
        #[command(flatten)]
        overrides: Overrides,
        /// Listen address
        #[arg(long)]
        bind: Option<String>,
    },
    /// Print compatibility tags for an environment (host by default)
    Tags {
        #[command(flatten)]
        env: EnvArgs,
        /// Print the comma-joined wire form
        #[arg(long)]
        wire: bool,
    },
    /// Resolve and fetch a package through the local cache
    Fetch {
        package: String,
        #[arg(long)]
        version: Option<String>,
        /// Comma-joined tag list (host tags by default)
        #[arg(long)]
        tags: Option<String>,
        /// Ignore cached entries
        #[arg(long)]
        force: bool,
        /// Write the archive here (default: <package>.zip)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        #[command(flatten)]
        overrides: Overrides,
    },
    /// Show the tags an artifact filename declares
    Inspect { filename: String },
    /// Inspect the content cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// List entries
    List,
    /// Re-verify every entry's digest
    Verify,
}

/// Flags that override the loaded configuration
#[derive(Args)]
struct Overrides {
    #[arg(long)]
    cache_dir: Option<PathBuf>,
    #[arg(long)]
    index_url: Option<String>,
    /// index-order | preference-rank
    #[arg(long)]
    match_policy: Option<MatchPolicy>,
    #[arg(long)]
    retries: Option<u32>,
    /// Index request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
}

impl Overrides {
    fn apply(self, config: &mut ServiceConfig) {
        if let Some(v) = self.cache_dir {
            config.cache_dir = v;
        }
        if let Some(v) = self.index_url {
            config.index_url = v;
        }
        if let Some(v) = self.match_policy {
            config.match_policy = v;
        }
        if let Some(v) = self.retries {
            config.retries = v;
        }
        if let Some(v) = self.timeout {
            config.request_timeout_secs = v;
        }
    }
}

#[derive(Args)]
struct EnvArgs {
    /// Runtime family (cpython, pypy, graalpy, ...)
    #[arg(long)]
    family: Option<String>,
    #[arg(long, default_value_t = 3)]
    major: u32,
    #[arg(long)]
    minor: Option<u32>,
    #[arg(long)]
    arch: Option<String>,
    /// linux, macos, windows
    #[arg(long)]
    os: Option<String>,
    /// glibc version, e.g. 2.31
    #[arg(long)]
    libc: Option<String>,
    /// OS release, e.g. 14.0 for macOS
    #[arg(long)]
    os_version: Option<String>,
    /// ABI flavor suffix, e.g. t for free-threaded CPython
    #[arg(long)]
    abi_flavor: Option<String>,
}

impl EnvArgs {
    fn environment(&self) -> Result<Environment> {
        let host = Environment::detect(self.major, self.minor);
        let mut env = Environment::new(
            self.family.as_deref().map(RuntimeFamily::parse).unwrap_or(host.family),
            self.major,
            self.minor,
            self.arch.as_deref().unwrap_or(&host.arch),
            self.os.as_deref().map(OsFamily::parse).unwrap_or(host.os),
        );
        env.libc = match &self.libc {
            Some(v) => Some(parse_pair(v).context("--libc")?),
            None => host.libc,
        };
        env.os_version = match &self.os_version {
            Some(v) => Some(parse_pair(v).context("--os-version")?),
            None => host.os_version,
        };
        if let Some(flavor) = &self.abi_flavor {
            env = env.with_abi_flavor(flavor);
        }
        Ok(env)
    }
}

/// Parse "MAJOR.MINOR"
fn parse_pair(s: &str) -> Result<(u32, u32)> {
    let (major, minor) = s.split_once('.').unwrap_or((s, "0"));
    Ok((major.trim().parse()?, minor.trim().parse()?))
}

fn host_tags() -> TagSet {
    compute_client_tags(&Environment::detect(3, None))
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_pipeline(config: &ServiceConfig) -> Result<FetchPipeline> {
    let cache = ContentCache::with_digest_len(&config.cache_dir, config.key_digest_len)?;
    let index = PypiIndex::new(&config.index_url, config.request_timeout(), config.retries)?;
    let pipeline = FetchPipeline::new(Arc::new(index), cache, config.match_policy);
    Ok(match &config.scratch_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating scratch directory {}", dir.display()))?;
            pipeline.with_scratch_root(dir)
        }
        None => pipeline,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = ServiceConfig::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { overrides, bind } => {
            overrides.apply(&mut config);
            if let Some(bind) = bind {
                config.bind = bind;
            }
            config.validate()?;

            let pipeline = build_pipeline(&config)?;
            println!("{} pkgrelay {} on {}", "▶".green(), pkgrelay_core::VERSION, config.bind.bold());
            println!("  index: {}", config.index_url);
            println!("  cache: {}", config.cache_dir.display());
            println!("  match policy: {}", config.match_policy);

            server::serve(AppState::new(pipeline, host_tags()), &config.bind).await?;
        }

        Commands::Tags { env, wire } => {
            let tags = compute_client_tags(&env.environment()?);
            if wire {
                println!("{}", tags.to_wire());
            } else {
                for tag in &tags {
                    println!("{}", tag);
                }
            }
        }

        Commands::Fetch {
            package,
            version,
            tags,
            force,
            output,
            overrides,
        } => {
            overrides.apply(&mut config);
            config.validate()?;

            let pipeline = build_pipeline(&config)?;
            let tags = tags.unwrap_or_else(|| host_tags().to_wire());
            let outcome = pipeline
                .resolve_and_fetch(&package, version.as_deref(), &tags, force)
                .await
                .with_context(|| format!("fetching {}", package))?;

            let output = output.unwrap_or_else(|| PathBuf::from(format!("{}.zip", outcome.package)));
            std::fs::write(&output, &outcome.bytes)
                .with_context(|| format!("writing {}", output.display()))?;

            let source = if outcome.cache_hit { "cache".cyan() } else { "index".yellow() };
            println!("{} {}=={} from {}", "✓".green(), outcome.package, outcome.version, source);
            if let Some(artifact) = &outcome.artifact {
                println!("  artifact: {}", artifact);
            }
            println!("  sha256:   {}", outcome.sha256);
            println!("  written:  {} ({} bytes)", output.display(), outcome.bytes.len());
        }

        Commands::Inspect { filename } => match ArtifactKind::classify(&filename) {
            ArtifactKind::Wheel => {
                let wheel = WheelName::parse(&filename)?;
                println!("{} {} {}", "wheel".bold(), wheel.name, wheel.version);
                if let Some(build) = &wheel.build {
                    println!("  build: {}", build);
                }
                for tag in wheel.tags() {
                    println!("  {}", tag);
                }
            }
            ArtifactKind::SourceDist => {
                println!("{} (matched by kind, declares no tags)", "source distribution".bold());
            }
            ArtifactKind::Other => bail!("not a distribution artifact: {}", filename),
        },

        Commands::Cache { command, cache_dir } => {
            if let Some(dir) = cache_dir {
                config.cache_dir = dir;
            }
            let cache = ContentCache::with_digest_len(&config.cache_dir, config.key_digest_len)?;

            match command {
                CacheCommands::List => {
                    let entries = cache.entries()?;
                    if entries.is_empty() {
                        println!("No cache entries in {}", cache.root().display());
                    }
                    for (key, entry) in entries {
                        println!(
                            "{}  {}=={}  {} bytes  {}",
                            key.bold(),
                            entry.package,
                            entry.version,
                            entry.size_bytes,
                            entry.created_at
                        );
                    }
                }
                CacheCommands::Verify => {
                    let mut failed = 0;
                    for status in cache.verify_all()? {
                        if status.valid {
                            println!("{} {}", "✓".green(), status.key);
                        } else {
                            failed += 1;
                            println!("{} {}", "✗".red(), status.key);
                        }
                    }
                    if failed > 0 {
                        bail!("{} cache entries failed verification", failed);
                    }
                }
            }
        }
    }

    Ok(())
}
