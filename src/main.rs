// src/main.rs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rpmts::cache::CacheStore;
use rpmts::{
    DbMode, Header, HeaderRef, Manifest, OrderOutcome, PackageDatabase, RpmDb, Tag,
    TransactionConfig, TransactionSet,
};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::info;

#[derive(Parser)]
#[command(name = "rpmts")]
#[command(author, version, about = "Check and order RPM transactions", long_about = None)]
struct Cli {
    /// Installed package database
    #[arg(short, long, global = true)]
    db: Option<PathBuf>,

    /// Transaction configuration (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty package database
    Init,
    /// Record the manifest's install entries as installed packages
    Import {
        /// Path to the manifest
        manifest: PathBuf,
    },
    /// Check the dependencies of a manifest's transaction
    Check {
        /// Path to the manifest
        manifest: PathBuf,
    },
    /// Check and order a manifest's transaction
    Order {
        /// Path to the manifest
        manifest: PathBuf,
    },
}

fn load_config(cli: &Cli) -> Result<TransactionConfig> {
    let mut config = match &cli.config {
        Some(path) => TransactionConfig::load(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => TransactionConfig::default(),
    };
    if let Some(db) = &cli.db {
        config.db_path = Some(db.clone());
    }
    Ok(config)
}

fn db_path(config: &TransactionConfig) -> Result<String> {
    let path = config
        .db_path
        .as_ref()
        .context("no database given; use --db or set db_path")?;
    Ok(path.to_string_lossy().to_string())
}

/// Build a transaction set from a manifest
fn assemble(config: TransactionConfig, manifest_path: &Path) -> Result<TransactionSet> {
    let manifest = Manifest::from_file(manifest_path)
        .with_context(|| format!("reading manifest {}", manifest_path.display()))?;

    let db = match &config.db_path {
        Some(path) if config.db_mode != DbMode::Disabled && path.exists() => {
            Some(Rc::new(RpmDb::open(&path.to_string_lossy(), config.db_mode)?))
        }
        _ => None,
    };
    let cache_depends = config.cache_depends;
    let mut ts = TransactionSet::new(config);

    if let Some(db) = &db {
        let database: Rc<dyn PackageDatabase> = db.clone();
        ts.set_database(database);
        if cache_depends {
            let store: Rc<dyn CacheStore> = db.clone();
            ts.set_cache_store(store);
        }
    }

    for spec in &manifest.available {
        ts.add_available_package(Rc::new(spec.to_header()?));
    }

    for spec in &manifest.install {
        let h: HeaderRef = Rc::new(spec.to_header()?);
        let outcome = ts.add_install_element(h, spec.key.clone(), spec.upgrade, Vec::new())?;
        info!("{}: {:?}", spec.name, outcome);
    }

    for spec in &manifest.erase {
        let Some(db) = &db else {
            anyhow::bail!("cannot erase {} without a package database", spec.name);
        };
        let mut found = false;
        for installed in db.init_iterator(Tag::Name, Some(&spec.name))? {
            if spec
                .version
                .as_deref()
                .is_some_and(|v| v != installed.header.version())
            {
                continue;
            }
            ts.add_erase_element(installed.header, installed.offset)?;
            found = true;
        }
        if !found {
            anyhow::bail!("package {} is not installed", spec.name);
        }
    }

    Ok(ts)
}

fn run_check(ts: &mut TransactionSet) -> Result<bool> {
    let problems = ts.check()?;
    if problems == 0 {
        println!("No dependency problems");
        return Ok(true);
    }
    println!("Dependency problems:");
    print!("{}", ts.problems());
    for hint in ts.skipped_hints() {
        println!("Skipped hint: {}", hint.dependency);
    }
    Ok(false)
}

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::Init) => {
            let config = load_config(&cli)?;
            let path = db_path(&config)?;
            info!("Initializing package database at: {}", path);
            rpmts::db::init(&path)?;
            println!("Database initialized successfully at: {}", path);
            Ok(())
        }
        Some(Commands::Import { manifest }) => {
            let config = load_config(&cli)?;
            let path = db_path(&config)?;
            let manifest = Manifest::from_file(manifest)?;
            let db = RpmDb::open(&path, DbMode::ReadWrite)?;
            for spec in &manifest.install {
                let h = spec.to_header()?;
                let offset = db.add_package(&h)?;
                println!("Recorded {} as instance {}", h.nevra(), offset);
            }
            Ok(())
        }
        Some(Commands::Check { manifest }) => {
            let config = load_config(&cli)?;
            let mut ts = assemble(config, manifest)?;
            if !run_check(&mut ts)? {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Commands::Order { manifest }) => {
            let config = load_config(&cli)?;
            let mut ts = assemble(config, manifest)?;
            if !run_check(&mut ts)? {
                std::process::exit(1);
            }
            match ts.order() {
                OrderOutcome::Ordered => {
                    for te in ts.elements() {
                        println!("{}{}", te.element_type(), te.nevra());
                    }
                    Ok(())
                }
                OrderOutcome::Unordered { remaining } => {
                    anyhow::bail!("ordering failed, {} elements remain", remaining)
                }
            }
        }
        None => {
            println!("rpmts v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'rpmts --help' for usage information");
            Ok(())
        }
    }
}
