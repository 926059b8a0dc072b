//! restfuse daemon entry point

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use restfuse::config::{Config, LoggingConfig};
use restfuse::mount::{serve, MountManager, MountOptions};
use restfuse::source::memory::MemorySource;

/// Print usage information
fn print_usage() {
    eprintln!("Usage: restfuse <config.yaml>");
    eprintln!("       restfuse --mount <mountpoint>");
    eprintln!();
    eprintln!("restfuse - expose a hierarchical data source as a read-only filesystem");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  config.yaml          Path to configuration file");
    eprintln!("  --mount <dir>        Mount the built-in demo tree at <dir>");
    eprintln!();
    eprintln!("Example:");
    eprintln!("  restfuse /etc/restfuse/config.yaml");
}

fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    match args.as_slice() {
        [_, flag, mount_point] if flag == "--mount" => run_demo(PathBuf::from(mount_point)).await,
        [_, config_path] if !config_path.starts_with('-') => {
            run_config(PathBuf::from(config_path)).await
        }
        _ => {
            print_usage();
            std::process::exit(1);
        }
    }
}

/// Serve the demo tree in the foreground until unmounted
async fn run_demo(mount_point: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    init_logging(&LoggingConfig::default());
    info!("restfuse starting with the demo tree");

    let source = Arc::new(MemorySource::demo()?);
    let options = MountOptions::default();

    // mount2 blocks, keep it off the async workers
    tokio::task::spawn_blocking(move || serve(&mount_point, source, &options)).await??;
    Ok(())
}

async fn run_config(config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = match Config::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    }

    init_logging(&config.logging);

    info!("restfuse starting");
    info!("Loaded configuration from {:?}", config_path);

    let manager = Arc::new(MountManager::new());

    // Set up signal handling for graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    let m = manager.clone();

    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
        m.unmount_all();
    })?;

    for mount_config in &config.mounts {
        info!("Setting up mount at {:?}", mount_config.path);

        let source = match mount_config.source.build() {
            Ok(source) => source,
            Err(e) => {
                error!("Failed to build source for {:?}: {}", mount_config.path, e);
                continue;
            }
        };

        if !mount_config.path.exists() {
            debug!("Creating mount point directory {:?}", mount_config.path);
            if let Err(e) = std::fs::create_dir_all(&mount_config.path) {
                error!(
                    "Failed to create mount point {:?}: {}",
                    mount_config.path, e
                );
                continue;
            }
        }

        if let Err(e) = manager.mount(mount_config.path.clone(), source, &mount_config.options()) {
            error!("Failed to mount {:?}: {}", mount_config.path, e);
            continue;
        }
    }

    if manager.count() == 0 {
        error!("No filesystems were mounted successfully");
        std::process::exit(1);
    }

    info!("{} filesystem(s) mounted successfully", manager.count());
    info!("Press Ctrl+C to unmount and exit");

    while running.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
    }

    info!("Shutting down");
    manager.unmount_all();
    info!("All filesystems unmounted, exiting");

    Ok(())
}
