//! `capmount` - mount a capability-based filesystem with FUSE.
//!
//! ```bash
//! # Serve a host directory
//! capmount /mnt/data --source ~/data
//!
//! # An in-memory scratch tree without symlink support
//! capmount /mnt/scratch --memory --disable symlink -v
//! ```

use anyhow::{Context, Result};
use capfs_core::{Basic, Capabilities, Capability, HostFs, MemFs, Restricted};
use capfs_fuse::{CallHook, CapFs, MountConfig, Root, audit_hook, read_only_hook, spawn_mount};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Mount a capability-based filesystem
#[derive(Parser, Debug)]
#[command(name = "capmount", version, about)]
struct Args {
    /// Directory where the filesystem will be mounted
    #[arg(value_name = "MOUNTPOINT")]
    mountpoint: PathBuf,

    /// Host directory to serve
    #[arg(short, long, value_name = "DIR", conflicts_with = "memory")]
    source: Option<PathBuf>,

    /// Serve an empty in-memory tree
    #[arg(long)]
    memory: bool,

    /// Hide optional capabilities (dir, symlink, change)
    #[arg(long, value_delimiter = ',', value_name = "CAP")]
    disable: Vec<Capability>,

    /// Reject every modifying call with EROFS
    #[arg(long)]
    read_only: bool,

    /// Allow other users to access the mount
    #[arg(long)]
    allow_other: bool,

    /// Attribute and entry cache TTL in seconds
    #[arg(long, value_name = "SECS", default_value_t = 1)]
    attr_ttl: u64,

    /// I/O worker threads (0 = handle I/O on the session thread)
    #[arg(long, value_name = "N", env = "CAPFS_THREADS")]
    threads: Option<usize>,

    /// Log every call reaching the filesystem
    #[arg(long)]
    audit: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn setup_tracing(verbose: u8, quiet: bool) {
    let filter = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(std::io::stderr)
        .init();
}

fn backend(args: &Args) -> Result<Arc<dyn Basic>> {
    let fs: Arc<dyn Basic> = match &args.source {
        Some(source) => {
            let host = HostFs::new(source)
                .with_context(|| format!("Cannot serve {}", source.display()))?;
            if args.disable.is_empty() {
                Arc::new(host)
            } else {
                Arc::new(Restricted::new(host, allowed(&args.disable)))
            }
        }
        None => {
            if !args.memory {
                tracing::info!("no --source given, serving an in-memory tree");
            }
            if args.disable.is_empty() {
                Arc::new(MemFs::new())
            } else {
                Arc::new(Restricted::new(MemFs::new(), allowed(&args.disable)))
            }
        }
    };
    Ok(fs)
}

fn allowed(disable: &[Capability]) -> Capabilities {
    disable
        .iter()
        .fold(Capabilities::ALL, |caps, cap| caps.without(*cap))
}

fn hook(args: &Args) -> Option<CallHook> {
    let hook = args.read_only.then(read_only_hook);
    if args.audit {
        Some(audit_hook(hook))
    } else {
        hook
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    setup_tracing(args.verbose, args.quiet);

    let fs = backend(&args)?;
    let root = match hook(&args) {
        Some(hook) => Root::with_hook(fs, hook),
        None => Root::new(fs),
    };

    let ttl = Duration::from_secs(args.attr_ttl);
    let mut config = MountConfig::default()
        .attr_ttl(ttl)
        .entry_ttl(ttl)
        .read_only(args.read_only)
        .allow_other(args.allow_other)
        .worker_threads(args.threads.unwrap_or_else(num_cpus::get));
    if let Some(source) = &args.source {
        config = config.fs_name(format!("capfs:{}", source.display()));
    }

    let filesystem = CapFs::new(root, config).context("Failed to create filesystem")?;
    let handle = spawn_mount(filesystem, &args.mountpoint)
        .with_context(|| format!("Failed to mount at {}", args.mountpoint.display()))?;

    if !args.quiet {
        eprintln!("Mounted at {}", args.mountpoint.display());
        eprintln!("Press Ctrl-C to unmount");
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        eprintln!("\nReceived interrupt signal, unmounting...");
        r.store(false, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));
    }

    handle.unmount();
    if !args.quiet {
        eprintln!("Unmounted");
    }
    Ok(())
}
