use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};

use arcfs::{ArchiveFs, Config, EntryKind};

// ── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "arcfs",
    version,
    about = "Treat ZIP, TAR and compressed streams as one filesystem.\n\
             Paths may cross archive boundaries: backup.zip/logs/app.tar.gz/today.log",
    long_about = None,
)]
struct Cli {
    /// Directory for staging temp files
    #[arg(long, global = true, env = "ARCFS_TEMP_DIR", value_name = "DIR")]
    temp_dir: Option<PathBuf>,

    /// In-memory staging limit in bytes before spilling to disk
    #[arg(long, global = true, env = "ARCFS_BUFFER_SIZE", value_name = "BYTES")]
    buffer_size: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the children of a directory or archive
    #[command(name = "ls")]
    List {
        path: String,
        /// Long format: kind, size, mtime
        #[arg(short = 'L', long)]
        long: bool,
    },

    /// Print a file's contents to stdout
    Cat { path: String },

    /// Show metadata for a path
    Stat {
        path: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a file from SOURCE (default: stdin), creating archives as needed
    Write {
        path: String,
        /// Source file to read from (default: stdin)
        source: Option<PathBuf>,
        /// Append instead of overwriting
        #[arg(short, long)]
        append: bool,
    },

    /// Remove a file entry
    Rm { path: String },

    /// Create a directory
    Mkdir {
        path: String,
        /// Create missing parents; existing directories are not an error
        #[arg(short = 'p', long)]
        parents: bool,
    },

    /// Remove a directory
    Rmdir {
        path: String,
        /// Remove contents recursively
        #[arg(short, long)]
        recursive: bool,
    },

    /// Copy a file across any archive boundaries
    Cp { src: String, dst: String },

    /// Move a file across any archive boundaries
    Mv { src: String, dst: String },

    /// Walk a tree and print every entry
    Tree { path: String },

    /// Create an empty archive
    New {
        path: String,
        /// Format extension, when it differs from the file name (e.g. tar.gz)
        #[arg(short, long, value_name = "EXT")]
        format: Option<String>,
    },

    /// Extract files beneath a path into a host directory
    Extract {
        path: String,
        /// Host directory to write into (created if absent)
        outdir: PathBuf,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    let format = tracing_subscriber::fmt::format()
        .without_time()
        .with_target(false)
        .compact();
    tracing_subscriber::fmt()
        .event_format(format)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::default();
    if let Some(dir) = cli.temp_dir {
        config.temp_dir = Some(dir);
    }
    if let Some(bytes) = cli.buffer_size {
        config.global_buffer_size = bytes;
    }
    let fs = ArchiveFs::with_config(config);

    match cli.command {
        Commands::List { path, long } => cmd_ls(&fs, &path, long),
        Commands::Cat { path } => cmd_cat(&fs, &path),
        Commands::Stat { path, json } => cmd_stat(&fs, &path, json),
        Commands::Write { path, source, append } => cmd_write(&fs, &path, source, append),
        Commands::Rm { path } => {
            fs.remove(&path)?;
            println!("Removed {path}");
            Ok(())
        }
        Commands::Mkdir { path, parents } => {
            fs.mkdir(&path, parents)?;
            println!("Created directory {path}");
            Ok(())
        }
        Commands::Rmdir { path, recursive } => {
            fs.rmdir(&path, recursive)?;
            println!("Removed directory {path}");
            Ok(())
        }
        Commands::Cp { src, dst } => {
            fs.copy(&src, &dst)?;
            println!("Copied {src} -> {dst}");
            Ok(())
        }
        Commands::Mv { src, dst } => {
            fs.rename(&src, &dst)?;
            println!("Moved {src} -> {dst}");
            Ok(())
        }
        Commands::Tree { path } => cmd_tree(&fs, &path),
        Commands::New { path, format } => {
            fs.create_archive(&path, format.as_deref())?;
            println!("Created archive {path}");
            Ok(())
        }
        Commands::Extract { path, outdir } => cmd_extract(&fs, &path, outdir),
    }
}

// ── ls ────────────────────────────────────────────────────────────────────────

fn cmd_ls(afs: &ArchiveFs, path: &str, long: bool) -> Result<()> {
    let names = afs.list_dir(path)?;
    let base = path.trim_end_matches('/');
    for name in names {
        if long {
            let info = afs.get_info(&format!("{base}/{name}"))?;
            let kind = match info.kind {
                EntryKind::Dir => "dir",
                EntryKind::File => "file",
                EntryKind::Symlink => "link",
            };
            let mtime = fmt_mtime(info.modified);
            println!("  {kind:<5} {:>10}  {mtime:<19}  {name}", fmt_size(info.size));
        } else {
            println!("{name}");
        }
    }
    Ok(())
}

// ── cat ───────────────────────────────────────────────────────────────────────

fn cmd_cat(afs: &ArchiveFs, path: &str) -> Result<()> {
    let mut stream = afs.open_read(path)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    io::copy(&mut stream, &mut out).with_context(|| format!("reading {path}"))?;
    Ok(())
}

// ── stat ──────────────────────────────────────────────────────────────────────

fn cmd_stat(afs: &ArchiveFs, path: &str, json: bool) -> Result<()> {
    let info = afs.get_info(path)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }
    let kind = match info.kind {
        EntryKind::Dir => "directory",
        EntryKind::File => "file",
        EntryKind::Symlink => "symlink",
    };
    println!("Path:  {}", info.path);
    println!("Kind:  {kind}");
    println!("Size:  {} bytes", info.size);
    println!("Mtime: {}", fmt_mtime(info.modified));
    if let Some(mode) = info.permissions {
        println!("Mode:  {mode:04o}");
    }
    Ok(())
}

// ── Display helpers ───────────────────────────────────────────────────────────

/// Entry mtimes are whole Unix seconds; absent or unrepresentable times
/// render as `-`.
fn fmt_mtime(ts: Option<u64>) -> String {
    ts.and_then(|t| Utc.timestamp_opt(t as i64, 0).single())
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".into())
}

fn fmt_size(n: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    const GIB: u64 = MIB * 1024;
    if n < KIB {
        format!("{n} B")
    } else if n < MIB {
        format!("{:.1} KiB", n as f64 / KIB as f64)
    } else if n < GIB {
        format!("{:.1} MiB", n as f64 / MIB as f64)
    } else {
        format!("{:.1} GiB", n as f64 / GIB as f64)
    }
}

// ── write ─────────────────────────────────────────────────────────────────────

fn cmd_write(afs: &ArchiveFs, path: &str, source: Option<PathBuf>, append: bool) -> Result<()> {
    let content = match source {
        Some(ref src) => fs::read(src).with_context(|| format!("reading source file {src:?}"))?,
        None => {
            let mut buf = Vec::new();
            io::stdin().read_to_end(&mut buf).context("reading stdin")?;
            buf
        }
    };
    let size = content.len();
    if append {
        afs.append(path, &content)?;
        println!("Appended {size} bytes to {path}");
    } else {
        afs.write(path, &content)?;
        println!("Wrote {size} bytes to {path}");
    }
    Ok(())
}

// ── tree ──────────────────────────────────────────────────────────────────────

fn cmd_tree(afs: &ArchiveFs, path: &str) -> Result<()> {
    for (dir, _subdirs, files) in afs.walk(path)? {
        println!("{dir}/");
        for f in files {
            println!("{dir}/{f}");
        }
    }
    Ok(())
}

// ── extract ───────────────────────────────────────────────────────────────────

fn cmd_extract(afs: &ArchiveFs, path: &str, outdir: PathBuf) -> Result<()> {
    let root = path.trim_end_matches('/').to_string();
    let mut count = 0usize;
    for (dir, _subdirs, files) in afs.walk(&root)? {
        let rel_dir = dir.strip_prefix(&root).unwrap_or("").trim_start_matches('/');
        let dest_dir = if rel_dir.is_empty() {
            outdir.clone()
        } else {
            outdir.join(rel_dir)
        };
        fs::create_dir_all(&dest_dir)
            .with_context(|| format!("creating output directory {dest_dir:?}"))?;
        for f in files {
            let vpath = format!("{dir}/{f}");
            let mut stream = afs.open_read(&vpath)?;
            let dest = dest_dir.join(&f);
            let mut out = fs::File::create(&dest)
                .with_context(|| format!("writing {dest:?}"))?;
            io::copy(&mut stream, &mut out)
                .with_context(|| format!("extracting {vpath}"))?;
            count += 1;
        }
    }
    println!("Extracted {count} file(s) to {}", outdir.display());
    Ok(())
}
