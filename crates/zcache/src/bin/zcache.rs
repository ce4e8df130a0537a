//! zcache CLI - inspect and modify chunks in a directory store
//!
//! Usage:
//!   zcache key 2 4                     Build a chunk key
//!   zcache key --parse 2.4             Parse a chunk key
//!   zcache config                      Print a sample configuration
//!   zcache read <var> <chunk> <size>   Read a chunk through the cache
//!   zcache write <var> <chunk> <size>  Fill a chunk and flush it
//!   zcache info                        List stored objects

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use zcache::{
    build_chunk_key, parse_chunk_key, ArrayVariable, ChunkStore, Config, DimensionSeparator,
    DirectoryStore,
};

/// Bytes shown by the hex preview
const PREVIEW_BYTES: usize = 32;

#[derive(Parser)]
#[command(name = "zcache")]
#[command(about = "Chunk cache for Zarr-style array stores", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (default: system config dir)
    #[arg(short, long, global = true, env = "ZCACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Store root directory, overrides the configuration
    #[arg(short, long, global = true)]
    store: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build or parse a chunk key
    Key {
        /// Chunk indices, or a key when --parse is given
        #[arg(required = true)]
        values: Vec<String>,

        /// Parse a key instead of building one
        #[arg(long)]
        parse: bool,

        /// Dimension separator ('.' or '/')
        #[arg(long, default_value = ".")]
        separator: DimensionSeparator,
    },

    /// Print a sample configuration file
    Config,

    /// Read a chunk through the cache.
    ///
    /// The store is opened read-only unless --persist is given, so reading
    /// an absent chunk does not create it.
    Read {
        /// Variable storage key (e.g. group/temperature)
        var: String,

        /// Chunk key (e.g. 2.4)
        chunk: String,

        /// Chunk size in bytes
        size: usize,

        /// Write a synthesized fill-value chunk back to the store
        #[arg(long)]
        persist: bool,
    },

    /// Fill a whole chunk with one byte value and flush it
    Write {
        /// Variable storage key
        var: String,

        /// Chunk key
        chunk: String,

        /// Chunk size in bytes
        size: usize,

        /// Byte value written to every position
        #[arg(short, long, default_value = "0")]
        byte: u8,
    },

    /// List objects in the store
    Info,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Set up logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };
    if let Some(root) = cli.store {
        config.store.root = Some(root);
    }

    match cli.command {
        Commands::Key {
            values,
            parse,
            separator,
        } => run_key(&values, parse, separator)?,
        Commands::Config => print!("{}", Config::sample()),
        Commands::Read {
            var,
            chunk,
            size,
            persist,
        } => {
            if !persist {
                config.store.writable = false;
            }
            run_read(&config, &var, &chunk, size)?;
        }
        Commands::Write {
            var,
            chunk,
            size,
            byte,
        } => run_write(&config, &var, &chunk, size, byte)?,
        Commands::Info => run_info(&config)?,
    }

    Ok(())
}

fn run_key(
    values: &[String],
    parse: bool,
    separator: DimensionSeparator,
) -> Result<(), Box<dyn std::error::Error>> {
    if parse {
        for key in values {
            let indices = parse_chunk_key(key, separator)?;
            println!("{} -> {:?}", key, indices);
        }
        return Ok(());
    }

    let indices = values
        .iter()
        .map(|v| v.parse::<u64>())
        .collect::<Result<Vec<_>, _>>()?;
    println!("{}", build_chunk_key(&indices, separator));
    Ok(())
}

fn open_store(config: &Config) -> Result<Arc<dyn ChunkStore>, Box<dyn std::error::Error>> {
    let root = config.store_root();
    let store = if config.store.writable {
        DirectoryStore::new(root)?
    } else {
        DirectoryStore::open_read_only(root)?
    };
    Ok(Arc::new(store))
}

fn open_variable(
    config: &Config,
    var: &str,
    chunk: &str,
    size: usize,
) -> Result<(ArrayVariable, Vec<u64>), Box<dyn std::error::Error>> {
    let indices = parse_chunk_key(chunk, config.cache.dimension_separator)?;
    let store = open_store(config)?;
    let variable = ArrayVariable::from_config(var, indices.len(), size, config, store)?;
    Ok((variable, indices))
}

fn run_read(
    config: &Config,
    var: &str,
    chunk: &str,
    size: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let (variable, indices) = open_variable(config, var, chunk, size)?;
    let (data, synthesized) = variable.read_chunk(indices)?;

    let preview = &data[..data.len().min(PREVIEW_BYTES)];
    println!("chunk:       {}/{}", variable.var_key(), chunk);
    println!("size:        {} bytes", data.len());
    println!("synthesized: {}", synthesized);
    println!(
        "data:        {}{}",
        hex::encode(preview),
        if data.len() > PREVIEW_BYTES { "..." } else { "" }
    );

    // With --persist a synthesized chunk is written back here
    variable.close()?;
    Ok(())
}

fn run_write(
    config: &Config,
    var: &str,
    chunk: &str,
    size: usize,
    byte: u8,
) -> Result<(), Box<dyn std::error::Error>> {
    let (variable, indices) = open_variable(config, var, chunk, size)?;
    variable.write_chunk(indices, &vec![byte; size])?;
    variable.close()?;

    info!(
        "Wrote {} bytes of 0x{} to {}/{}",
        size,
        hex::encode([byte]),
        variable.var_key(),
        chunk
    );
    Ok(())
}

fn run_info(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let root = config.store_root();
    let store = DirectoryStore::open_read_only(&root)?;
    let keys = store.list_keys()?;

    println!("store:      {:?}", root);
    println!("cache size: {} bytes", config.cache.size_bytes);
    println!("separator:  {}", config.cache.dimension_separator);
    println!("objects:    {}", keys.len());
    for key in keys {
        println!("  {}", key);
    }
    Ok(())
}
