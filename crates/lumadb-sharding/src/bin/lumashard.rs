use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use lumadb_sharding::{ChronoEpochParser, Settings, ShardMethod, ShardingIndex};

#[derive(Parser, Debug)]
#[command(author, version, about = "Inspect a LumaDB shard map", long_about = None)]
struct Args {
    /// Path to settings file
    #[arg(short, long, default_value = "lumashard.toml", env = "LUMASHARD_CONFIG")]
    config: PathBuf,

    /// Override the log level from the settings file
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load and validate the shard map
    Check,
    /// List groups matching a pattern ("all", "*" or a group name)
    Groups {
        #[arg(default_value = "all")]
        pattern: String,
    },
    /// Show how a table is sharded
    Table {
        #[arg(long)]
        db: String,
        #[arg(long)]
        table: String,
    },
    /// Resolve the group for a hash bucket or a range key
    Route {
        #[arg(long)]
        db: String,
        #[arg(long)]
        table: String,
        #[arg(long, conflicts_with = "key")]
        bucket: Option<u32>,
        #[arg(long)]
        key: Option<String>,
    },
}

fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();
    let settings = Settings::load(&args.config)
        .with_context(|| format!("loading settings from {:?}", args.config))?;

    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| settings.logging.level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .init();

    let shard_map = settings
        .read_shard_map()
        .with_context(|| format!("reading shard map {:?}", settings.sharding.map_path))?;
    let index = ShardingIndex::new();
    let report = index.reload_str(&shard_map, settings.sharding.num_groups)?;
    let snapshot = index.snapshot();

    match args.command {
        Command::Check => {
            println!(
                "ok: {} vdbs, {} tables, {} single tables, {} groups",
                snapshot.vdbs().len(),
                snapshot.tables().len(),
                snapshot.single_tables().len(),
                snapshot.all_groups().len()
            );
            for skipped in &report.skipped {
                println!("skipped: {}", skipped);
            }
        }
        Command::Groups { pattern } => {
            for group in snapshot.find_groups(&pattern) {
                println!("{}", group);
            }
        }
        Command::Table { db, table } => {
            if let Some(single) = snapshot.single_table(&db, &table) {
                println!("{}.{} single table on {}", single.schema, single.name, single.group);
                return Ok(());
            }
            let Some(info) = snapshot.table_info(&db, &table) else {
                bail!("{}.{} is neither sharded nor a single table", db, table);
            };
            println!("{}", serde_json::to_string_pretty(info)?);
            if let Some(vdb) = snapshot.vdb_for_table(&db, &table) {
                println!(
                    "vdb {} {} {} num={}",
                    vdb.id(),
                    vdb.method(),
                    vdb.key_type(),
                    vdb.logic_shard_num()
                );
                for partition in vdb.partitions() {
                    println!("  {}", partition);
                }
            }
        }
        Command::Route { db, table, bucket, key } => {
            let Some(vdb) = snapshot.vdb_for_table(&db, &table) else {
                bail!("{}.{} is not a sharded table", db, table);
            };
            let group = match (vdb.method(), bucket, key) {
                (ShardMethod::Hash, Some(bucket), _) => snapshot.route_bucket(&db, &table, bucket),
                (ShardMethod::Range, _, Some(literal)) => {
                    let Some(key) = vdb.key_type().parse_key(&literal, &ChronoEpochParser) else {
                        bail!("`{}` is not a valid {} key", literal, vdb.key_type());
                    };
                    snapshot.route_key(&db, &table, &key)
                }
                (ShardMethod::Hash, None, _) => bail!("hash table needs --bucket"),
                (ShardMethod::Range, _, None) => bail!("range table needs --key"),
                (ShardMethod::Unknown, _, _) => bail!("vdb {} has no routing method", vdb.id()),
            };
            match group {
                Some(group) => println!("{}", group),
                None => bail!("no group owns that key"),
            }
        }
    }
    Ok(())
}
