//! A one-shot reporter: loads a node configuration, builds the
//! directory and hosts table it describes, and prints directory and
//! broadcast-cache statistics. Replaces the REPL-style operator tool
//! this crate's ambient stack is otherwise modeled on with something
//! that fits a single-threaded batch invocation.

use std::fs;
use std::process::ExitCode;

use clap::Parser;
use log::error;

use meshid_core::broadcast_cache::BroadcastCache;
use meshid_core::config::{ConfiguredHosts, ConfiguredInterfaces, NodeConfig};
use meshid_core::directory::Directory;

#[derive(Parser, Debug)]
#[command(name = "directory-inspect", about = "Inspect a mesh overlay node configuration")]
struct Args {
    /// Path to a node configuration JSON file.
    config: String,
}

fn run(args: Args) -> Result<(), String> {
    let text = fs::read_to_string(&args.config).map_err(|e| format!("reading {}: {e}", args.config))?;
    let config = NodeConfig::from_json(&text).map_err(|e| e.to_string())?;
    let my_id = config.parse_node_id().map_err(|e| e.to_string())?;

    let interfaces = ConfiguredInterfaces::from_config(&config);
    let hosts = ConfiguredHosts::from_config(&config).map_err(|e| e.to_string())?;
    hosts.validate(&interfaces).map_err(|e| e.to_string())?;

    let mut dir = Directory::new(my_id);
    for host in &config.hosts {
        let sid = meshid_core::config::parse_sid(&host.sid).map_err(|e| e.to_string())?;
        dir.find_or_insert(&sid, 32, true);
    }

    let stats = dir.stats();
    println!("subscribers:  {}", stats.subscriber_count);
    println!("trie nodes:   {}", stats.node_count);
    println!("max abbrev:   {}", stats.max_depth);

    let cache = BroadcastCache::new();
    let cache_stats = cache.stats();
    println!("cache hits:   {}", cache_stats.hits);
    println!("cache misses: {}", cache_stats.misses);

    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("directory-inspect: {e}");
            ExitCode::FAILURE
        }
    }
}
