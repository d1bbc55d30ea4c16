//! Disk Service Session
//!
//! Runs the disk service and a client in one process over a loopback
//! channel and walks through a typical session: list disks, resolve one by
//! name, uninstall a few, then list again.
//!
//! USAGE:
//!   disk-session [OPTIONS] [NAME]...
//!
//! EXAMPLES:
//!   disk-session                          # Uninstall "Disk 3"
//!   disk-session "Disk 1" "Disk 2"        # Refused, their pack is online
//!   disk-session --force "Disk 1"         # Forced, needs a reboot
//!   disk-session --big-endian --max 2     # Big-endian stub data, list two disks
//!   disk-session --calls 100 -l debug     # Repeat the listing, log each call

use std::sync::Arc;

use clap::Parser;
use dcerpc::{ChannelConfig, DataRepresentation};
use disk_service::{loopback, DiskList, DiskSignature, DiskStore};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "disk-session")]
#[command(version)]
#[command(about = "DCOM disk service demo - queries and uninstalls disks over a loopback channel")]
struct Args {
    /// Disks to uninstall, by friendly name
    #[arg(value_name = "NAME", default_values_t = vec![String::from("Disk 3")])]
    names: Vec<String>,

    /// Uninstall even when the disk's pack is online
    #[arg(short, long)]
    force: bool,

    /// Encode stub data big-endian
    #[arg(short, long)]
    big_endian: bool,

    /// Maximum number of disks to list (0 for all)
    #[arg(short, long, default_value_t = 0)]
    max: u32,

    /// Number of QueryDisks calls made before uninstalling
    #[arg(short, long, default_value_t = 1)]
    calls: u32,

    /// Maximum log level (error, warn, info, debug, trace)
    #[arg(short, long, default_value_t = Level::INFO)]
    log_level: Level,
}

fn print_disks(list: &DiskList) {
    println!("{} disk(s):", list.count);
    for disk in list.disks() {
        let signature = match &disk.signature {
            DiskSignature::Mbr(sig) => format!("MBR {:08x}", sig),
            DiskSignature::Gpt(guid) => format!("GPT {}", guid),
            DiskSignature::Unknown { style, raw } => format!("style {} ({} bytes)", style, raw.len()),
        };
        let pack = match disk.pack.get() {
            Some(pack) => format!(
                "{} ({})",
                pack.name.get().map(|n| n.as_str()).unwrap_or("?"),
                if pack.online { "online" } else { "offline" }
            ),
            None => String::from("-"),
        };
        println!(
            "  {:<8} {:>6} GiB  {:<40} pack {}",
            disk.name().unwrap_or("?"),
            disk.size >> 30,
            signature,
            pack
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = ChannelConfig {
        data_rep: if args.big_endian {
            DataRepresentation::big_endian()
        } else {
            DataRepresentation::ndr()
        },
        ..Default::default()
    };
    let store = Arc::new(DiskStore::sample());
    let (dispatcher, client) = loopback(Arc::clone(&store), config)?;
    info!("Session on {}", client.proxy().ipid());

    for _ in 0..args.calls.max(1) {
        print_disks(&client.query_disks(args.max).await?);
    }

    let mut resolved = Vec::with_capacity(args.names.len());
    let mut ids = Vec::with_capacity(args.names.len());
    for name in &args.names {
        match client.disk_id_from_name(name).await {
            Ok(id) => {
                resolved.push(name);
                ids.push(id);
            }
            Err(e) => warn!("{}: {}", name, e),
        }
    }

    if ids.is_empty() {
        warn!("Nothing to uninstall");
    } else {
        let out = client.uninstall_disks(ids, args.force).await?;
        for (name, status) in resolved.iter().zip(&out.results) {
            println!("uninstall {:<8} 0x{:08x}", name, status);
        }
        if out.reboot {
            println!("reboot required");
        }
        print_disks(&client.query_disks(args.max).await?);
    }

    let stats = dispatcher.stats().snapshot();
    info!(
        "{} request(s), {} processed, {} failed, {} bytes in, {} bytes out",
        stats.requests_received,
        stats.requests_processed,
        stats.requests_failed,
        stats.bytes_received,
        stats.bytes_sent
    );
    Ok(())
}
