use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use portscope::config::{ScanOptions, ScanOptionsArgs};
use portscope::geoip::{GeoLocator, IpApiLocator, NoGeoLocator};
use portscope::logging::{self, LogFormat};
use portscope::types::{ScanRequest, ScanResult};
use portscope::{export, ports, scanner, server};

/// portscope — concurrent TCP port-range scanner with banner capture and a tiny web UI.
#[derive(Debug, Parser)]
#[command(name = "portscope", version, about, long_about = None)]
struct Cli {
    /// Log level or filter directive (overridden by RUST_LOG).
    #[arg(long, env = "PORTSCOPE_LOG", default_value = "info", global = true)]
    log_level: String,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Compact, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the web UI and the scan/export API.
    Serve(ServeArgs),
    /// Run one scan and print the open ports.
    Scan(ScanArgs),
}

#[derive(Debug, Args)]
struct ServeArgs {
    /// Address to listen on.
    #[arg(long, env = "PORTSCOPE_BIND", default_value = "127.0.0.1:8080")]
    bind: String,

    /// Directory of static UI files.
    #[arg(long = "static-dir", env = "PORTSCOPE_STATIC_DIR", default_value = "static")]
    static_dir: PathBuf,

    /// Disable GeoIP enrichment of scan results.
    #[arg(long = "no-geoip", default_value_t = false)]
    no_geoip: bool,

    #[command(flatten)]
    scan: ScanOptionsArgs,
}

#[derive(Debug, Args)]
struct ScanArgs {
    /// Hostname or IP address to scan.
    target: String,

    /// Port or inclusive range, e.g. `22` or `20-85`.
    #[arg(long, short = 'p', default_value = "1-1024")]
    ports: String,

    /// Look up GeoIP data for the target.
    #[arg(long, default_value_t = false)]
    geoip: bool,

    /// Write results as pretty JSON to this path.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Write results as CSV to this path.
    #[arg(long)]
    csv: Option<PathBuf>,

    #[command(flatten)]
    scan: ScanOptionsArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(&cli.log_level, cli.log_format)?;

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Scan(args) => scan(args).await,
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let options = ScanOptions::from(&args.scan);
    let geo: Arc<dyn GeoLocator> = if args.no_geoip {
        Arc::new(NoGeoLocator)
    } else {
        Arc::new(IpApiLocator::new().context("failed to set up GeoIP lookups")?)
    };
    let state = server::AppState::new(options, geo);
    info!(?options, static_dir = %args.static_dir.display(), "starting server");

    let shutdown = state.shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            shutdown.cancel();
        }
    });

    server::spawn_server(&args.bind, state, &args.static_dir).await
}

async fn scan(args: ScanArgs) -> Result<()> {
    let (start, end) = ports::parse_port_range(&args.ports)?;
    let request = ScanRequest::new(args.target.clone(), u32::from(start), u32::from(end));
    let options = ScanOptions::from(&args.scan);

    // Ctrl-C cancels the scan; whatever finished is still reported.
    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_ctrlc.cancel();
        }
    });

    let geo: Box<dyn GeoLocator> = if args.geoip {
        Box::new(IpApiLocator::new().context("failed to set up GeoIP lookups")?)
    } else {
        Box::new(NoGeoLocator)
    };
    let (scan, geoip) = tokio::join!(
        scanner::run_scan_with_cancel(&request, &options, cancel),
        geo.lookup(request.target.trim()),
    );
    let mut result = scan?.with_geoip(geoip);
    result.sort_by_port();

    if result.is_partial() {
        warn!(outcome = ?result.outcome, "scan did not finish; results are partial");
    }
    print_results_table(&result);

    if let Some(path) = args.output.as_deref() {
        export::write_json_file(path, &result)
            .with_context(|| format!("failed to write JSON to {}", path.display()))?;
        println!("Wrote JSON results to {}", path.display());
    }
    if let Some(path) = args.csv.as_deref() {
        export::write_csv_file(path, &result)
            .with_context(|| format!("failed to write CSV to {}", path.display()))?;
        println!("Wrote CSV results to {}", path.display());
    }
    Ok(())
}

fn print_results_table(result: &ScanResult) {
    const BANNER_MAX: usize = 60;

    let mut service_w = "service".len();
    let mut banner_w = "banner".len();
    let snippets: Vec<String> = result
        .ports
        .iter()
        .map(|p| {
            let mut b = p.banner.trim().replace('\n', "\\n").replace('\r', "\\r");
            if let Some((idx, _)) = b.char_indices().nth(BANNER_MAX) {
                b.truncate(idx);
            }
            b
        })
        .collect();
    for (p, b) in result.ports.iter().zip(&snippets) {
        service_w = service_w.max(p.service.len());
        banner_w = banner_w.max(b.chars().count());
    }
    let port_w = 5usize;
    let lat_w = "response_ms".len();

    println!("\nTarget: {}", result.target);
    if let Some(geo) = &result.geoip {
        println!(
            "GeoIP : {} ({}, {}, {}) via {}",
            geo.query, geo.city, geo.region_name, geo.country, geo.isp
        );
    }
    println!(
        "Open ports: {} (elapsed: {} ms, outcome: {:?})",
        result.ports.len(),
        result.elapsed_ms,
        result.outcome
    );
    println!(
        "{:>port_w$}  {:<service_w$}  {:>lat_w$}  {:<banner_w$}",
        "port", "service", "response_ms", "banner",
    );
    println!(
        "{:-<port_w$}  {:-<service_w$}  {:-<lat_w$}  {:-<banner_w$}",
        "", "", "", "",
    );
    for (p, b) in result.ports.iter().zip(&snippets) {
        println!(
            "{:>port_w$}  {:<service_w$}  {:>lat_w$}  {:<banner_w$}",
            p.port, p.service, p.response_ms, b,
        );
    }
}
