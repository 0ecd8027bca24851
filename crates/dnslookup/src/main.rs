#![warn(clippy::pedantic)]

mod command;
mod settings;

use clap::Parser;
use std::io::{IsTerminal, Write};
use std::net::IpAddr;
use std::path::PathBuf;
use std::process;
use std::str::FromStr;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

use dns_resolver::cache::SharedCache;
use dns_resolver::resolve;
use dns_resolver::transport::UdpTransport;
use dns_types::protocol::types::{Question, ResourceRecord};

use self::command::Command;
use self::settings::Settings;

/// Filter used while verbose tracing is on.
const VERBOSE_FILTER: &str = "dns_types=trace,dns_resolver=trace,dnslookup=trace";

/// Switches logging between the startup filter and `VERBOSE_FILTER`.
struct Tracing {
    handle: reload::Handle<EnvFilter, Registry>,
}

impl Tracing {
    fn init() -> Self {
        let (filter, handle) = reload::Layer::new(quiet_filter());
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
        Self { handle }
    }

    fn set_verbose(&self, verbose: bool) {
        let filter = if verbose {
            EnvFilter::new(VERBOSE_FILTER)
        } else {
            quiet_filter()
        };
        if let Err(error) = self.handle.reload(filter) {
            eprintln!("could not change log filter: {error}");
        }
    }
}

/// `RUST_LOG`, or warnings only.
fn quiet_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// One line per record, or a placeholder line if there are none.
/// Lines show the name and type asked about, not those of the
/// record.
fn result_lines(question: &Question, rrs: &[ResourceRecord]) -> Vec<String> {
    let rtype = question.rtype.to_string();
    if rrs.is_empty() {
        return vec![format!(
            "{:<30} {:<5} {:<8} {}",
            question.name, rtype, -1, "0.0.0.0"
        )];
    }

    rrs.iter()
        .map(|rr| format!("{:<30} {:<5} {:<8} {}", question.name, rtype, rr.ttl, rr.data))
        .collect()
}

fn print_results(question: &Question, rrs: &[ResourceRecord]) {
    for line in result_lines(question, rrs) {
        println!("{line}");
    }
}

// the doc comments for this struct turn into the CLI help text
#[derive(Parser)]
/// Iterative DNS lookup utility
///
/// Resolves names by walking down from a root nameserver, without the
/// help of any recursive resolver.  Commands are read from standard
/// input: lookup fqdn [type], trace on|off, server IP, dump, quit.
struct Args {
    /// IP address of the root nameserver to start the search at
    #[clap(value_parser)]
    root_server: String,

    /// Path to a YAML settings file
    #[clap(short, long, value_parser)]
    config: Option<PathBuf>,

    /// Start with verbose tracing on
    #[clap(long, action(clap::ArgAction::SetTrue))]
    trace: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();
    let logging = Tracing::init();

    let settings = match Settings::new(args.config.as_deref()) {
        Ok(settings) => settings,
        Err(error) => {
            eprintln!("error loading settings: {error}");
            process::exit(1);
        }
    };

    let mut root = match IpAddr::from_str(&args.root_server) {
        Ok(root) => root,
        Err(error) => {
            eprintln!("Invalid root server ({error}).");
            process::exit(1);
        }
    };
    println!("Root DNS server is: {root}");

    let transport = match UdpTransport::bind(settings.timeout()).await {
        Ok(transport) => transport,
        Err(error) => {
            eprintln!("could not open socket: {error}");
            process::exit(1);
        }
    };

    if args.trace {
        logging.set_verbose(true);
    }

    let cache = SharedCache::new();
    let options = settings.resolver_options();
    let interactive = std::io::stdin().is_terminal();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        if interactive {
            print!("DNSLOOKUP> ");
            let _ = std::io::stdout().flush();
        }

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(error) => {
                tracing::error!(?error, "could not read command");
                break;
            }
        };

        match line.parse::<Command>() {
            Ok(Command::Nothing) => (),
            Ok(Command::Quit) => break,
            Ok(Command::Server(address)) => {
                root = address;
                println!("Root DNS server is now: {root}");
            }
            Ok(Command::Trace(verbose)) => {
                logging.set_verbose(verbose);
                println!(
                    "Verbose tracing is now: {}",
                    if verbose { "ON" } else { "OFF" }
                );
            }
            Ok(Command::Lookup(question)) => {
                let (metrics, rrs) = resolve(&transport, &cache, root, &options, &question).await;
                tracing::debug!(%question, %metrics, "lookup finished");
                print_results(&question, &rrs);
            }
            Ok(Command::Dump) => cache.for_each(print_results),
            Err(error) => eprintln!("{error}"),
        }
    }

    println!("Goodbye!");
}
