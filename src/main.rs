//! # Struk CLI
//!
//! Command-line interface for the receipt printer.
//!
//! ## Usage
//!
//! ```bash
//! # Serve the POS printer API
//! struk serve --listen 0.0.0.0:8080 --device /dev/rfcomm0
//!
//! # Print the demo receipt
//! struk print --demo
//!
//! # Print a cart exported by the POS, pairing by MAC address
//! struk print cart.json --mac 66:22:AA:BB:CC:DD
//!
//! # Show the bytes without a printer
//! struk print --demo --dry-run
//!
//! # Show the receipt as text
//! struk preview cart.json --width 48
//!
//! # Known printer services and bound RFCOMM devices
//! struk list
//! ```
//!
//! Set `RUST_LOG=struk=debug` for per-write logging.

use chrono::Local;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use struk::{
    PrinterError,
    printer::{PrintPipeline, PrinterConfig, PrinterService},
    receipt::{ReceiptDocument, Sale, demo_sale},
    server::{self, ReceiptRequest, ServerConfig},
    transport::{BleAdapter, MockAdapter, MockPeripheral, RfcommAdapter, rfcomm},
};

/// Struk - Bluetooth receipt printer utility
#[derive(Parser, Debug)]
#[command(name = "struk")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API used by the POS screen
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "0.0.0.0:8080")]
        listen: String,

        /// Use an in-memory printer instead of Bluetooth
        #[arg(long)]
        mock: bool,

        #[command(flatten)]
        printer: PrinterArgs,
    },

    /// Print a receipt
    Print {
        /// JSON cart file (same body as POST /api/printer/print)
        cart: Option<PathBuf>,

        /// Print the built-in demo cart
        #[arg(long)]
        demo: bool,

        /// Send to an in-memory printer and dump the bytes
        #[arg(long)]
        dry_run: bool,

        #[command(flatten)]
        printer: PrinterArgs,
    },

    /// Show a receipt as text
    Preview {
        /// JSON cart file (omit for the demo cart)
        cart: Option<PathBuf>,

        #[command(flatten)]
        printer: PrinterArgs,
    },

    /// List known printer services and bound RFCOMM devices
    List,
}

#[derive(Args, Debug)]
struct PrinterArgs {
    /// JSON printer config
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Printer device path
    #[arg(long, default_value = rfcomm::DEFAULT_DEVICE)]
    device: PathBuf,

    /// Printer MAC address (binds an RFCOMM device if needed)
    #[arg(long)]
    mac: Option<String>,

    /// Characters per line (overrides the config)
    #[arg(long)]
    width: Option<usize>,
}

impl PrinterArgs {
    fn load_config(&self) -> Result<PrinterConfig, PrinterError> {
        let mut config = match &self.config {
            Some(path) => PrinterConfig::from_file(path)?,
            None => PrinterConfig::default(),
        };
        if let Some(width) = self.width {
            config.line_width = width;
        }
        config.validate()?;
        Ok(config)
    }

    fn adapter(&self) -> Result<Arc<dyn BleAdapter>, PrinterError> {
        let adapter: Arc<dyn BleAdapter> = match &self.mac {
            Some(mac) => Arc::new(RfcommAdapter::for_mac(mac, 0)?),
            None => Arc::new(RfcommAdapter::new(&self.device)),
        };
        Ok(adapter)
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), PrinterError> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            listen,
            mock,
            printer,
        } => {
            let config = printer.load_config()?;
            let adapter: Arc<dyn BleAdapter> = if mock {
                Arc::new(MockAdapter::new(Arc::new(MockPeripheral::printer("Mock Printer"))))
            } else {
                printer.adapter()?
            };
            let service = PrinterService::new(adapter, &config)?;
            server::serve(ServerConfig { listen_addr: listen }, service).await?;
        }

        Commands::Print {
            cart,
            demo,
            dry_run,
            printer,
        } => {
            let config = printer.load_config()?;
            let sale = match (cart, demo) {
                (Some(path), false) => load_cart(&path)?,
                (None, true) => demo_sale(&Local::now()),
                (Some(_), true) => {
                    return Err(PrinterError::Config(
                        "give either a cart file or --demo, not both".to_string(),
                    ));
                }
                (None, false) => {
                    return Err(PrinterError::Config(
                        "nothing to print: pass a cart file or --demo".to_string(),
                    ));
                }
            };

            if dry_run {
                let mock = Arc::new(MockPeripheral::printer("dry-run"));
                let service = PrinterService::new(Arc::new(MockAdapter::new(mock.clone())), &config)?;
                service.connect().await?;
                service.print_sale(&sale).await?;
                print!("{}", hex_dump(&mock.sent_bytes()));
                return Ok(());
            }

            let service = PrinterService::new(printer.adapter()?, &config)?;
            println!("Connecting to printer...");
            service.connect().await?;
            let writes = service.print_sale(&sale).await?;
            service.disconnect().await;
            info!(writes, transaction = %sale.transaction_id, "done");
            println!("Printed {} successfully!", sale.transaction_id);
        }

        Commands::Preview { cart, printer } => {
            let config = printer.load_config()?;
            let now = Local::now();
            let sale = match cart {
                Some(path) => load_cart(&path)?,
                None => demo_sale(&now),
            };
            let pipeline = PrintPipeline::from_config(&config)?;
            let doc = ReceiptDocument::from_sale(&config.store, &sale, now.naive_local());
            for line in pipeline.print_preview(&doc) {
                println!("{}", line);
            }
        }

        Commands::List => {
            println!("Known printer services:");
            for uuid in PrinterConfig::default().service_uuids {
                println!("  {}", uuid);
            }

            let bound = rfcomm::list_bound_devices();
            println!("\nBound RFCOMM devices:");
            if bound.is_empty() {
                println!("  (none, bind one with `sudo rfcomm bind 0 <MAC>`)");
            }
            for (device, mac) in bound {
                println!("  {}  {}", device, mac);
            }
        }
    }

    Ok(())
}

fn load_cart(path: &Path) -> Result<Sale, PrinterError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        PrinterError::Config(format!("Failed to read {}: {}", path.display(), e))
    })?;
    let request: ReceiptRequest = serde_json::from_str(&text)
        .map_err(|e| PrinterError::Config(format!("Invalid cart {}: {}", path.display(), e)))?;
    Ok(request.into_sale(Local::now()))
}

/// Classic 16-bytes-per-row hex dump with an ASCII column.
fn hex_dump(data: &[u8]) -> String {
    let mut out = String::new();
    for (row, chunk) in data.chunks(16).enumerate() {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{:02x}", b)).collect();
        let ascii: String = chunk
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
            .collect();
        out.push_str(&format!("{:08x}  {:<47}  |{}|\n", row * 16, hex.join(" "), ascii));
    }
    out
}
