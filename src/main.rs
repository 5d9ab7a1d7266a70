use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use frame_builder::api::Backend;
use frame_builder::config::Config;
use frame_builder::lead::Lead;
use frame_builder::logging;
use frame_builder::state::{ClientStore, FileStore};
use frame_builder::steps::StepId;
use frame_builder::upload::{PhotoFile, SLOT_COUNT};
use frame_builder::wizard::{AdvanceOutcome, Wizard};

#[derive(Parser)]
#[command(name = "frame-builder")]
#[command(about = "Headless driver for the custom frame configuration funnel")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List sizes, colors and the support contact
    Catalog {
        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the price for a size (first size when omitted)
    Price {
        #[arg(short, long)]
        size: Option<String>,
    },

    /// Resolve the tracked session, or reset it
    Session {
        #[command(subcommand)]
        action: Option<SessionAction>,
    },

    /// Print the WhatsApp help link for a selection
    HelpLink {
        #[arg(long)]
        size: Option<String>,

        #[arg(long)]
        frame: Option<String>,
    },

    /// Run the whole funnel and submit an order
    Order(OrderArgs),

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    /// Forget the cached session id
    Reset,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write the effective configuration to .frame-builder/config.toml
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Args)]
struct OrderArgs {
    #[arg(long)]
    size: String,

    /// Frame color prefix (catalog default when omitted)
    #[arg(long)]
    frame: Option<String>,

    /// Background color name (catalog default when omitted)
    #[arg(long)]
    background: Option<String>,

    /// Photo files, up to three
    #[arg(long = "photo", required = true)]
    photos: Vec<PathBuf>,

    #[arg(long)]
    first_name: String,

    #[arg(long)]
    last_name: String,

    /// WhatsApp contact as dial code and number, e.g. `+351 912345678`
    #[arg(long, num_args = 2, value_names = ["DIAL", "NUMBER"], conflicts_with = "email", required_unless_present = "email")]
    whatsapp: Option<Vec<String>>,

    /// Country of the WhatsApp number
    #[arg(long, default_value = "PT")]
    country: String,

    #[arg(long)]
    email: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration first (needed for logging setup)
    let config = Config::load(cli.config.as_deref())?;
    let logging_handle = logging::init_logging(&config, cli.debug)?;

    let result = match cli.command {
        Commands::Catalog { json } => cmd_catalog(&config, json).await,
        Commands::Price { size } => cmd_price(&config, size).await,
        Commands::Session { action } => cmd_session(&config, action).await,
        Commands::HelpLink { size, frame } => cmd_help_link(&config, size, frame).await,
        Commands::Order(args) => cmd_order(&config, args).await,
        Commands::Config {
            action: ConfigAction::Init { force },
        } => cmd_config_init(&config, force),
    };

    if let Some(log_path) = logging_handle.log_file_path {
        if log_path.exists() {
            eprintln!("Log: {}", log_path.display());
        }
    }

    result
}

fn build_wizard(config: &Config) -> Result<Wizard> {
    let backend = Backend::from_config_or_offline(&config.api);
    tracing::debug!(backend = %backend.summary(), "backend ready");
    let store: Arc<dyn ClientStore> = Arc::new(FileStore::load(config)?);
    Ok(Wizard::new(config, backend, store))
}

fn print_offline_notice(wizard: &Wizard) {
    if wizard.is_offline() {
        let reason = wizard.catalog().load_error().unwrap_or_default();
        eprintln!("Catalog unavailable ({}), showing built-in options", reason);
    }
}

async fn cmd_catalog(config: &Config, json: bool) -> Result<()> {
    let backend = Backend::from_config_or_offline(&config.api);
    let resolver = frame_builder::catalog::CatalogResolver::new();
    resolver.load(backend.catalog.as_ref()).await;
    let snapshot = resolver.snapshot();

    if json {
        println!("{}", serde_json::to_string_pretty(snapshot.as_ref())?);
        return Ok(());
    }

    if resolver.is_offline() {
        eprintln!(
            "Catalog unavailable ({}), showing built-in options",
            resolver.load_error().unwrap_or_default()
        );
    }

    println!("Sizes");
    println!("{}", "─".repeat(40));
    for size in &snapshot.sizes {
        println!(
            "  {:<8} {:<14} {:>7.2}  promo {:>7.2}",
            size.id, size.label, size.price, size.promo_price
        );
    }
    println!();
    println!("Frames");
    println!("{}", "─".repeat(40));
    for frame in &snapshot.frame_colors {
        println!("  {:<8} {:<14} {}", frame.prefix, frame.name, frame.hex);
    }
    println!();
    println!("Backgrounds");
    println!("{}", "─".repeat(40));
    for background in &snapshot.background_colors {
        println!("  {:<14} {}", background.name, background.hex);
    }
    println!();
    println!("Support: {}", snapshot.support_contact);

    Ok(())
}

async fn cmd_price(config: &Config, size: Option<String>) -> Result<()> {
    let backend = Backend::from_config_or_offline(&config.api);
    let resolver = frame_builder::catalog::CatalogResolver::new();
    resolver.load(backend.catalog.as_ref()).await;

    let price = resolver.resolve_price(size.as_deref());
    println!(
        "{}: {:.2} (promo {:.2})",
        size.as_deref().unwrap_or("default"),
        price.price,
        price.promo_price
    );
    Ok(())
}

async fn cmd_session(config: &Config, action: Option<SessionAction>) -> Result<()> {
    let wizard = build_wizard(config)?;

    match action {
        Some(SessionAction::Reset) => {
            wizard.session().reset();
            println!("Session cleared");
        }
        None => match wizard.session().resolve_or_create().await {
            Some(id) => println!("Session: {}", id),
            None => println!("No session available (backend unreachable)"),
        },
    }
    Ok(())
}

async fn cmd_help_link(
    config: &Config,
    size: Option<String>,
    frame: Option<String>,
) -> Result<()> {
    let mut wizard = build_wizard(config)?;
    wizard.load_catalog().await;

    if let Some(size) = size {
        wizard.set_size(&size);
    }
    if let Some(frame) = frame {
        wizard.set_frame(&frame);
    }

    println!("{}", wizard.support_link()?);
    Ok(())
}

async fn cmd_order(config: &Config, args: OrderArgs) -> Result<()> {
    if args.photos.len() > SLOT_COUNT {
        bail!("At most {} photos can be sent", SLOT_COUNT);
    }

    let lead = match (args.whatsapp, args.email) {
        (Some(parts), None) => match parts.as_slice() {
            [dial, number] => Lead::whatsapp(
                &args.first_name,
                &args.last_name,
                &args.country,
                dial,
                number,
            ),
            _ => bail!("--whatsapp takes a dial code and a number"),
        },
        (None, Some(email)) => Lead::email(&args.first_name, &args.last_name, email),
        _ => bail!("Provide either --whatsapp or --email"),
    };
    // Fail before touching the backend
    lead.validate()?;

    let mut wizard = build_wizard(config)?;
    wizard.start().await;
    print_offline_notice(&wizard);

    let snapshot = wizard.snapshot();
    if snapshot.size(&args.size).is_none() {
        bail!("Unknown size '{}'", args.size);
    }
    wizard.set_size(&args.size);
    if let Some(frame) = &args.frame {
        if snapshot.frame(frame).is_none() {
            bail!("Unknown frame color '{}'", frame);
        }
        wizard.set_frame(frame);
    }
    if let Some(background) = &args.background {
        if snapshot.background(background).is_none() {
            bail!("Unknown background color '{}'", background);
        }
        wizard.set_background(background);
    }

    while wizard.current_step().map(|s| s.id) != Some(StepId::Upload) {
        match wizard.advance() {
            AdvanceOutcome::Moved(_) => {}
            AdvanceOutcome::Blocked(message) => bail!(message),
            AdvanceOutcome::FinalizeRequested => break,
        }
    }

    for (index, path) in args.photos.iter().enumerate() {
        let file = PhotoFile::from_path(path).await?;
        wizard
            .assign_photo(index, file)
            .with_context(|| format!("Cannot use {}", path.display()))?;
    }
    wizard.settle_uploads().await;

    for slot in wizard.slots().iter().filter(|s| !s.is_empty()) {
        let name = slot.file.as_ref().map(PhotoFile::name).unwrap_or_default();
        let note = if slot.degraded { " (not sent, send it on WhatsApp)" } else { "" };
        println!("Photo {}: {} {}{}", slot.index + 1, name, slot.status, note);
    }
    if wizard.slots().iter().any(|s| s.degraded) {
        println!("Help: {}", wizard.support_link()?);
    }

    match wizard.advance() {
        AdvanceOutcome::FinalizeRequested => {}
        AdvanceOutcome::Blocked(message) => bail!(message),
        AdvanceOutcome::Moved(_) => bail!("Funnel has steps after the photo upload"),
    }

    let price = wizard.price();
    let result = wizard.finalize(&lead).await;
    wizard.flush().await;
    let success = result?;

    println!(
        "Order submitted: {} {:.2} (promo {:.2})",
        args.size, price.price, price.promo_price
    );
    if let Some(reference) = success.entry_reference() {
        println!("Entry: {}", reference);
    }
    if let Some(mockup) = wizard.mockup() {
        println!("Preview: {}", mockup);
    }
    Ok(())
}

fn cmd_config_init(config: &Config, force: bool) -> Result<()> {
    let path = Config::project_config_path();
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let written = config.save(Some(&path))?;
    println!("Wrote {}", written.display());
    Ok(())
}
