use anyhow::Result;
use bookrent::cli::rent::RentOptions;
use bookrent::core::log::init_logging;
use bookrent::core::{DeliveryMethod, RentalStatus};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusFilter {
    Active,
    ExpiringSoon,
    Expired,
}

impl From<StatusFilter> for RentalStatus {
    fn from(filter: StatusFilter) -> Self {
        match filter {
            StatusFilter::Active => RentalStatus::Active,
            StatusFilter::ExpiringSoon => RentalStatus::ExpiringSoon,
            StatusFilter::Expired => RentalStatus::Expired,
        }
    }
}

impl From<Commands> for bookrent::AppCommand {
    fn from(cmd: Commands) -> bookrent::AppCommand {
        match cmd {
            Commands::Quote {
                book_id,
                weeks,
                delivery,
            } => bookrent::AppCommand::Quote {
                item_id: book_id,
                weeks,
                delivery,
            },
            Commands::Rent {
                book_id,
                method,
                phone,
                weeks,
                delivery,
            } => bookrent::AppCommand::Rent(RentOptions {
                item_id: book_id,
                method,
                phone_number: phone,
                weeks,
                delivery,
            }),
            Commands::Rentals { status } => bookrent::AppCommand::Rentals {
                status: status.map(Into::into),
            },
            Commands::Favorite { book_id } => bookrent::AppCommand::Favorite { item_id: book_id },
            Commands::Favorites => bookrent::AppCommand::Favorites,
            Commands::Setup | Commands::Methods => {
                unreachable!("Command is handled without loading the configuration")
            }
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// List the supported payment methods
    Methods,
    /// Show the rental cost of a book
    Quote {
        book_id: u64,
        /// Rental length in weeks: 1, 2, 4, 8, 12 or 24
        #[arg(short, long, default_value_t = 1)]
        weeks: u32,
        /// pickup or delivery
        #[arg(short, long, default_value = "pickup")]
        delivery: DeliveryMethod,
    },
    /// Pay for and rent a book
    Rent {
        book_id: u64,
        /// Payment method id, see `methods`
        #[arg(short, long)]
        method: String,
        /// Phone number for mobile money and bank transfers
        #[arg(short, long)]
        phone: Option<String>,
        #[arg(short, long, default_value_t = 1)]
        weeks: u32,
        #[arg(short, long, default_value = "pickup")]
        delivery: DeliveryMethod,
    },
    /// List rented books
    Rentals {
        #[arg(short, long, value_enum)]
        status: Option<StatusFilter>,
    },
    /// Add or remove a book from favorites
    Favorite { book_id: u64 },
    /// List favorite books
    Favorites,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => match cli.config_path.as_deref() {
            Some(path) => bookrent::cli::setup::setup_at_path(path),
            None => bookrent::cli::setup::setup(),
        },
        Some(Commands::Methods) => {
            bookrent::cli::rent::print_methods();
            Ok(())
        }
        Some(cmd) => bookrent::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
