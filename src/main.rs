//! Multisig Wallet CLI Application
//!
//! A command-line interface for deploying and operating quorum-approved wallets.

use clap::{Args, Parser, Subcommand};
use multisig_wallet::api::{create_router, ApiState};
use multisig_wallet::cli::{self, AppState, CallInput};
use multisig_wallet::storage::{Storage, StorageConfig};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "multisig")]
#[command(author = "Darshan")]
#[command(version = "0.1.0")]
#[command(about = "Quorum-approved multi-signature wallets in Rust", long_about = None)]
struct Cli {
    /// Data directory for ledger storage
    #[arg(short, long, default_value = ".multisig_data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new ledger
    Init,

    /// Account management
    Account {
        #[command(subcommand)]
        action: AccountCommands,
    },

    /// Wallet factories
    Factory {
        #[command(subcommand)]
        action: FactoryCommands,
    },

    /// Multisig wallets
    Wallet {
        #[command(subcommand)]
        action: WalletCommands,
    },

    /// Proposals to pay native coins out of a wallet
    Transfer {
        #[command(subcommand)]
        action: TransferCommands,
    },

    /// Proposals to call another address from a wallet
    Transaction {
        #[command(subcommand)]
        action: TransactionCommands,
    },

    /// VM contracts
    Contract {
        #[command(subcommand)]
        action: ContractCommands,
    },

    /// Call any address (wallet, factory or contract)
    Call {
        /// Caller address
        #[arg(short, long)]
        caller: String,

        /// Target address
        #[arg(short, long)]
        to: String,

        #[command(flatten)]
        input: CallArgs,

        /// Coins to send along with the call
        #[arg(long)]
        value: Option<String>,

        /// Return types to decode the output with (comma-separated)
        #[arg(long)]
        returns: Option<String>,

        /// Run the call without saving any of its effects
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the event log
    Events {
        /// Only events after this ledger sequence
        #[arg(short, long)]
        since: Option<u64>,

        /// Number of events to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },

    /// REST API server
    Api {
        #[command(subcommand)]
        action: ApiCommands,
    },
}

/// Call data, as hex or as a method signature with arguments
#[derive(Args)]
struct CallArgs {
    /// Raw call data (0x-prefixed hex)
    #[arg(long)]
    data: Option<String>,

    /// Method signature, e.g. "createTransfer(uint256,address)"
    #[arg(short, long)]
    method: Option<String>,

    /// Method argument (repeat for each parameter)
    #[arg(long = "arg")]
    args: Vec<String>,
}

impl From<CallArgs> for CallInput {
    fn from(args: CallArgs) -> Self {
        CallInput {
            data: args.data,
            method: args.method,
            args: args.args,
        }
    }
}

#[derive(Subcommand)]
enum AccountCommands {
    /// Generate a new account address
    New,
    /// Check the balance of an address
    Balance {
        #[arg(short, long)]
        address: String,
    },
    /// Mint coins into an address
    Fund {
        #[arg(short, long)]
        address: String,
        /// Amount in coins (e.g. 0.1)
        #[arg(long)]
        amount: String,
    },
    /// Send coins
    Send {
        #[arg(short, long)]
        from: String,
        #[arg(short, long)]
        to: String,
        /// Amount in coins (e.g. 0.1)
        #[arg(long)]
        amount: String,
    },
}

#[derive(Subcommand)]
enum FactoryCommands {
    /// Deploy a wallet factory
    Deploy {
        #[arg(short, long)]
        deployer: String,
    },
}

#[derive(Subcommand)]
enum WalletCommands {
    /// Create a wallet through a factory, or deploy one directly
    Create {
        /// Factory to create the wallet through
        #[arg(short, long, conflicts_with = "deployer")]
        factory: Option<String>,
        /// Deploy the wallet directly from this account
        #[arg(short, long)]
        deployer: Option<String>,
        /// Approver addresses (comma-separated)
        #[arg(short, long, value_delimiter = ',', required = true)]
        approvers: Vec<String>,
        /// Approvals required to execute a proposal
        #[arg(short, long)]
        quorum: u32,
        /// Wallet name
        #[arg(short, long, default_value = "")]
        name: String,
    },
    /// List all wallets
    List,
    /// Show wallet info
    Info {
        #[arg(short, long)]
        address: String,
    },
    /// Wallets of a factory that list an approver
    For {
        #[arg(short, long)]
        factory: String,
        #[arg(short, long)]
        approver: String,
    },
}

#[derive(Subcommand)]
enum TransferCommands {
    /// Propose a transfer
    Create {
        #[arg(short, long)]
        wallet: String,
        /// Proposing approver
        #[arg(short, long)]
        caller: String,
        /// Amount in coins (e.g. 0.1)
        #[arg(long)]
        amount: String,
        /// Recipient
        #[arg(short, long)]
        to: String,
    },
    /// Approve a transfer
    Approve {
        #[arg(short, long)]
        wallet: String,
        #[arg(short, long)]
        caller: String,
        #[arg(long)]
        id: u64,
    },
    /// List a wallet's transfers
    List {
        #[arg(short, long)]
        wallet: String,
    },
}

#[derive(Subcommand)]
enum TransactionCommands {
    /// Propose a call from the wallet (the creator's approval is counted)
    Create {
        #[arg(short, long)]
        wallet: String,
        #[arg(short, long)]
        caller: String,
        /// Call target
        #[arg(short, long)]
        to: String,
        #[command(flatten)]
        input: CallArgs,
    },
    /// Approve a transaction
    Approve {
        #[arg(short, long)]
        wallet: String,
        #[arg(short, long)]
        caller: String,
        #[arg(long)]
        id: u64,
    },
    /// Show one transaction
    Show {
        #[arg(short, long)]
        wallet: String,
        #[arg(long)]
        id: u64,
    },
    /// List a wallet's transactions
    List {
        #[arg(short, long)]
        wallet: String,
    },
}

#[derive(Subcommand)]
enum ContractCommands {
    /// Deploy a new contract
    Deploy {
        #[arg(short, long)]
        deployer: String,
        /// Contract source file (.asm)
        #[arg(short, long, conflicts_with = "template")]
        file: Option<PathBuf>,
        /// Bundled template: withdraw, counter or revert
        #[arg(short, long)]
        template: Option<String>,
    },
    /// Call a contract
    Call {
        #[arg(short, long)]
        caller: String,
        /// Contract address
        #[arg(short, long)]
        address: String,
        #[command(flatten)]
        input: CallArgs,
        /// Coins to send along with the call
        #[arg(long)]
        value: Option<String>,
    },
}

#[derive(Subcommand)]
enum ApiCommands {
    /// Start the REST API server
    Start {
        /// Port to listen on for REST API
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Handle init command separately (doesn't need full state)
    if let Commands::Init = cli.command {
        return cli::cmd_init(&cli.data_dir);
    }

    // Handle API commands with tokio runtime
    if let Commands::Api { ref action } = cli.command {
        return run_api_command(action, &cli.data_dir);
    }

    // Initialize application state
    let mut state = AppState::new(cli.data_dir.clone())?;

    // Process commands
    match cli.command {
        Commands::Init => unreachable!(),
        Commands::Api { .. } => unreachable!(),

        Commands::Account { action } => match action {
            AccountCommands::New => cli::cmd_account_new()?,
            AccountCommands::Balance { address } => cli::cmd_account_balance(&state, &address)?,
            AccountCommands::Fund { address, amount } => {
                cli::cmd_account_fund(&mut state, &address, &amount)?;
            }
            AccountCommands::Send { from, to, amount } => {
                cli::cmd_send(&mut state, &from, &to, &amount)?;
            }
        },

        Commands::Factory { action } => match action {
            FactoryCommands::Deploy { deployer } => cli::cmd_factory_deploy(&mut state, &deployer)?,
        },

        Commands::Wallet { action } => match action {
            WalletCommands::Create {
                factory,
                deployer,
                approvers,
                quorum,
                name,
            } => {
                cli::cmd_wallet_create(
                    &mut state,
                    factory.as_deref(),
                    deployer.as_deref(),
                    &approvers,
                    quorum,
                    &name,
                )?;
            }
            WalletCommands::List => cli::cmd_wallet_list(&state)?,
            WalletCommands::Info { address } => cli::cmd_wallet_info(&state, &address)?,
            WalletCommands::For { factory, approver } => {
                cli::cmd_wallet_for(&state, &factory, &approver)?;
            }
        },

        Commands::Transfer { action } => match action {
            TransferCommands::Create {
                wallet,
                caller,
                amount,
                to,
            } => cli::cmd_transfer_create(&mut state, &wallet, &caller, &amount, &to)?,
            TransferCommands::Approve { wallet, caller, id } => {
                cli::cmd_transfer_approve(&mut state, &wallet, &caller, id)?;
            }
            TransferCommands::List { wallet } => cli::cmd_transfer_list(&state, &wallet)?,
        },

        Commands::Transaction { action } => match action {
            TransactionCommands::Create {
                wallet,
                caller,
                to,
                input,
            } => cli::cmd_transaction_create(&mut state, &wallet, &caller, &to, &input.into())?,
            TransactionCommands::Approve { wallet, caller, id } => {
                cli::cmd_transaction_approve(&mut state, &wallet, &caller, id)?;
            }
            TransactionCommands::Show { wallet, id } => {
                cli::cmd_transaction_show(&state, &wallet, id)?;
            }
            TransactionCommands::List { wallet } => cli::cmd_transaction_list(&state, &wallet)?,
        },

        Commands::Contract { action } => match action {
            ContractCommands::Deploy {
                deployer,
                file,
                template,
            } => cli::cmd_contract_deploy(
                &mut state,
                &deployer,
                file.as_deref(),
                template.as_deref(),
            )?,
            ContractCommands::Call {
                caller,
                address,
                input,
                value,
            } => cli::cmd_contract_call(
                &mut state,
                &caller,
                &address,
                &input.into(),
                value.as_deref(),
            )?,
        },

        Commands::Call {
            caller,
            to,
            input,
            value,
            returns,
            dry_run,
        } => cli::cmd_call(
            &mut state,
            &caller,
            &to,
            &input.into(),
            value.as_deref(),
            returns.as_deref(),
            dry_run,
        )?,

        Commands::Events { since, limit } => cli::cmd_events(&state, since, limit)?,
    }

    Ok(())
}

fn run_api_command(action: &ApiCommands, data_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        match action {
            ApiCommands::Start { port } => {
                let storage = Storage::new(StorageConfig {
                    data_dir: data_dir.to_path_buf(),
                    ..Default::default()
                })?;

                if storage.exists() {
                    println!("📂 Loading existing ledger...");
                } else {
                    println!("📂 Creating new ledger...");
                }
                let ledger = storage.load_or_new()?;
                storage.save(&ledger)?;

                let state = ApiState::new(ledger, storage);
                let shutdown_state = state.clone();

                let app = create_router(state);
                let addr = format!("0.0.0.0:{}", port);
                println!("🚀 REST API server starting on http://localhost:{}", port);

                println!();
                println!("📖 Available endpoints:");
                println!("   GET  /health                                   - Health check");
                println!("   GET  /ws                                       - WebSocket events");
                println!("   POST /api/accounts                             - New account");
                println!("   GET  /api/accounts/{{addr}}                      - Balance");
                println!("   POST /api/accounts/{{addr}}/fund                 - Mint coins");
                println!("   POST /api/send                                 - Send coins");
                println!("   GET  /api/factories                            - List factories");
                println!("   POST /api/factories                            - Deploy factory");
                println!("   POST /api/factories/{{addr}}/wallets             - Create wallet");
                println!("   GET  /api/factories/{{addr}}/approvers/{{a}}       - Wallets of approver");
                println!("   GET  /api/wallets                              - List wallets");
                println!("   GET  /api/wallets/{{addr}}                       - Wallet info");
                println!("   POST /api/wallets/{{addr}}/transfers             - Propose transfer");
                println!("   POST /api/wallets/{{addr}}/transfers/{{id}}/approve - Approve transfer");
                println!("   POST /api/wallets/{{addr}}/transactions          - Propose transaction");
                println!("   POST /api/wallets/{{addr}}/transactions/{{id}}/approve - Approve transaction");
                println!("   GET  /api/contracts                            - List contracts");
                println!("   POST /api/contracts                            - Deploy contract");
                println!("   POST /api/call                                 - Call any address");
                println!("   GET  /api/events                               - Event log");
                println!();

                // Handle Ctrl+C with graceful shutdown
                tokio::spawn(async move {
                    tokio::signal::ctrl_c().await.ok();
                    println!("\n📴 Shutting down API server...");
                    println!("💾 Saving data...");

                    let ledger = shutdown_state.ledger.read().await;
                    match shutdown_state.storage.save(&ledger) {
                        Ok(()) => println!("✅ Data saved successfully!"),
                        Err(e) => log::error!("Failed to save ledger: {}", e),
                    }
                    std::process::exit(0);
                });

                let listener = tokio::net::TcpListener::bind(&addr).await?;
                axum::serve(listener, app).await?;
            }
        }

        Ok::<(), Box<dyn std::error::Error>>(())
    })?;

    Ok(())
}
