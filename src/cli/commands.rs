//! CLI commands for the multisig ledger
//!
//! Implements all command handlers for the CLI interface.

use crate::contract::{templates, Compiler};
use crate::core::abi::{self, ParamType};
use crate::core::{encode_call_args, format_amount, parse_amount, Address, Payload};
use crate::ledger::{AccountKind, FactoryMethod, Ledger, WalletMethod};
use crate::multisig::{Approval, Execution, MultisigWallet};
use crate::storage::{Storage, StorageConfig};
use std::path::{Path, PathBuf};

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Application state
pub struct AppState {
    pub ledger: Ledger,
    pub storage: Storage,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Initialize application state
    pub fn new(data_dir: PathBuf) -> CliResult<Self> {
        let storage = Storage::new(StorageConfig {
            data_dir: data_dir.clone(),
            ..Default::default()
        })?;

        let ledger = if storage.exists() {
            log::debug!("Loading ledger from {:?}", data_dir);
            storage.load()?
        } else {
            println!("🆕 Creating new ledger...");
            let ledger = Ledger::new();
            storage.save(&ledger)?;
            ledger
        };

        Ok(Self {
            ledger,
            storage,
            data_dir,
        })
    }

    /// Save the current state
    pub fn save(&self) -> CliResult<()> {
        self.storage.save(&self.ledger)?;
        Ok(())
    }
}

/// Call data given either as raw hex or as a method signature with arguments
#[derive(Debug, Default, Clone)]
pub struct CallInput {
    pub data: Option<String>,
    pub method: Option<String>,
    pub args: Vec<String>,
}

impl CallInput {
    /// Encode into the bytes sent to the target
    pub fn encode(&self) -> CliResult<Payload> {
        match (self.data.as_deref(), self.method.as_deref()) {
            (Some(_), Some(_)) => Err("Give either --data or --method, not both".into()),
            (Some(hex), None) => Ok(Payload::from_hex(hex)?),
            (None, Some(signature)) => Ok(encode_call_args(signature, &self.args)?),
            (None, None) if !self.args.is_empty() => Err("--arg requires --method".into()),
            (None, None) => Ok(Payload::default()),
        }
    }
}

fn address(text: &str) -> CliResult<Address> {
    text.parse::<Address>()
        .map_err(|e| format!("Invalid address '{}': {}", text, e).into())
}

fn addresses(list: &[String]) -> CliResult<Vec<Address>> {
    list.iter().map(|a| address(a)).collect()
}

fn coins(text: &str) -> CliResult<u128> {
    parse_amount(text).map_err(|e| format!("Invalid amount '{}': {}", text, e).into())
}

fn print_approval(kind: &str, approval: &Approval, quorum: u32) {
    println!("   ├─ {} ID: {}", kind, approval.id);
    println!("   ├─ Approvals: {}/{}", approval.approvals, quorum);
    match &approval.execution {
        Some(Execution::Payment { to, amount, .. }) => {
            println!("   └─ 💸 Executed: sent {} coins to {}", format_amount(*amount), to)
        }
        Some(Execution::Call { to, .. }) => println!("   └─ ⚡ Executed: called {}", to),
        None => println!("   └─ ⏳ Waiting for more approvals"),
    }
}

/// Initialize a new ledger
pub fn cmd_init(data_dir: &Path) -> CliResult<()> {
    let storage = Storage::new(StorageConfig {
        data_dir: data_dir.to_path_buf(),
        ..Default::default()
    })?;

    if storage.exists() {
        println!("⚠️  Ledger already exists at {:?}", data_dir);
        return Ok(());
    }

    storage.save(&Ledger::new())?;

    println!("✅ Ledger initialized!");
    println!("   📁 Data directory: {:?}", data_dir);
    println!(
        "   📄 Ledger file: {:?}",
        data_dir.join(&storage.config().ledger_file)
    );

    Ok(())
}

// ============================================================================
// Accounts
// ============================================================================

/// Generate a fresh external account address
pub fn cmd_account_new() -> CliResult<()> {
    let account = Address::random();
    println!("🔐 New account address!");
    println!("   📍 Address: {}", account);
    println!("   Fund it with: account fund --address {}", account);
    Ok(())
}

/// Show the balance and kind of any address
pub fn cmd_account_balance(state: &AppState, account: &str) -> CliResult<()> {
    let account = address(account)?;
    let balance = state.ledger.balance(&account);

    println!("💰 Account: {}", account);
    println!("   ├─ Kind: {:?}", state.ledger.kind_of(&account));
    println!("   └─ Balance: {} coins", format_amount(balance));

    Ok(())
}

/// Mint coins into an account
pub fn cmd_account_fund(state: &mut AppState, account: &str, amount: &str) -> CliResult<()> {
    let account = address(account)?;
    let amount = coins(amount)?;

    let balance = state.ledger.fund(&account, amount)?;
    state.save()?;

    println!("✅ Funded {} with {} coins", account, format_amount(amount));
    println!("   💰 New balance: {} coins", format_amount(balance));

    Ok(())
}

/// Move coins between two accounts
pub fn cmd_send(state: &mut AppState, from: &str, to: &str, amount: &str) -> CliResult<()> {
    let from = address(from)?;
    let to = address(to)?;
    let amount = coins(amount)?;

    println!("📤 Sending {} coins...", format_amount(amount));
    state.ledger.send(&from, &to, amount)?;
    state.save()?;

    println!("✅ Sent!");
    println!("   ├─ From: {}", from);
    println!("   ├─ To: {}", to);
    println!("   └─ Sender balance: {} coins", format_amount(state.ledger.balance(&from)));

    Ok(())
}

// ============================================================================
// Factories and wallets
// ============================================================================

/// Deploy a wallet factory
pub fn cmd_factory_deploy(state: &mut AppState, deployer: &str) -> CliResult<()> {
    let deployer = address(deployer)?;
    let factory = state.ledger.deploy_factory(&deployer)?;
    state.save()?;

    println!("🏭 Factory deployed!");
    println!("   📍 Address: {}", factory);

    Ok(())
}

/// Create a wallet, through a factory when one is given
pub fn cmd_wallet_create(
    state: &mut AppState,
    factory: Option<&str>,
    deployer: Option<&str>,
    approvers: &[String],
    quorum: u32,
    name: &str,
) -> CliResult<()> {
    let approvers = addresses(approvers)?;

    let wallet = match (factory, deployer) {
        (Some(factory), None) => state.ledger.create_wallet(&address(factory)?, approvers, quorum, name)?,
        (None, Some(deployer)) => {
            state.ledger.deploy_wallet(&address(deployer)?, approvers, quorum, name)?
        }
        _ => return Err("Give either --factory or --deployer".into()),
    };
    state.save()?;

    let wallet = state.ledger.wallet(&wallet)?;
    println!("🔐 Wallet created!");
    println!("   ├─ Address: {}", wallet.address());
    println!("   ├─ Name: {}", wallet.name());
    println!("   └─ Policy: {}", wallet.description());

    Ok(())
}

/// List every wallet on the ledger
pub fn cmd_wallet_list(state: &AppState) -> CliResult<()> {
    let wallets = state.ledger.wallets();

    if wallets.is_empty() {
        println!("📭 No wallets found. Create one with: wallet create");
        return Ok(());
    }

    println!("👛 Wallets ({}):", wallets.len());
    println!();

    for wallet in wallets {
        println!(
            "   {} {:<16} {} ({} coins)",
            wallet.address(),
            wallet.name(),
            wallet.description(),
            format_amount(state.ledger.balance(wallet.address()))
        );
    }

    Ok(())
}

/// Show a wallet's approvers and proposals
pub fn cmd_wallet_info(state: &AppState, wallet: &str) -> CliResult<()> {
    let wallet = state.ledger.wallet(&address(wallet)?)?;

    println!("👛 Wallet: {}", wallet.name());
    println!("   ├─ Address: {}", wallet.address());
    println!("   ├─ Policy: {}", wallet.description());
    println!(
        "   ├─ Balance: {} coins",
        format_amount(state.ledger.balance(wallet.address()))
    );
    println!("   ├─ Transfers: {}", wallet.transfers().len());
    println!("   ├─ Transactions: {}", wallet.transactions().len());
    println!("   └─ Approvers:");
    for approver in wallet.approvers() {
        println!("      • {}", approver);
    }

    Ok(())
}

/// Wallets of a factory that list an approver
pub fn cmd_wallet_for(state: &AppState, factory: &str, approver: &str) -> CliResult<()> {
    let factory = address(factory)?;
    let approver = address(approver)?;
    let wallets = state.ledger.wallets_for_approver(&factory, &approver)?;

    if wallets.is_empty() {
        println!("📭 {} is not an approver of any wallet from {}", approver, factory);
        return Ok(());
    }

    println!("👛 Wallets of {} listing {}:", factory, approver);
    for wallet in wallets {
        let name = state
            .ledger
            .wallet(wallet)
            .map(MultisigWallet::name)
            .unwrap_or("?");
        println!("   • {} ({})", wallet, name);
    }

    Ok(())
}

// ============================================================================
// Transfers
// ============================================================================

pub fn cmd_transfer_create(
    state: &mut AppState,
    wallet: &str,
    caller: &str,
    amount: &str,
    to: &str,
) -> CliResult<()> {
    let wallet = address(wallet)?;
    let caller = address(caller)?;
    let amount = coins(amount)?;
    let to = address(to)?;

    let id = state.ledger.create_transfer(&wallet, &caller, amount, to)?;
    state.save()?;

    println!("📝 Transfer proposed!");
    println!("   ├─ Transfer ID: {}", id);
    println!("   ├─ Amount: {} coins", format_amount(amount));
    println!("   ├─ To: {}", to);
    println!("   └─ Approvals: 0/{}", state.ledger.wallet(&wallet)?.quorum());

    Ok(())
}

pub fn cmd_transfer_approve(state: &mut AppState, wallet: &str, caller: &str, id: u64) -> CliResult<()> {
    let wallet = address(wallet)?;
    let caller = address(caller)?;

    let approval = state.ledger.approve_transfer(&wallet, &caller, id)?;
    state.save()?;

    println!("✍️  Transfer approved by {}", caller);
    print_approval("Transfer", &approval, state.ledger.wallet(&wallet)?.quorum());

    Ok(())
}

pub fn cmd_transfer_list(state: &AppState, wallet: &str) -> CliResult<()> {
    let wallet = state.ledger.wallet(&address(wallet)?)?;
    let transfers = wallet.transfers();

    if transfers.is_empty() {
        println!("📭 No transfers proposed on {}", wallet.name());
        return Ok(());
    }

    println!("📋 Transfers of {} ({}):", wallet.name(), transfers.len());
    for t in transfers {
        let status = if t.sent { "✅ sent" } else { "⏳ pending" };
        println!(
            "   #{:<4} {} coins → {}  [{}/{}] {}",
            t.id,
            format_amount(t.amount),
            t.to,
            t.approvals(),
            wallet.quorum(),
            status
        );
    }

    Ok(())
}

// ============================================================================
// Transactions
// ============================================================================

pub fn cmd_transaction_create(
    state: &mut AppState,
    wallet: &str,
    caller: &str,
    to: &str,
    input: &CallInput,
) -> CliResult<()> {
    let wallet = address(wallet)?;
    let caller = address(caller)?;
    let to = address(to)?;
    let data = input.encode()?;

    let approval = state.ledger.create_transaction(&wallet, &caller, to, data)?;
    state.save()?;

    println!("📝 Transaction proposed (creator approval counted)");
    print_approval("Transaction", &approval, state.ledger.wallet(&wallet)?.quorum());

    Ok(())
}

pub fn cmd_transaction_approve(
    state: &mut AppState,
    wallet: &str,
    caller: &str,
    id: u64,
) -> CliResult<()> {
    let wallet = address(wallet)?;
    let caller = address(caller)?;

    let approval = state.ledger.approve_transaction(&wallet, &caller, id)?;
    state.save()?;

    println!("✍️  Transaction approved by {}", caller);
    print_approval("Transaction", &approval, state.ledger.wallet(&wallet)?.quorum());

    Ok(())
}

pub fn cmd_transaction_show(state: &AppState, wallet: &str, id: u64) -> CliResult<()> {
    let wallet = state.ledger.wallet(&address(wallet)?)?;
    let tx = wallet.transaction(id)?;

    println!("📄 Transaction #{} of {}", tx.id, wallet.name());
    println!("   ├─ To: {}", tx.to);
    println!("   ├─ Data: {} ({} bytes)", tx.data, tx.data.len());
    if let Some(method) = tx.data.selector().and_then(|sel| method_name(&state.ledger, &tx.to, sel)) {
        println!("   ├─ Method: {}", method);
    }
    println!("   ├─ Approvals: {}/{}", tx.approvals(), wallet.quorum());
    println!("   └─ Executed: {}", tx.executed);

    Ok(())
}

pub fn cmd_transaction_list(state: &AppState, wallet: &str) -> CliResult<()> {
    let wallet = state.ledger.wallet(&address(wallet)?)?;
    let transactions = wallet.transactions();

    if transactions.is_empty() {
        println!("📭 No transactions proposed on {}", wallet.name());
        return Ok(());
    }

    println!("📋 Transactions of {} ({}):", wallet.name(), transactions.len());
    for tx in transactions {
        let status = if tx.executed { "✅ executed" } else { "⏳ pending" };
        println!(
            "   #{:<4} → {}  {} bytes  [{}/{}] {}",
            tx.id,
            tx.to,
            tx.data.len(),
            tx.approvals(),
            wallet.quorum(),
            status
        );
    }

    Ok(())
}

// ============================================================================
// Contracts and calls
// ============================================================================

/// Compile and deploy a VM contract from a source file or a bundled template
pub fn cmd_contract_deploy(
    state: &mut AppState,
    deployer: &str,
    file: Option<&Path>,
    template: Option<&str>,
) -> CliResult<()> {
    let deployer = address(deployer)?;
    let source = match (file, template) {
        (Some(file), None) => {
            println!("📜 Deploying contract from {:?}...", file);
            std::fs::read_to_string(file)?
        }
        (None, Some(name)) => {
            println!("📜 Deploying '{}' template...", name);
            templates::source(name)
                .ok_or_else(|| format!("Unknown template: {}", name))?
                .to_string()
        }
        _ => return Err("Give either --file or --template".into()),
    };

    let bytecode = Compiler::new().compile(&source)?;
    println!("   Compiled {} bytes of bytecode", bytecode.len());

    let contract = state.ledger.deploy_contract(&deployer, bytecode)?;
    state.save()?;

    println!("✅ Contract deployed!");
    println!("   Address: {}", contract);

    Ok(())
}

/// Call a VM contract and print its return value
pub fn cmd_contract_call(
    state: &mut AppState,
    caller: &str,
    contract: &str,
    input: &CallInput,
    value: Option<&str>,
) -> CliResult<()> {
    let caller = address(caller)?;
    let contract = address(contract)?;
    if state.ledger.kind_of(&contract) != AccountKind::Contract {
        return Err(format!("No contract at {}", contract).into());
    }
    let value = value.map(coins).transpose()?.unwrap_or(0);
    let data = input.encode()?;

    println!("📞 Calling contract {}...", contract);
    let output = state.ledger.call(&caller, &contract, data.as_bytes(), value)?;
    state.save()?;

    match abi::words(&output)?.first() {
        Some(word) => println!("✅ Return value: {}", abi::word_to_uint(word)?),
        None => println!("✅ Call succeeded (no return value)"),
    }

    Ok(())
}

/// Known method name of a wallet or factory selector
fn method_name(ledger: &Ledger, to: &Address, sel: abi::Selector) -> Option<&'static str> {
    match ledger.kind_of(to) {
        AccountKind::Wallet => WalletMethod::from_selector(sel).map(|m| m.signature()),
        AccountKind::Factory => FactoryMethod::from_selector(sel).map(|m| m.signature()),
        _ => None,
    }
}

/// Return types to decode `output` with, if they are known
fn return_types(
    ledger: &Ledger,
    to: &Address,
    data: &Payload,
    returns: Option<&str>,
) -> CliResult<Option<Vec<ParamType>>> {
    if let Some(list) = returns {
        let types = list
            .split(',')
            .filter(|t| !t.trim().is_empty())
            .map(ParamType::parse)
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Some(types));
    }

    let known = data.selector().and_then(|sel| match ledger.kind_of(to) {
        AccountKind::Wallet => WalletMethod::from_selector(sel).map(|m| m.returns()),
        AccountKind::Factory => FactoryMethod::from_selector(sel).map(|m| m.returns()),
        _ => None,
    });
    Ok(known.map(<[ParamType]>::to_vec))
}

/// Send call data (and optionally coins) to any address
pub fn cmd_call(
    state: &mut AppState,
    caller: &str,
    to: &str,
    input: &CallInput,
    value: Option<&str>,
    returns: Option<&str>,
    dry_run: bool,
) -> CliResult<()> {
    let caller = address(caller)?;
    let to = address(to)?;
    let data = input.encode()?;
    let value = value.map(coins).transpose()?.unwrap_or(0);

    let output = if dry_run {
        if value > 0 {
            return Err("--value cannot be combined with --dry-run".into());
        }
        state.ledger.static_call(&caller, &to, data.as_bytes())?
    } else {
        let output = state.ledger.call(&caller, &to, data.as_bytes(), value)?;
        state.save()?;
        output
    };

    if dry_run {
        println!("🔍 Dry run against {:?} {} (nothing saved)", state.ledger.kind_of(&to), to);
    } else {
        println!("✅ Call to {:?} {} succeeded", state.ledger.kind_of(&to), to);
    }

    if output.is_empty() {
        println!("   └─ No output");
        return Ok(());
    }

    match return_types(&state.ledger, &to, &data, returns)? {
        Some(types) if !types.is_empty() => {
            let tokens = abi::decode(&types, &output)?;
            for (i, (param, token)) in types.iter().zip(&tokens).enumerate() {
                let branch = if i + 1 == tokens.len() { "└─" } else { "├─" };
                println!("   {} {}: {}", branch, param.name(), token);
            }
        }
        _ => println!("   └─ Output: 0x{}", hex::encode(&output)),
    }

    Ok(())
}

/// Print the event log
pub fn cmd_events(state: &AppState, since: Option<u64>, limit: usize) -> CliResult<()> {
    let events = match since {
        Some(sequence) => state.ledger.events_since(sequence),
        None => state.ledger.events(),
    };

    if events.is_empty() {
        println!("📭 No events");
        return Ok(());
    }

    let shown = &events[events.len().saturating_sub(limit)..];
    println!(
        "📜 Events (showing {} of {}, ledger sequence {}):",
        shown.len(),
        events.len(),
        state.ledger.sequence()
    );
    println!();

    for entry in shown {
        println!(
            "   [{:>5}] {} {:<20} {}",
            entry.sequence,
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.event.name(),
            entry.emitter.short()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ONE_COIN;
    use tempfile::TempDir;

    fn state() -> (TempDir, AppState) {
        let dir = TempDir::new().unwrap();
        let state = AppState::new(dir.path().to_path_buf()).unwrap();
        (dir, state)
    }

    #[test]
    fn test_call_input_encoding() {
        let raw = CallInput {
            data: Some("0xdeadbeef".to_string()),
            ..Default::default()
        };
        assert_eq!(raw.encode().unwrap().as_bytes(), &[0xde, 0xad, 0xbe, 0xef]);

        let method = CallInput {
            method: Some("isApprover(address)".to_string()),
            args: vec![Address::ZERO.to_string()],
            ..Default::default()
        };
        assert_eq!(method.encode().unwrap().len(), 4 + 32);

        let both = CallInput {
            data: Some("0x00".to_string()),
            method: Some("quorum()".to_string()),
            args: vec![],
        };
        assert!(both.encode().is_err());

        let stray = CallInput {
            args: vec!["1".to_string()],
            ..Default::default()
        };
        assert!(stray.encode().is_err());

        assert!(CallInput::default().encode().unwrap().is_empty());
    }

    #[test]
    fn test_cli_wallet_flow_persists() {
        let (dir, mut state) = state();
        let (x, y, z) = (Address::random(), Address::random(), Address::random());
        let approvers: Vec<String> = [x, y, z].iter().map(|a| a.to_string()).collect();

        cmd_factory_deploy(&mut state, &x.to_string()).unwrap();
        let factory = *state.ledger.factories()[0].address();

        cmd_wallet_create(&mut state, Some(&factory.to_string()), None, &approvers, 2, "Ops").unwrap();
        let wallet = *state.ledger.wallets()[0].address();

        cmd_account_fund(&mut state, &wallet.to_string(), "1").unwrap();
        cmd_transfer_create(&mut state, &wallet.to_string(), &x.to_string(), "0.25", &z.to_string())
            .unwrap();
        cmd_transfer_approve(&mut state, &wallet.to_string(), &x.to_string(), 0).unwrap();
        cmd_transfer_approve(&mut state, &wallet.to_string(), &y.to_string(), 0).unwrap();

        // A fresh state reads what the commands saved
        let reloaded = AppState::new(dir.path().to_path_buf()).unwrap();
        assert_eq!(reloaded.ledger.balance(&z), ONE_COIN / 4);
        assert!(reloaded.ledger.wallet(&wallet).unwrap().transfer(0).unwrap().sent);
        assert_eq!(
            reloaded.ledger.wallets_for_approver(&factory, &y).unwrap(),
            &[wallet]
        );
    }

    #[test]
    fn test_cli_rejects_bad_input() {
        let (_dir, mut state) = state();

        assert!(cmd_account_fund(&mut state, "not-an-address", "1").is_err());
        assert!(cmd_account_fund(&mut state, &Address::random().to_string(), "abc").is_err());
        assert!(cmd_wallet_create(&mut state, None, None, &[], 1, "x").is_err());
        assert!(cmd_wallet_info(&state, &Address::random().to_string()).is_err());
    }

    #[test]
    fn test_cli_dry_run_leaves_ledger_untouched() {
        let (_dir, mut state) = state();
        let x = Address::random();
        let wallet = state.ledger.deploy_wallet(&x, vec![x], 1, "Solo").unwrap();
        let sequence = state.ledger.sequence();

        let input = CallInput {
            method: Some("createTransfer(uint256,address)".to_string()),
            args: vec!["0".to_string(), x.to_string()],
            ..Default::default()
        };
        // Zero amount is rejected, and a dry run never commits anything
        assert!(cmd_call(&mut state, &x.to_string(), &wallet.to_string(), &input, None, None, true).is_err());

        let view = CallInput {
            method: Some("quorum()".to_string()),
            ..Default::default()
        };
        cmd_call(&mut state, &x.to_string(), &wallet.to_string(), &view, None, None, true).unwrap();

        assert_eq!(state.ledger.sequence(), sequence);
        assert!(state.ledger.wallet(&wallet).unwrap().transfers().is_empty());
    }

    #[test]
    fn test_cli_contract_template_deploy_and_call() {
        let (_dir, mut state) = state();
        let deployer = Address::random();

        cmd_contract_deploy(&mut state, &deployer.to_string(), None, Some("counter")).unwrap();
        let contract = state.ledger.contracts().list()[0];
        assert_eq!(state.ledger.kind_of(&contract), AccountKind::Contract);

        let increment = CallInput {
            method: Some("increment()".to_string()),
            ..Default::default()
        };
        cmd_contract_call(&mut state, &deployer.to_string(), &contract.to_string(), &increment, None)
            .unwrap();
        cmd_contract_call(&mut state, &deployer.to_string(), &contract.to_string(), &increment, None)
            .unwrap();

        let count = CallInput {
            method: Some("count()".to_string()),
            ..Default::default()
        };
        let output = state
            .ledger
            .static_call(&deployer, &contract, count.encode().unwrap().as_bytes())
            .unwrap();
        assert_eq!(abi::word_to_uint(&abi::words(&output).unwrap()[0]).unwrap(), 2);

        assert!(cmd_contract_deploy(&mut state, &deployer.to_string(), None, Some("nope")).is_err());
        let stranger = Address::random().to_string();
        assert!(cmd_contract_call(&mut state, &stranger, &stranger, &increment, None).is_err());
    }
}
