//! Ledger state and atomic operations
//!
//! The ledger owns every balance, wallet, factory and contract. Top-level
//! operations run through [`Ledger::atomically`]: every entry an operation
//! changes is journaled first and restored if the operation fails at any
//! depth, so a failed payment or reverted call leaves approvals, flags and
//! balances exactly as they were.

use crate::contract::{CallParams, ContractError, ContractManager};
use crate::core::abi::{uint_word, AbiError};
use crate::core::{format_amount, Address, Amount, Payload};
use crate::ledger::dispatch;
use crate::ledger::event::{Event, LogEntry};
use crate::ledger::journal::Journal;
use crate::multisig::{
    Approval, ErrorKind, Execution, ExecutionError, MultisigError, MultisigWallet, Runtime,
    WalletFactory,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Maximum nesting of calls dispatched from wallet transactions
pub const MAX_CALL_DEPTH: usize = 64;

/// Ledger errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error(transparent)]
    Multisig(#[from] MultisigError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error("Contract error: {0}")]
    Contract(#[from] ContractError),
    #[error("Invalid call data: {0}")]
    Abi(#[from] AbiError),
    #[error("Wallet not found: {0}")]
    WalletNotFound(Address),
    #[error("Factory not found: {0}")]
    FactoryNotFound(Address),
    #[error("Invalid amount")]
    InvalidAmount,
    #[error("Unknown method 0x{selector} on {target}")]
    UnknownMethod { target: Address, selector: String },
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Multisig(e) => e.kind(),
            LedgerError::Execution(_) => ErrorKind::ExecutionFailure,
            LedgerError::Contract(ContractError::NotFound(_)) => ErrorKind::NotFound,
            LedgerError::Contract(ContractError::VmError(_)) => ErrorKind::ExecutionFailure,
            LedgerError::Contract(_) => ErrorKind::Validation,
            LedgerError::WalletNotFound(_) | LedgerError::FactoryNotFound(_) => {
                ErrorKind::NotFound
            }
            LedgerError::Abi(_)
            | LedgerError::InvalidAmount
            | LedgerError::UnknownMethod { .. } => ErrorKind::Validation,
        }
    }
}

/// What lives at an address
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    /// Externally owned account: a balance and nothing else
    External,
    Wallet,
    Factory,
    Contract,
}

/// Everything an operation may change
#[derive(Debug, Default, Serialize, Deserialize)]
struct WorldState {
    balances: HashMap<Address, Amount>,
    wallets: HashMap<Address, MultisigWallet>,
    factories: HashMap<Address, WalletFactory>,
    contracts: ContractManager,
    /// Deployment counter per deployer
    nonces: HashMap<Address, u64>,
}

/// The sequential runtime wallets execute on
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Ledger {
    state: WorldState,
    events: Vec<LogEntry>,
    /// Number of committed operations
    sequence: u64,
    /// Events of the running operation
    #[serde(skip)]
    pending: Vec<LogEntry>,
    #[serde(skip)]
    depth: usize,
    /// Prior values of what the running operation changed
    #[serde(skip)]
    journal: Journal,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `op` as one unit: commit its state and events, or none of them
    fn atomically<T>(
        &mut self,
        op: impl FnOnce(&mut Self) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        self.begin();

        match op(self) {
            Ok(value) => {
                self.sequence += 1;
                self.events.append(&mut self.pending);
                self.journal = Journal::default();
                Ok(value)
            }
            Err(e) => {
                log::warn!("Operation rolled back: {}", e);
                self.rollback();
                Err(e)
            }
        }
    }

    fn begin(&mut self) {
        self.journal = Journal::default();
        self.pending.clear();
        self.depth = 0;
    }

    /// Undo every change journaled since [`Ledger::begin`]
    fn rollback(&mut self) {
        let journal = std::mem::take(&mut self.journal);
        log::debug!("Restoring {} journaled entries", journal.len());

        journal.balances.restore_into(&mut self.state.balances);
        journal.wallets.restore_into(&mut self.state.wallets);
        journal.factories.restore_into(&mut self.state.factories);
        journal.nonces.restore_into(&mut self.state.nonces);
        for (address, prior) in journal.contracts.into_entries() {
            self.state.contracts.restore(address, prior);
        }
        self.pending.clear();
    }

    fn emit(&mut self, emitter: Address, event: Event) {
        self.pending.push(LogEntry {
            sequence: self.sequence + 1,
            emitter,
            event,
            timestamp: Utc::now(),
        });
    }

    /// Next free deployment address of `deployer`
    ///
    /// Wallets, factories and contracts deployed by an account, and wallets
    /// created by a factory, all draw from the same per-deployer nonce.
    /// Occupied addresses are skipped.
    fn allocate_address(&mut self, deployer: &Address) -> Address {
        self.journal
            .nonces
            .save(*deployer, self.state.nonces.get(deployer));
        loop {
            let nonce = self.state.nonces.entry(*deployer).or_insert(0);
            let address = Address::derive(deployer, *nonce);
            *nonce += 1;

            if self.kind_of(&address) == AccountKind::External {
                return address;
            }
            log::debug!("Skipping occupied address {} for {}", address, deployer);
        }
    }

    fn credit(&mut self, account: &Address, amount: Amount) -> Result<Amount, ExecutionError> {
        self.journal
            .balances
            .save(*account, self.state.balances.get(account));
        let balance = self.state.balances.entry(*account).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or(ExecutionError::BalanceOverflow(*account))?;
        Ok(*balance)
    }

    fn wallet_mut(&mut self, address: &Address) -> Result<&mut MultisigWallet, LedgerError> {
        self.journal
            .wallets
            .save(*address, self.state.wallets.get(address));
        self.state
            .wallets
            .get_mut(address)
            .ok_or(LedgerError::WalletNotFound(*address))
    }

    fn factory_mut(&mut self, address: &Address) -> Result<&mut WalletFactory, LedgerError> {
        self.journal
            .factories
            .save(*address, self.state.factories.get(address));
        self.state
            .factories
            .get_mut(address)
            .ok_or(LedgerError::FactoryNotFound(*address))
    }

    fn insert_wallet(&mut self, wallet: MultisigWallet) {
        let address = *wallet.address();
        self.journal
            .wallets
            .save(address, self.state.wallets.get(&address));
        self.state.wallets.insert(address, wallet);
    }

    // ===== Top-level operations =====

    /// Mint `amount` into `account`, returning its new balance
    pub fn fund(&mut self, account: &Address, amount: Amount) -> Result<Amount, LedgerError> {
        self.atomically(|ledger| {
            if amount == 0 {
                return Err(LedgerError::InvalidAmount);
            }
            let balance = ledger.credit(account, amount)?;
            ledger.emit(
                *account,
                Event::Funded {
                    account: *account,
                    amount,
                },
            );
            if ledger.state.wallets.contains_key(account) {
                ledger.emit(
                    *account,
                    Event::Deposit {
                        wallet: *account,
                        from: Address::ZERO,
                        amount,
                    },
                );
            }
            log::info!("Funded {} with {}", account, format_amount(amount));
            Ok(balance)
        })
    }

    /// Pay `amount` from one account to another
    pub fn send(&mut self, from: &Address, to: &Address, amount: Amount) -> Result<(), LedgerError> {
        self.atomically(|ledger| {
            if amount == 0 {
                return Err(LedgerError::InvalidAmount);
            }
            ledger.pay(from, to, amount)?;
            Ok(())
        })
    }

    /// Deploy an empty wallet factory
    pub fn deploy_factory(&mut self, deployer: &Address) -> Result<Address, LedgerError> {
        self.atomically(|ledger| {
            let address = ledger.allocate_address(deployer);
            ledger
                .journal
                .factories
                .save(address, ledger.state.factories.get(&address));
            ledger
                .state
                .factories
                .insert(address, WalletFactory::new(address));
            ledger.emit(
                address,
                Event::FactoryDeployed {
                    factory: address,
                    deployer: *deployer,
                },
            );
            log::info!("Factory deployed at {} by {}", address, deployer);
            Ok(address)
        })
    }

    /// Create a wallet through `factory`
    pub fn create_wallet(
        &mut self,
        factory: &Address,
        approvers: Vec<Address>,
        quorum: u32,
        name: &str,
    ) -> Result<Address, LedgerError> {
        self.atomically(|ledger| ledger.exec_create_wallet(factory, approvers, quorum, name))
    }

    /// Deploy a wallet directly, without a factory
    pub fn deploy_wallet(
        &mut self,
        deployer: &Address,
        approvers: Vec<Address>,
        quorum: u32,
        name: &str,
    ) -> Result<Address, LedgerError> {
        self.atomically(|ledger| {
            let address = ledger.allocate_address(deployer);
            let wallet = MultisigWallet::new(address, name, approvers.clone(), quorum)?;
            ledger.insert_wallet(wallet);
            ledger.emit(
                address,
                Event::WalletDeployed {
                    wallet: address,
                    deployer: *deployer,
                    approvers,
                    quorum,
                    name: name.to_string(),
                },
            );
            log::info!("Wallet {} ({}) deployed by {}", address, name, deployer);
            Ok(address)
        })
    }

    pub fn create_transfer(
        &mut self,
        wallet: &Address,
        caller: &Address,
        amount: Amount,
        to: Address,
    ) -> Result<u64, LedgerError> {
        self.atomically(|ledger| ledger.exec_create_transfer(wallet, caller, amount, to))
    }

    pub fn approve_transfer(
        &mut self,
        wallet: &Address,
        caller: &Address,
        id: u64,
    ) -> Result<Approval, LedgerError> {
        self.atomically(|ledger| ledger.exec_approve_transfer(wallet, caller, id))
    }

    pub fn create_transaction(
        &mut self,
        wallet: &Address,
        caller: &Address,
        to: Address,
        data: Payload,
    ) -> Result<Approval, LedgerError> {
        self.atomically(|ledger| ledger.exec_create_transaction(wallet, caller, to, data))
    }

    pub fn approve_transaction(
        &mut self,
        wallet: &Address,
        caller: &Address,
        id: u64,
    ) -> Result<Approval, LedgerError> {
        self.atomically(|ledger| ledger.exec_approve_transaction(wallet, caller, id))
    }

    /// Deploy VM bytecode
    pub fn deploy_contract(
        &mut self,
        deployer: &Address,
        code: Vec<u8>,
    ) -> Result<Address, LedgerError> {
        self.atomically(|ledger| {
            let address = ledger.allocate_address(deployer);
            let sequence = ledger.sequence + 1;
            ledger
                .journal
                .contracts
                .save(address, ledger.state.contracts.get(&address));
            ledger
                .state
                .contracts
                .deploy(address, code, *deployer, sequence)?;
            ledger.emit(
                address,
                Event::ContractDeployed {
                    contract: address,
                    deployer: *deployer,
                },
            );
            Ok(address)
        })
    }

    /// Send `value` and call data to any address, returning the call's output
    pub fn call(
        &mut self,
        caller: &Address,
        to: &Address,
        data: &[u8],
        value: Amount,
    ) -> Result<Vec<u8>, LedgerError> {
        self.atomically(|ledger| {
            if value > 0 {
                ledger.pay(caller, to, value)?;
            }
            ledger.route(caller, to, data)
        })
    }

    /// Run a call and discard every effect it had
    pub fn static_call(
        &mut self,
        caller: &Address,
        to: &Address,
        data: &[u8],
    ) -> Result<Vec<u8>, LedgerError> {
        self.begin();
        let result = self.route(caller, to, data);
        self.rollback();
        result
    }

    // ===== Operation bodies, shared with call dispatch =====

    pub(crate) fn exec_create_wallet(
        &mut self,
        factory: &Address,
        approvers: Vec<Address>,
        quorum: u32,
        name: &str,
    ) -> Result<Address, LedgerError> {
        self.factory(factory)?;
        let address = self.allocate_address(factory);

        let (wallet, created) = self
            .factory_mut(factory)?
            .create_wallet(address, approvers, quorum, name)?;

        self.insert_wallet(wallet);
        self.emit(*factory, Event::WalletCreated(created));
        Ok(address)
    }

    pub(crate) fn exec_create_transfer(
        &mut self,
        wallet: &Address,
        caller: &Address,
        amount: Amount,
        to: Address,
    ) -> Result<u64, LedgerError> {
        let id = self.wallet_mut(wallet)?.create_transfer(caller, amount, to)?;
        self.emit(
            *wallet,
            Event::TransferCreated {
                wallet: *wallet,
                id,
                amount,
                to,
                creator: *caller,
            },
        );
        Ok(id)
    }

    pub(crate) fn exec_approve_transfer(
        &mut self,
        wallet: &Address,
        caller: &Address,
        id: u64,
    ) -> Result<Approval, LedgerError> {
        let approval = self.wallet_mut(wallet)?.approve_transfer(caller, id)?;
        self.emit(
            *wallet,
            Event::TransferApproved {
                wallet: *wallet,
                id,
                approver: *caller,
                approvals: approval.approvals,
            },
        );
        self.perform(wallet, approval.execution.as_ref())?;
        Ok(approval)
    }

    pub(crate) fn exec_create_transaction(
        &mut self,
        wallet: &Address,
        caller: &Address,
        to: Address,
        data: Payload,
    ) -> Result<Approval, LedgerError> {
        let approval = self
            .wallet_mut(wallet)?
            .create_transaction(caller, to, data.clone())?;
        self.emit(
            *wallet,
            Event::TransactionCreated {
                wallet: *wallet,
                id: approval.id,
                to,
                data,
                creator: *caller,
            },
        );
        self.perform(wallet, approval.execution.as_ref())?;
        Ok(approval)
    }

    pub(crate) fn exec_approve_transaction(
        &mut self,
        wallet: &Address,
        caller: &Address,
        id: u64,
    ) -> Result<Approval, LedgerError> {
        let approval = self.wallet_mut(wallet)?.approve_transaction(caller, id)?;
        self.emit(
            *wallet,
            Event::TransactionApproved {
                wallet: *wallet,
                id,
                approver: *caller,
                approvals: approval.approvals,
            },
        );
        self.perform(wallet, approval.execution.as_ref())?;
        Ok(approval)
    }

    /// Carry out the effect of an approval that reached quorum
    fn perform(
        &mut self,
        wallet: &Address,
        execution: Option<&Execution>,
    ) -> Result<(), LedgerError> {
        let Some(execution) = execution else {
            return Ok(());
        };

        let output = execution.perform(wallet, self)?;
        let event = match execution {
            Execution::Payment {
                transfer_id,
                to,
                amount,
            } => {
                log::info!(
                    "Wallet {}: transfer {} sent {} to {}",
                    wallet,
                    transfer_id,
                    format_amount(*amount),
                    to
                );
                Event::TransferSent {
                    wallet: *wallet,
                    id: *transfer_id,
                    to: *to,
                    amount: *amount,
                }
            }
            Execution::Call {
                transaction_id, to, ..
            } => {
                log::info!(
                    "Wallet {}: transaction {} executed on {} ({} bytes returned)",
                    wallet,
                    transaction_id,
                    to,
                    output.len()
                );
                Event::TransactionExecuted {
                    wallet: *wallet,
                    id: *transaction_id,
                    to: *to,
                }
            }
        };
        self.emit(*wallet, event);
        Ok(())
    }

    /// Deliver call data to whatever lives at `to`
    pub(crate) fn route(
        &mut self,
        caller: &Address,
        to: &Address,
        data: &[u8],
    ) -> Result<Vec<u8>, LedgerError> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(ExecutionError::CallDepthExceeded(self.depth).into());
        }

        self.depth += 1;
        log::debug!(
            "Call {} -> {} ({} bytes, depth {})",
            caller,
            to,
            data.len(),
            self.depth
        );
        let result = match self.kind_of(to) {
            AccountKind::External => Ok(Vec::new()),
            AccountKind::Wallet => dispatch::call_wallet(self, caller, to, data),
            AccountKind::Factory => dispatch::call_factory(self, caller, to, data),
            AccountKind::Contract => self.call_contract(caller, to, data),
        };
        self.depth -= 1;
        result
    }

    fn call_contract(
        &mut self,
        caller: &Address,
        contract: &Address,
        data: &[u8],
    ) -> Result<Vec<u8>, LedgerError> {
        let params = CallParams {
            caller: *caller,
            data,
            balance: self.balance(contract),
            sequence: self.sequence + 1,
            gas_limit: None,
        };
        self.journal
            .contracts
            .save(*contract, self.state.contracts.get(contract));
        let result = self.state.contracts.call(contract, params)?;

        for (recipient, amount) in &result.transfers {
            self.pay(contract, recipient, *amount)?;
        }

        Ok(result
            .return_value
            .map(|value| uint_word(value).to_vec())
            .unwrap_or_default())
    }

    // ===== Reads =====

    pub fn kind_of(&self, address: &Address) -> AccountKind {
        if self.state.wallets.contains_key(address) {
            AccountKind::Wallet
        } else if self.state.factories.contains_key(address) {
            AccountKind::Factory
        } else if self.state.contracts.contains(address) {
            AccountKind::Contract
        } else {
            AccountKind::External
        }
    }

    pub fn balance(&self, address: &Address) -> Amount {
        self.state.balances.get(address).copied().unwrap_or(0)
    }

    pub fn wallet(&self, address: &Address) -> Result<&MultisigWallet, LedgerError> {
        self.state
            .wallets
            .get(address)
            .ok_or(LedgerError::WalletNotFound(*address))
    }

    /// All wallets, oldest first
    pub fn wallets(&self) -> Vec<&MultisigWallet> {
        let mut wallets: Vec<_> = self.state.wallets.values().collect();
        wallets.sort_by_key(|w| (w.created_at(), *w.address()));
        wallets
    }

    pub fn factory(&self, address: &Address) -> Result<&WalletFactory, LedgerError> {
        self.state
            .factories
            .get(address)
            .ok_or(LedgerError::FactoryNotFound(*address))
    }

    pub fn factories(&self) -> Vec<&WalletFactory> {
        let mut factories: Vec<_> = self.state.factories.values().collect();
        factories.sort_by_key(|f| *f.address());
        factories
    }

    /// Wallets of `factory` that list `approver`
    pub fn wallets_for_approver(
        &self,
        factory: &Address,
        approver: &Address,
    ) -> Result<&[Address], LedgerError> {
        Ok(self.factory(factory)?.wallets_for_approver(approver))
    }

    pub fn contracts(&self) -> &ContractManager {
        &self.state.contracts
    }

    pub fn events(&self) -> &[LogEntry] {
        &self.events
    }

    /// Events committed after operation `sequence`
    pub fn events_since(&self, sequence: u64) -> &[LogEntry] {
        let start = self.events.partition_point(|e| e.sequence <= sequence);
        &self.events[start..]
    }

    /// Number of committed operations
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl Runtime for Ledger {
    fn pay(&mut self, from: &Address, to: &Address, amount: Amount) -> Result<(), ExecutionError> {
        let available = self.balance(from);
        if available < amount {
            return Err(ExecutionError::InsufficientBalance {
                account: *from,
                available,
                required: amount,
            });
        }

        self.journal
            .balances
            .save(*from, self.state.balances.get(from));
        self.state.balances.insert(*from, available - amount);
        self.credit(to, amount)?;

        self.emit(
            *from,
            Event::Payment {
                from: *from,
                to: *to,
                amount,
            },
        );
        if self.state.wallets.contains_key(to) {
            self.emit(
                *to,
                Event::Deposit {
                    wallet: *to,
                    from: *from,
                    amount,
                },
            );
            log::info!("Wallet {} received {} from {}", to, format_amount(amount), from);
        }
        Ok(())
    }

    fn dispatch(
        &mut self,
        caller: &Address,
        to: &Address,
        data: &[u8],
    ) -> Result<Vec<u8>, ExecutionError> {
        self.route(caller, to, data).map_err(|e| match e {
            LedgerError::Execution(inner) => inner,
            other => ExecutionError::Reverted(other.to_string()),
        })
    }
}
