//! REST API handlers for wallet operations

use crate::api::websocket::{WsBroadcaster, WsEvent, BROADCAST_CAPACITY};
use crate::contract::{templates, Compiler};
use crate::core::{encode_call_args, format_amount, parse_amount, Address, Amount, Payload};
use crate::ledger::{AccountKind, Ledger, LedgerError, LogEntry};
use crate::multisig::{Approval, ErrorKind, MultisigWallet, Transaction, Transfer, WalletRecord};
use crate::storage::Storage;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared application state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub ledger: Arc<RwLock<Ledger>>,
    pub storage: Arc<Storage>,
    pub ws_broadcaster: Arc<WsBroadcaster>,
}

impl ApiState {
    pub fn new(ledger: Ledger, storage: Storage) -> Self {
        Self {
            ledger: Arc::new(RwLock::new(ledger)),
            storage: Arc::new(storage),
            ws_broadcaster: Arc::new(WsBroadcaster::new(BROADCAST_CAPACITY)),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Serialize, Deserialize, Debug)]
pub struct ApiError {
    pub error: String,
}

type ApiFailure = (StatusCode, Json<ApiError>);
type ApiResult<T> = Result<Json<T>, ApiFailure>;

/// HTTP status for a class of failure
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Authorization => StatusCode::FORBIDDEN,
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::DuplicateApproval | ErrorKind::TerminalState => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::ExecutionFailure => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

fn ledger_error(e: LedgerError) -> ApiFailure {
    (
        status_for(e.kind()),
        Json(ApiError {
            error: e.to_string(),
        }),
    )
}

fn bad_request(message: impl Into<String>) -> ApiFailure {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiError {
            error: message.into(),
        }),
    )
}

fn parse_address(text: &str) -> Result<Address, ApiFailure> {
    text.parse().map_err(|e| bad_request(format!("{}", e)))
}

fn parse_addresses(list: &[String]) -> Result<Vec<Address>, ApiFailure> {
    list.iter().map(|a| parse_address(a)).collect()
}

fn parse_coins(text: &str) -> Result<Amount, ApiFailure> {
    parse_amount(text).map_err(|e| bad_request(e.to_string()))
}

/// Build call data from raw hex or a method signature with textual arguments
fn call_data(
    data: Option<&str>,
    method: Option<&str>,
    args: &[String],
) -> Result<Payload, ApiFailure> {
    match (data, method) {
        (Some(_), Some(_)) => Err(bad_request("Give either data or method, not both")),
        (Some(hex), None) => Payload::from_hex(hex).map_err(|e| bad_request(e.to_string())),
        (None, Some(signature)) => {
            encode_call_args(signature, args).map_err(|e| bad_request(e.to_string()))
        }
        (None, None) => Ok(Payload::default()),
    }
}

/// Persist the ledger and push the events committed after `since`
fn commit(state: &ApiState, ledger: &Ledger, since: u64) {
    if let Err(e) = state.storage.save(ledger) {
        log::error!("Failed to save ledger: {}", e);
    }
    for entry in ledger.events_since(since) {
        state.ws_broadcaster.broadcast(WsEvent::Log(entry.clone()));
    }
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize, Deserialize, Debug)]
pub struct AccountInfo {
    pub address: Address,
    pub kind: AccountKind,
    /// Balance in coins
    pub balance: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct WalletInfo {
    pub address: Address,
    pub name: String,
    pub approvers: Vec<Address>,
    pub quorum: u32,
    pub description: String,
    pub balance: String,
    pub transfer_count: usize,
    pub transaction_count: u64,
    pub created_at: String,
}

impl WalletInfo {
    fn new(wallet: &MultisigWallet, balance: Amount) -> Self {
        Self {
            address: *wallet.address(),
            name: wallet.name().to_string(),
            approvers: wallet.approvers().to_vec(),
            quorum: wallet.quorum(),
            description: wallet.description(),
            balance: format_amount(balance),
            transfer_count: wallet.transfers().len(),
            transaction_count: wallet.transaction_count(),
            created_at: wallet.created_at().to_rfc3339(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct TransferInfo {
    pub id: u64,
    pub amount: String,
    pub to: Address,
    pub approvals: u32,
    pub sent: bool,
}

impl From<&Transfer> for TransferInfo {
    fn from(transfer: &Transfer) -> Self {
        Self {
            id: transfer.id,
            amount: format_amount(transfer.amount),
            to: transfer.to,
            approvals: transfer.approvals(),
            sent: transfer.sent,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct TransactionInfo {
    pub id: u64,
    pub to: Address,
    pub data: Payload,
    pub approvals: u32,
    pub executed: bool,
}

impl From<&Transaction> for TransactionInfo {
    fn from(transaction: &Transaction) -> Self {
        Self {
            id: transaction.id,
            to: transaction.to,
            data: transaction.data.clone(),
            approvals: transaction.approvals(),
            executed: transaction.executed,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ApprovalResponse {
    pub id: u64,
    pub approvals: u32,
    /// Whether this approval reached quorum and executed the proposal
    pub executed: bool,
}

impl From<Approval> for ApprovalResponse {
    fn from(approval: Approval) -> Self {
        Self {
            id: approval.id,
            approvals: approval.approvals,
            executed: approval.execution.is_some(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct FactoryInfo {
    pub address: Address,
    pub wallets: Vec<WalletRecord>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ApproverWallets {
    pub factory: Address,
    pub approver: Address,
    pub wallets: Vec<Address>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ContractInfo {
    pub address: Address,
    pub deployer: Address,
    pub deployed_at: u64,
    pub code_size: usize,
    pub balance: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct DeployResponse {
    pub address: Address,
    pub code_size: usize,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CallResponse {
    pub output: Payload,
}

// ============================================================================
// Request Types
// ============================================================================

#[derive(Deserialize)]
pub struct FundRequest {
    pub amount: String,
}

#[derive(Deserialize)]
pub struct SendRequest {
    pub from: String,
    pub to: String,
    pub amount: String,
}

#[derive(Deserialize)]
pub struct DeployFactoryRequest {
    pub deployer: String,
}

#[derive(Deserialize)]
pub struct CreateWalletRequest {
    pub approvers: Vec<String>,
    pub quorum: u32,
    pub name: String,
}

#[derive(Deserialize)]
pub struct CreateTransferRequest {
    pub caller: String,
    pub amount: String,
    pub to: String,
}

#[derive(Deserialize)]
pub struct ApproveRequest {
    pub caller: String,
}

#[derive(Deserialize)]
pub struct CreateTransactionRequest {
    pub caller: String,
    pub to: String,
    pub data: Option<String>,
    pub method: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Deserialize)]
pub struct DeployContractRequest {
    pub deployer: String,
    pub source: Option<String>,
    pub template: Option<String>,
}

#[derive(Deserialize)]
pub struct CallRequest {
    pub caller: String,
    pub to: String,
    pub data: Option<String>,
    pub method: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    /// Coins sent along with the call
    pub value: Option<String>,
    /// Run without committing anything
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Deserialize)]
pub struct EventsQuery {
    /// Only events committed after this sequence number
    pub since: Option<u64>,
}

// ============================================================================
// Account Handlers
// ============================================================================

/// GET /health - Health check
pub async fn health_check() -> &'static str {
    "OK"
}

/// GET /api/accounts/{address} - Balance and kind of any address
pub async fn get_account(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> ApiResult<AccountInfo> {
    let address = parse_address(&address)?;
    let ledger = state.ledger.read().await;

    Ok(Json(AccountInfo {
        address,
        kind: ledger.kind_of(&address),
        balance: format_amount(ledger.balance(&address)),
    }))
}

/// POST /api/accounts - Generate a fresh external account
pub async fn create_account() -> Json<AccountInfo> {
    Json(AccountInfo {
        address: Address::random(),
        kind: AccountKind::External,
        balance: format_amount(0),
    })
}

/// POST /api/accounts/{address}/fund - Mint coins into an account
pub async fn fund_account(
    State(state): State<ApiState>,
    Path(address): Path<String>,
    Json(req): Json<FundRequest>,
) -> ApiResult<AccountInfo> {
    let address = parse_address(&address)?;
    let amount = parse_coins(&req.amount)?;

    let mut ledger = state.ledger.write().await;
    let since = ledger.sequence();
    let balance = ledger.fund(&address, amount).map_err(ledger_error)?;
    commit(&state, &ledger, since);

    Ok(Json(AccountInfo {
        address,
        kind: ledger.kind_of(&address),
        balance: format_amount(balance),
    }))
}

/// POST /api/send - Pay coins between accounts
pub async fn send(
    State(state): State<ApiState>,
    Json(req): Json<SendRequest>,
) -> ApiResult<AccountInfo> {
    let from = parse_address(&req.from)?;
    let to = parse_address(&req.to)?;
    let amount = parse_coins(&req.amount)?;

    let mut ledger = state.ledger.write().await;
    let since = ledger.sequence();
    ledger.send(&from, &to, amount).map_err(ledger_error)?;
    commit(&state, &ledger, since);

    Ok(Json(AccountInfo {
        address: from,
        kind: ledger.kind_of(&from),
        balance: format_amount(ledger.balance(&from)),
    }))
}

// ============================================================================
// Factory Handlers
// ============================================================================

/// GET /api/factories - List factories
pub async fn list_factories(State(state): State<ApiState>) -> Json<Vec<FactoryInfo>> {
    let ledger = state.ledger.read().await;
    let factories = ledger
        .factories()
        .into_iter()
        .map(|f| FactoryInfo {
            address: *f.address(),
            wallets: f.wallets().to_vec(),
        })
        .collect();
    Json(factories)
}

/// POST /api/factories - Deploy a factory
pub async fn deploy_factory(
    State(state): State<ApiState>,
    Json(req): Json<DeployFactoryRequest>,
) -> ApiResult<FactoryInfo> {
    let deployer = parse_address(&req.deployer)?;

    let mut ledger = state.ledger.write().await;
    let since = ledger.sequence();
    let address = ledger.deploy_factory(&deployer).map_err(ledger_error)?;
    commit(&state, &ledger, since);

    Ok(Json(FactoryInfo {
        address,
        wallets: Vec::new(),
    }))
}

/// GET /api/factories/{address}/wallets - Wallets created by a factory
pub async fn list_factory_wallets(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> ApiResult<FactoryInfo> {
    let address = parse_address(&address)?;
    let ledger = state.ledger.read().await;
    let factory = ledger.factory(&address).map_err(ledger_error)?;

    Ok(Json(FactoryInfo {
        address,
        wallets: factory.wallets().to_vec(),
    }))
}

/// POST /api/factories/{address}/wallets - Create a wallet through a factory
pub async fn create_factory_wallet(
    State(state): State<ApiState>,
    Path(address): Path<String>,
    Json(req): Json<CreateWalletRequest>,
) -> ApiResult<WalletInfo> {
    let factory = parse_address(&address)?;
    let approvers = parse_addresses(&req.approvers)?;

    let mut ledger = state.ledger.write().await;
    let since = ledger.sequence();
    let wallet = ledger
        .create_wallet(&factory, approvers, req.quorum, &req.name)
        .map_err(ledger_error)?;
    commit(&state, &ledger, since);

    let created = ledger.wallet(&wallet).map_err(ledger_error)?;
    Ok(Json(WalletInfo::new(created, ledger.balance(&wallet))))
}

/// GET /api/factories/{address}/approvers/{approver} - Wallets listing an approver
pub async fn wallets_for_approver(
    State(state): State<ApiState>,
    Path((factory, approver)): Path<(String, String)>,
) -> ApiResult<ApproverWallets> {
    let factory = parse_address(&factory)?;
    let approver = parse_address(&approver)?;
    let ledger = state.ledger.read().await;

    let wallets = ledger
        .wallets_for_approver(&factory, &approver)
        .map_err(ledger_error)?;
    Ok(Json(ApproverWallets {
        factory,
        approver,
        wallets: wallets.to_vec(),
    }))
}

// ============================================================================
// Wallet Handlers
// ============================================================================

/// GET /api/wallets - List every wallet
pub async fn list_wallets(State(state): State<ApiState>) -> Json<Vec<WalletInfo>> {
    let ledger = state.ledger.read().await;
    let wallets = ledger
        .wallets()
        .into_iter()
        .map(|w| WalletInfo::new(w, ledger.balance(w.address())))
        .collect();
    Json(wallets)
}

/// GET /api/wallets/{address} - Wallet details
pub async fn get_wallet(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> ApiResult<WalletInfo> {
    let address = parse_address(&address)?;
    let ledger = state.ledger.read().await;
    let wallet = ledger.wallet(&address).map_err(ledger_error)?;
    Ok(Json(WalletInfo::new(wallet, ledger.balance(&address))))
}

/// GET /api/wallets/{address}/transfers - List transfers
pub async fn list_transfers(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> ApiResult<Vec<TransferInfo>> {
    let address = parse_address(&address)?;
    let ledger = state.ledger.read().await;
    let wallet = ledger.wallet(&address).map_err(ledger_error)?;
    Ok(Json(wallet.transfers().iter().map(TransferInfo::from).collect()))
}

/// POST /api/wallets/{address}/transfers - Propose a transfer
pub async fn create_transfer(
    State(state): State<ApiState>,
    Path(address): Path<String>,
    Json(req): Json<CreateTransferRequest>,
) -> ApiResult<TransferInfo> {
    let wallet = parse_address(&address)?;
    let caller = parse_address(&req.caller)?;
    let to = parse_address(&req.to)?;
    let amount = parse_coins(&req.amount)?;

    let mut ledger = state.ledger.write().await;
    let since = ledger.sequence();
    let id = ledger
        .create_transfer(&wallet, &caller, amount, to)
        .map_err(ledger_error)?;
    commit(&state, &ledger, since);

    let transfer = ledger
        .wallet(&wallet)
        .and_then(|w| w.transfer(id).map_err(LedgerError::from))
        .map_err(ledger_error)?;
    Ok(Json(TransferInfo::from(transfer)))
}

/// POST /api/wallets/{address}/transfers/{id}/approve - Approve a transfer
pub async fn approve_transfer(
    State(state): State<ApiState>,
    Path((address, id)): Path<(String, u64)>,
    Json(req): Json<ApproveRequest>,
) -> ApiResult<ApprovalResponse> {
    let wallet = parse_address(&address)?;
    let caller = parse_address(&req.caller)?;

    let mut ledger = state.ledger.write().await;
    let since = ledger.sequence();
    let approval = ledger
        .approve_transfer(&wallet, &caller, id)
        .map_err(ledger_error)?;
    commit(&state, &ledger, since);

    Ok(Json(approval.into()))
}

/// GET /api/wallets/{address}/transactions - List transactions
pub async fn list_transactions(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> ApiResult<Vec<TransactionInfo>> {
    let address = parse_address(&address)?;
    let ledger = state.ledger.read().await;
    let wallet = ledger.wallet(&address).map_err(ledger_error)?;
    Ok(Json(
        wallet
            .transactions()
            .iter()
            .map(TransactionInfo::from)
            .collect(),
    ))
}

/// GET /api/wallets/{address}/transactions/{id} - Transaction details
pub async fn get_transaction(
    State(state): State<ApiState>,
    Path((address, id)): Path<(String, u64)>,
) -> ApiResult<TransactionInfo> {
    let address = parse_address(&address)?;
    let ledger = state.ledger.read().await;
    let transaction = ledger
        .wallet(&address)
        .and_then(|w| w.transaction(id).map_err(LedgerError::from))
        .map_err(ledger_error)?;
    Ok(Json(TransactionInfo::from(transaction)))
}

/// POST /api/wallets/{address}/transactions - Propose a call
pub async fn create_transaction(
    State(state): State<ApiState>,
    Path(address): Path<String>,
    Json(req): Json<CreateTransactionRequest>,
) -> ApiResult<ApprovalResponse> {
    let wallet = parse_address(&address)?;
    let caller = parse_address(&req.caller)?;
    let to = parse_address(&req.to)?;
    let data = call_data(req.data.as_deref(), req.method.as_deref(), &req.args)?;

    let mut ledger = state.ledger.write().await;
    let since = ledger.sequence();
    let approval = ledger
        .create_transaction(&wallet, &caller, to, data)
        .map_err(ledger_error)?;
    commit(&state, &ledger, since);

    Ok(Json(approval.into()))
}

/// POST /api/wallets/{address}/transactions/{id}/approve - Approve a transaction
pub async fn approve_transaction(
    State(state): State<ApiState>,
    Path((address, id)): Path<(String, u64)>,
    Json(req): Json<ApproveRequest>,
) -> ApiResult<ApprovalResponse> {
    let wallet = parse_address(&address)?;
    let caller = parse_address(&req.caller)?;

    let mut ledger = state.ledger.write().await;
    let since = ledger.sequence();
    let approval = ledger
        .approve_transaction(&wallet, &caller, id)
        .map_err(ledger_error)?;
    commit(&state, &ledger, since);

    Ok(Json(approval.into()))
}

// ============================================================================
// Contract Handlers
// ============================================================================

/// GET /api/contracts - List all contracts
pub async fn list_contracts(State(state): State<ApiState>) -> Json<Vec<ContractInfo>> {
    let ledger = state.ledger.read().await;
    let manager = ledger.contracts();
    let contracts = manager
        .list()
        .iter()
        .filter_map(|addr| {
            manager.get(addr).map(|c| ContractInfo {
                address: c.address,
                deployer: c.deployer,
                deployed_at: c.deployed_at,
                code_size: c.code.len(),
                balance: format_amount(ledger.balance(addr)),
            })
        })
        .collect();
    Json(contracts)
}

/// POST /api/contracts - Compile and deploy a contract from source or a template
pub async fn deploy_contract(
    State(state): State<ApiState>,
    Json(req): Json<DeployContractRequest>,
) -> ApiResult<DeployResponse> {
    let deployer = parse_address(&req.deployer)?;
    let source = match (req.source.as_deref(), req.template.as_deref()) {
        (Some(source), None) => source,
        (None, Some(name)) => templates::source(name)
            .ok_or_else(|| bad_request(format!("Unknown template: {}", name)))?,
        _ => return Err(bad_request("Give either source or template")),
    };

    let bytecode = Compiler::new()
        .compile(source)
        .map_err(|e| bad_request(format!("Compilation failed: {}", e)))?;
    let code_size = bytecode.len();

    let mut ledger = state.ledger.write().await;
    let since = ledger.sequence();
    let address = ledger
        .deploy_contract(&deployer, bytecode)
        .map_err(ledger_error)?;
    commit(&state, &ledger, since);

    Ok(Json(DeployResponse { address, code_size }))
}

/// POST /api/call - Send call data (and optionally coins) to any address
pub async fn call(
    State(state): State<ApiState>,
    Json(req): Json<CallRequest>,
) -> ApiResult<CallResponse> {
    let caller = parse_address(&req.caller)?;
    let to = parse_address(&req.to)?;
    let data = call_data(req.data.as_deref(), req.method.as_deref(), &req.args)?;
    let value = match req.value.as_deref() {
        Some(text) => parse_coins(text)?,
        None => 0,
    };

    let mut ledger = state.ledger.write().await;
    let output = if req.dry_run {
        if value > 0 {
            return Err(bad_request("A dry run cannot carry value"));
        }
        ledger
            .static_call(&caller, &to, data.as_bytes())
            .map_err(ledger_error)?
    } else {
        let since = ledger.sequence();
        let output = ledger
            .call(&caller, &to, data.as_bytes(), value)
            .map_err(ledger_error)?;
        commit(&state, &ledger, since);
        output
    };

    Ok(Json(CallResponse {
        output: Payload::new(output),
    }))
}

/// GET /api/events - Committed events, optionally after a sequence number
pub async fn list_events(
    State(state): State<ApiState>,
    Query(query): Query<EventsQuery>,
) -> Json<Vec<LogEntry>> {
    let ledger = state.ledger.read().await;
    let events = match query.since {
        Some(since) => ledger.events_since(since),
        None => ledger.events(),
    };
    Json(events.to_vec())
}
