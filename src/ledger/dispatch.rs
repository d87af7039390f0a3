//! Call data routing for wallets and factories
//!
//! A call's first four bytes select the method; the remaining words are its
//! arguments. Unknown selectors revert. A call without data is a plain
//! payment and succeeds with no output.

use crate::core::abi::{
    decode, encode, param_types, split_call, AbiError, ParamType, Selector, Token,
};
use crate::core::{Address, Payload};
use crate::crypto::selector;
use crate::ledger::state::{Ledger, LedgerError};

/// Methods a wallet answers to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalletMethod {
    Name,
    GetApprovers,
    Quorum,
    TransactionCount,
    TransferCount,
    IsApprover,
    GetTransfer,
    GetTransfers,
    GetTransaction,
    CreateTransfer,
    ApproveTransfer,
    CreateTransaction,
    ApproveTransaction,
}

impl WalletMethod {
    pub const ALL: [WalletMethod; 13] = [
        WalletMethod::Name,
        WalletMethod::GetApprovers,
        WalletMethod::Quorum,
        WalletMethod::TransactionCount,
        WalletMethod::TransferCount,
        WalletMethod::IsApprover,
        WalletMethod::GetTransfer,
        WalletMethod::GetTransfers,
        WalletMethod::GetTransaction,
        WalletMethod::CreateTransfer,
        WalletMethod::ApproveTransfer,
        WalletMethod::CreateTransaction,
        WalletMethod::ApproveTransaction,
    ];

    pub fn signature(&self) -> &'static str {
        match self {
            WalletMethod::Name => "name()",
            WalletMethod::GetApprovers => "getApprovers()",
            WalletMethod::Quorum => "quorum()",
            WalletMethod::TransactionCount => "transactionCount()",
            WalletMethod::TransferCount => "transferCount()",
            WalletMethod::IsApprover => "isApprover(address)",
            WalletMethod::GetTransfer => "getTransfer(uint256)",
            WalletMethod::GetTransfers => "getTransfers()",
            WalletMethod::GetTransaction => "getTransaction(uint256)",
            WalletMethod::CreateTransfer => "createTransfer(uint256,address)",
            WalletMethod::ApproveTransfer => "approveTransfer(uint256)",
            WalletMethod::CreateTransaction => "createTransaction(address,bytes)",
            WalletMethod::ApproveTransaction => "approveTransaction(uint256)",
        }
    }

    /// Types of the encoded output
    pub fn returns(&self) -> &'static [ParamType] {
        match self {
            WalletMethod::Name => &[ParamType::String],
            WalletMethod::GetApprovers => &[ParamType::AddressArray],
            WalletMethod::Quorum
            | WalletMethod::TransactionCount
            | WalletMethod::TransferCount
            | WalletMethod::CreateTransfer
            | WalletMethod::CreateTransaction => &[ParamType::Uint],
            WalletMethod::IsApprover => &[ParamType::Bool],
            WalletMethod::GetTransfer => &[
                ParamType::Uint,
                ParamType::Address,
                ParamType::Uint,
                ParamType::Bool,
            ],
            // One column per field; transfer `i` is the i-th entry of each
            WalletMethod::GetTransfers => &[
                ParamType::UintArray,
                ParamType::AddressArray,
                ParamType::UintArray,
                ParamType::BoolArray,
            ],
            WalletMethod::GetTransaction => &[
                ParamType::Address,
                ParamType::Bytes,
                ParamType::Uint,
                ParamType::Bool,
            ],
            WalletMethod::ApproveTransfer | WalletMethod::ApproveTransaction => &[],
        }
    }

    pub fn from_selector(sel: Selector) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|m| selector(m.signature()) == sel)
    }
}

/// Methods a factory answers to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FactoryMethod {
    CreateWallet,
    GetWalletsForApprover,
    WalletCount,
}

impl FactoryMethod {
    pub const ALL: [FactoryMethod; 3] = [
        FactoryMethod::CreateWallet,
        FactoryMethod::GetWalletsForApprover,
        FactoryMethod::WalletCount,
    ];

    pub fn signature(&self) -> &'static str {
        match self {
            FactoryMethod::CreateWallet => "createWallet(address[],uint256,string)",
            FactoryMethod::GetWalletsForApprover => "getWalletsForApprover(address)",
            FactoryMethod::WalletCount => "walletCount()",
        }
    }

    pub fn returns(&self) -> &'static [ParamType] {
        match self {
            FactoryMethod::CreateWallet => &[ParamType::Address],
            FactoryMethod::GetWalletsForApprover => &[ParamType::AddressArray],
            FactoryMethod::WalletCount => &[ParamType::Uint],
        }
    }

    pub fn from_selector(sel: Selector) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|m| selector(m.signature()) == sel)
    }
}

/// Decode call data against `signature`, returning the arguments in order
fn arguments(signature: &str, body: &[u8]) -> Result<std::vec::IntoIter<Token>, LedgerError> {
    let types = param_types(signature)?;
    Ok(decode(&types, body)?.into_iter())
}

fn next(args: &mut std::vec::IntoIter<Token>) -> Result<Token, LedgerError> {
    args.next().ok_or(LedgerError::Abi(AbiError::UnexpectedEnd(0)))
}

fn next_id(args: &mut std::vec::IntoIter<Token>) -> Result<u64, LedgerError> {
    let raw = next(args)?.into_uint()?;
    u64::try_from(raw).map_err(|_| LedgerError::Abi(AbiError::Overflow))
}

fn unknown(target: &Address, sel: Selector) -> LedgerError {
    LedgerError::UnknownMethod {
        target: *target,
        selector: hex::encode(sel),
    }
}

pub(crate) fn call_wallet(
    ledger: &mut Ledger,
    caller: &Address,
    wallet: &Address,
    data: &[u8],
) -> Result<Vec<u8>, LedgerError> {
    if data.is_empty() {
        return Ok(Vec::new());
    }

    let (sel, body) = split_call(data)?;
    let method = WalletMethod::from_selector(sel).ok_or_else(|| unknown(wallet, sel))?;
    let mut args = arguments(method.signature(), body)?;
    log::debug!("Wallet {}: {} from {}", wallet, method.signature(), caller);

    let output = match method {
        WalletMethod::Name => {
            encode(&[Token::String(ledger.wallet(wallet)?.name().to_string())])
        }
        WalletMethod::GetApprovers => {
            encode(&[Token::AddressArray(ledger.wallet(wallet)?.approvers().to_vec())])
        }
        WalletMethod::Quorum => {
            encode(&[Token::Uint(u128::from(ledger.wallet(wallet)?.quorum()))])
        }
        WalletMethod::TransactionCount => {
            encode(&[Token::Uint(u128::from(ledger.wallet(wallet)?.transaction_count()))])
        }
        WalletMethod::TransferCount => {
            encode(&[Token::Uint(ledger.wallet(wallet)?.transfers().len() as u128)])
        }
        WalletMethod::IsApprover => {
            let identity = next(&mut args)?.into_address()?;
            encode(&[Token::Bool(ledger.wallet(wallet)?.is_approver(&identity))])
        }
        WalletMethod::GetTransfer => {
            let id = next_id(&mut args)?;
            let transfer = ledger.wallet(wallet)?.transfer(id)?;
            encode(&[
                Token::Uint(transfer.amount),
                Token::Address(transfer.to),
                Token::Uint(u128::from(transfer.approvals())),
                Token::Bool(transfer.sent),
            ])
        }
        WalletMethod::GetTransfers => {
            let transfers = ledger.wallet(wallet)?.transfers();
            encode(&[
                Token::UintArray(transfers.iter().map(|t| t.amount).collect()),
                Token::AddressArray(transfers.iter().map(|t| t.to).collect()),
                Token::UintArray(transfers.iter().map(|t| u128::from(t.approvals())).collect()),
                Token::BoolArray(transfers.iter().map(|t| t.sent).collect()),
            ])
        }
        WalletMethod::GetTransaction => {
            let id = next_id(&mut args)?;
            let transaction = ledger.wallet(wallet)?.transaction(id)?;
            encode(&[
                Token::Address(transaction.to),
                Token::Bytes(transaction.data.as_bytes().to_vec()),
                Token::Uint(u128::from(transaction.approvals())),
                Token::Bool(transaction.executed),
            ])
        }
        WalletMethod::CreateTransfer => {
            let amount = next(&mut args)?.into_uint()?;
            let to = next(&mut args)?.into_address()?;
            let id = ledger.exec_create_transfer(wallet, caller, amount, to)?;
            encode(&[Token::Uint(u128::from(id))])
        }
        WalletMethod::ApproveTransfer => {
            let id = next_id(&mut args)?;
            ledger.exec_approve_transfer(wallet, caller, id)?;
            Vec::new()
        }
        WalletMethod::CreateTransaction => {
            let to = next(&mut args)?.into_address()?;
            let data = next(&mut args)?.into_bytes()?;
            let approval = ledger.exec_create_transaction(wallet, caller, to, Payload::new(data))?;
            encode(&[Token::Uint(u128::from(approval.id))])
        }
        WalletMethod::ApproveTransaction => {
            let id = next_id(&mut args)?;
            ledger.exec_approve_transaction(wallet, caller, id)?;
            Vec::new()
        }
    };

    Ok(output)
}

pub(crate) fn call_factory(
    ledger: &mut Ledger,
    caller: &Address,
    factory: &Address,
    data: &[u8],
) -> Result<Vec<u8>, LedgerError> {
    if data.is_empty() {
        return Ok(Vec::new());
    }

    let (sel, body) = split_call(data)?;
    let method = FactoryMethod::from_selector(sel).ok_or_else(|| unknown(factory, sel))?;
    let mut args = arguments(method.signature(), body)?;
    log::debug!("Factory {}: {} from {}", factory, method.signature(), caller);

    let output = match method {
        FactoryMethod::CreateWallet => {
            let approvers = next(&mut args)?.into_address_array()?;
            // Out-of-range quorums fail validation like any other bad quorum
            let quorum = u32::try_from(next(&mut args)?.into_uint()?).unwrap_or(u32::MAX);
            let name = next(&mut args)?.into_string()?;
            let wallet = ledger.exec_create_wallet(factory, approvers, quorum, &name)?;
            encode(&[Token::Address(wallet)])
        }
        FactoryMethod::GetWalletsForApprover => {
            let approver = next(&mut args)?.into_address()?;
            let wallets = ledger.wallets_for_approver(factory, &approver)?;
            encode(&[Token::AddressArray(wallets.to_vec())])
        }
        FactoryMethod::WalletCount => {
            encode(&[Token::Uint(ledger.factory(factory)?.wallet_count() as u128)])
        }
    };

    Ok(output)
}
