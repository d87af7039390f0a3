//! REST API module
//!
//! Provides HTTP REST API access to the ledger. Callers name themselves in
//! the request body; every successful mutation is persisted and its events
//! are pushed to WebSocket subscribers.
//!
//! # Endpoints
//!
//! ## Accounts
//! - `POST /api/accounts` - Generate an external account
//! - `GET /api/accounts/{address}` - Balance and kind of an address
//! - `POST /api/accounts/{address}/fund` - Mint coins
//! - `POST /api/send` - Pay coins
//!
//! ## Factories
//! - `GET|POST /api/factories` - List or deploy factories
//! - `GET|POST /api/factories/{address}/wallets` - List or create wallets
//! - `GET /api/factories/{address}/approvers/{approver}` - Wallets of an approver
//!
//! ## Wallets
//! - `GET /api/wallets`, `GET /api/wallets/{address}`
//! - `GET|POST /api/wallets/{address}/transfers`
//! - `POST /api/wallets/{address}/transfers/{id}/approve`
//! - `GET|POST /api/wallets/{address}/transactions`
//! - `GET /api/wallets/{address}/transactions/{id}`
//! - `POST /api/wallets/{address}/transactions/{id}/approve`
//!
//! ## Contracts, calls and events
//! - `GET|POST /api/contracts` - List or deploy VM contracts
//! - `POST /api/call` - Call any address
//! - `GET /api/events?since=N` - Committed events
//!
//! ## WebSocket
//! - `GET /ws` - Real-time ledger events

pub mod handlers;
pub mod routes;
pub mod websocket;

pub use handlers::ApiState;
pub use routes::create_router;
pub use websocket::WsBroadcaster;
