//! Deploy Ledger
//!
//! Deterministic, resumable and auditable deployment of interdependent units
//! onto a shared execution ledger.
//!
//! ## Features
//!
//! - **Typed Schema**: Every persisted key is declared once with a type
//! - **Resumable Sessions**: Runs append to one history and survive crashes
//! - **Deterministic Placement**: Commit-reveal placement at salt-derived addresses
//! - **Idempotent Proxies**: Re-running a deployment never redeploys or re-initializes
//! - **Ownership Finalization**: Queued units are handed to the final owner in one batch
//!
//! ## Architecture
//!
//! ```text
//! KeyRegistry ──> DataStore ──> DeploymentDocument ──> StoreBackend (memory | json)
//!                     │
//!                 Registrar ──> PlacementProtocol ──> Ledger
//!                     │
//!           DeploymentSession (start / resume / finish)
//! ```
//!
//! ## Persisted layout
//!
//! ```text
//! deployments/
//! ├── mainnet/
//! │   └── bao.json
//! └── sepolia/
//!     └── bao.json
//! ```

pub mod address;
pub mod config;
pub mod entry;
pub mod error;
pub mod hash;
pub mod ledger;
pub mod lifecycle;
pub mod ownership;
pub mod placement;
pub mod registrar;
pub mod registry;
pub mod schema;
pub mod session;
pub mod store;
pub mod value;

pub use address::Address;
pub use config::DeployConfig;
pub use entry::{Category, Entry, EntryKind, Placement};
pub use error::{DeployError, Result};
pub use hash::{derive_salt, Hash32};
pub use ledger::{Artifact, Caller, InitCall, Ledger, MemoryLedger, OwnershipModel};
pub use ownership::OwnershipQueue;
pub use placement::{commitment_hash, OperatorSlot, PermissionProvider, PlacementProtocol};
pub use registrar::{DirectKind, Registrar, RegistrarContext};
pub use registry::KeyRegistry;
pub use schema::{DataType, SchemaKey};
pub use session::{DeploymentSession, SessionOptions, SessionState};
pub use store::{DataStore, DeploymentDocument, JsonFileBackend, MemoryBackend, StoreBackend};
pub use value::{StoreValue, Value};
