pub mod ledger;
pub mod publisher;
pub mod pvoutput;

pub use ledger::{Ledger, LedgerError};
pub use publisher::{PublishReport, PublishTransport, Publisher, TransportError};
pub use pvoutput::PvOutputClient;
