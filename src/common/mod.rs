pub mod types;

pub use types::{BlockId, Lsn, TxnId, END_OF_FILE};
