pub mod clock;
pub mod ledger;
pub mod random;
pub mod retry;

pub use clock::{Clock, FixedClock, SystemClock};
pub use ledger::{LedgerStore, LedgerTx, Row, StoreError};
pub use random::{RandomSource, ScriptedCodes, ThreadRngSource};
pub use retry::{RetryPolicy, RetryableError};
