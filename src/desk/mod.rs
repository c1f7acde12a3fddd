//! Scan desk: the admin-side client that turns QR scans into attendance marks.

pub mod scanner;
pub mod session;

pub use scanner::{AttendanceApi, Cue, IgnoreReason, RosterRow, ScanDesk, ScanOutcome, Toggle};
pub use session::{ApiClient, ClientError, Session};
