//! Mock filesystem for testing collectors without real `/proc`.

mod filesystem;
mod scenarios;

pub use filesystem::MockFs;
pub use scenarios::{MOCK_BTIME, MockProcess};
