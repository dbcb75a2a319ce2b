pub mod approvals;
pub mod check;
pub mod directory;
pub mod evaluate;
pub mod recording;
pub mod sweep;
pub mod utils;
