pub mod context;
pub mod intent;
pub mod soil;
pub mod weather;
