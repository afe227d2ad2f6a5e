pub mod loaders;
pub mod reports;
pub mod storage;

pub use loaders::*;
pub use reports::*;
pub use storage::*;
