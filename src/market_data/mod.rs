pub mod orderbook;

pub use orderbook::L2SnapshotProvider;
