pub mod market;
pub mod price_history;

pub use market::{MarketPredicate, MarketRecord, MarketStats, NormalizedMarket, StoreSummary};
pub use price_history::PriceHistoryEntry;
