pub mod gamma_client;
pub mod types;

pub use gamma_client::{
    FetchError, GammaClient, MarketSource, DEFAULT_FETCH_TIMEOUT, GAMMA_API_BASE,
};
