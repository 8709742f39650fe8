pub mod health;
pub mod markets;
pub mod metrics;
pub mod pipeline;
pub mod status;
