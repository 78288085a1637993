pub mod api_football;
pub mod models;
pub mod normalize;
pub mod openligadb;
pub mod provider;
pub mod sportapi;
pub mod status;

pub use api_football::ApiFootball;
pub use openligadb::OpenLigaDb;
pub use provider::{FetchError, ScoreProvider};
pub use sportapi::SportApi7;
pub use status::StatusPolicy;
