mod client;
mod provider;
mod types;


pub use provider::{combined_status, parse_repository, GitHubProvider};
