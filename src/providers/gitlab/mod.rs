mod client;
mod provider;
mod types;

#[cfg(test)]
mod tests;

pub use client::api_base_url;
pub use provider::{combined_status, GitLabProvider};
pub use types::parse_gitlab_datetime;
