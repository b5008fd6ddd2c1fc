mod client;
mod provider;
mod types;


pub use client::{job_name_from_url, job_path};
pub use provider::{combined_status, parse_build_id, JenkinsProvider};
