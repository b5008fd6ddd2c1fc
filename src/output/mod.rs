mod progress;
mod reports;
mod styling;
mod tables;

pub use progress::Spinner;
pub use reports::{print_health, print_pipelines, print_providers};
pub use styling::{dim, magenta_bold};

/// Prints the `cilens-sync` banner to stderr.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("🔄 cilens-sync"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("CI/CD provider sync")
    );
}
