pub mod resilient_types;
pub mod upstream;

pub use upstream::UpstreamClient;
