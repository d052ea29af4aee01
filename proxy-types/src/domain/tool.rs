use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool definition, carried opaquely from the client dialect to Dialect-R.
/// The proxy does not interpret or execute tools; it only transports them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tool {
    #[serde(flatten)]
    pub raw: Value,
}
