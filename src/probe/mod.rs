pub mod auth;
pub mod executor;
pub mod types;

pub use auth::AuthBroker;
pub use executor::{HttpTransport, ProbeExecutor, ReqwestTransport};
pub use types::{HttpMethod, NamedProbe, Target};
