//! Drives one opaque agent SDK invocation and shapes its events into the gateway's wire
//! protocol. The concrete SDK is never named here — see [`sdk::AgentSdk`].

mod agent_runner;
mod echo;
mod error;
mod sdk;
mod sink;

pub use agent_runner::{AgentRunner, SingleQueryResponse};
pub use echo::EchoSdk;
pub use error::{ErrorKind, GatewayError};
pub use sdk::{AgentSdk, PermissionMode, SdkRequest, SdkSession};
pub use sink::EventSink;
