#![forbid(unsafe_code)]

pub mod discord_flow;
pub mod error;
pub mod mutation;
pub mod notify;
pub mod query_cache;
pub mod transport;

pub use error::ApiError;
pub use mutation::{MutationPolicy, MutationRunner, MutationSpec};
pub use notify::{Notice, NoticeLevel, Notifier, RecordingNotifier, TracingNotifier};
pub use query_cache::{QueryCache, QueryPolicy};
pub use transport::{
    ApiRequest, ApiResponse, ApiTransport, ScriptedTransport, TransportConfig, TransportError,
    UreqTransport,
};
