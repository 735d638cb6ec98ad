// Library root: client-side write path for hub datastores.

pub mod card;
pub mod config;
pub mod protocol;
pub mod submitter;

pub use card::{CardCommand, CardEvent, CardState, DatastoreCard};
pub use config::{ClientConfig, ConfigError};
pub use protocol::{Format, RequestError, SubmissionOutcome, SubmissionRequest, ValueError};
pub use submitter::{HttpTransport, Transport, TransportFailure, ValueSubmitter};
