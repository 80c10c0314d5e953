//! Port traits for the facteur command bridge.
//!
//! Every seam between the application services and the outside world is an
//! async trait defined here: the partitioned log, the session store, the
//! cluster workflow API and the dispatcher itself. Adapters implement them;
//! tests substitute in-memory fakes.

pub mod dispatcher;
pub mod message_bus;
pub mod runner;
pub mod session;
pub mod workflow_api;

pub use dispatcher::Dispatcher;
pub use message_bus::{BusError, Header, Message, MessageReader, MessageWriter};
pub use runner::Runner;
pub use session::{dispatch_key, SessionError, SessionStore};
pub use workflow_api::{Clock, SystemClock, WorkflowApi};
