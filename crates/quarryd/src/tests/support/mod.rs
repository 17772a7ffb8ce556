//! Test harness utilities shared by the unit and behavioural suites.

mod buffer;
mod context;
mod handlers;
mod probe;
mod provider;
mod reporter;
mod world;

pub use buffer::SharedBuffer;
pub use context::{FIXTURE_UUID, RestFixture};
pub use handlers::{PartitionEvent, RecordingHandlers};
pub use probe::ScriptedProbe;
pub use reporter::HealthEvent;
pub use world::{TestWorld, world};
