//! Port definitions: traits that adapters implement.
//!
//! Ports are the boundaries between the application core and the outside world.
//! They are defined here (in `app`) so that both the use-case layer and the
//! adapter layer can depend on them without creating circular dependencies.

pub mod access;
pub mod automation_repo;
pub mod clock;
pub mod component_repo;
pub mod event_bus;
pub mod execution_repo;
pub mod feed;
pub mod id_generator;
pub mod sun;

pub use access::{AccessPolicy, AllowAll, Operation};
pub use automation_repo::AutomationRepository;
pub use clock::{Clock, ManualClock, SystemClock};
pub use component_repo::{ComponentRepository, ComponentStore, TriggerRepository};
pub use event_bus::EventPublisher;
pub use execution_repo::{AdmissionGuard, ExecutionRepository};
pub use feed::FeedFacade;
pub use id_generator::{IdGenerator, RandomIdGenerator, Sequence};
pub use sun::{FixedSunTimes, SunTimesSource};
