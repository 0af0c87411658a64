//! Id generation port.

use homerule_domain::id::ExecutionId;

/// Which kind of record an identifier is drawn for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sequence {
    Automation,
    Trigger,
    Condition,
    Action,
    Execution,
}

/// Hands out fresh identifiers.
pub trait IdGenerator: Send + Sync {
    fn next(&self, sequence: Sequence) -> uuid::Uuid;

    fn next_execution_id(&self) -> ExecutionId {
        ExecutionId::from_uuid(self.next(Sequence::Execution))
    }
}

/// Random v4 UUIDs regardless of sequence.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn next(&self, _sequence: Sequence) -> uuid::Uuid {
        uuid::Uuid::new_v4()
    }
}
