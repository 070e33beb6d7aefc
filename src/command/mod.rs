pub mod executor;
pub mod outcome;
pub mod payload;
pub mod registry;

pub use outcome::{Failure, FailureKind, Outcome};
pub use payload::{FieldContract, FieldKind, PayloadSchema};
pub use registry::{CommandKind, CommandRegistry, CommandSpec, ResultContract};
