//! Observability utilities.

mod emitter;
mod scope;

pub use emitter::{LoggingStepEmitter, NoOpStepEmitter, SpanTimer, StepEmitter};
pub use scope::{run_step, run_step_blocking, StepScope};
