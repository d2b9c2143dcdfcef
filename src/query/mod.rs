pub mod check;
pub mod parser;
pub mod predicate;
pub mod request;
pub mod verdict;

pub use check::{Check, Executor, Exporter, Query};
pub use parser::{EvalError, Expression};
pub use predicate::{Evaluation, Evaluator, Rule};
pub use request::{CommandRequest, ExportRequest, ValidationRequest};
pub use verdict::{Outcome, Verdict};
