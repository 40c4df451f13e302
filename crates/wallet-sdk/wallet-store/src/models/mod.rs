pub mod allocation;
pub mod change_output;
pub mod run;

pub use allocation::NewAllocationRow;
pub use change_output::{ChangeOutputRow, NewChangeOutputRow};
pub use run::{GenerationRunRow, NewGenerationRunRow};
