pub mod field;

pub use field::{Target, TargetConfig, TargetField, TargetState};
