pub mod sample;
pub mod session;

pub use sample::{Confidence, ConfidenceLevel, PointerSample, RawSample, Viewport};
pub use session::{ChildProfile, PopStat, RoundRecord, RoundResult, Session};
