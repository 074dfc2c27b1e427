pub mod controller;
pub mod scheduler;
pub mod state;

pub use controller::GameController;
pub use scheduler::RoundScheduler;
pub use state::{GameConfig, GameEvent, GameSnapshot, PhaseKind, PointerView, TargetView};
