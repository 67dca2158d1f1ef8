//! Device capability surface for the dome-flat controller.
//!
//! One small trait per device kind (telescope, dome, camera, filter wheel,
//! lamp) plus the remote image store. The sequencer is written against these
//! traits only; concrete backends are injected at construction. Simulated
//! implementations live alongside each trait for bench runs and tests.

mod camera;
mod dome;
mod error;
mod filterwheel;
mod lamp;
mod store;
mod telescope;

pub use camera::*;
pub use dome::*;
pub use error::*;
pub use filterwheel::*;
pub use lamp::*;
pub use store::*;
pub use telescope::*;
