//! Processing graph engine.
//!
//! A network is made of elements: steps that compute, triggers that decide
//! when they compute, and groups that package sub-networks. Data lives in
//! shared, individually locked buffers bound to the steps' slots; a wave of
//! trigger signals carries the computation through the graph.
//!
//! # Architecture
//!
//! ```text
//! [LoopedTrigger] ──► [Step: Constant] ──► [Step: Integrator] ──► ...
//!        │                                        ▲
//!        └──────────► [Trigger] ──► [MultiTrigger]┘
//! ```
//!
//! # Design
//!
//! - **Arena**: elements live in one `Vec` indexed by `ElementId`; groups
//!   hold child ids, never the children themselves.
//! - **Ordered locking**: a step locks all its data at once in creation
//!   order, so independently clocked sub-networks sharing data can't deadlock.
//! - **Iterative waves**: each wave is planned (reachable set, feedback
//!   edges, topological order) and executed without recursion.
//! - **One thread per clock**: every looped trigger owns a thread; waves
//!   from different clocks run concurrently.
//! - **Observers off the hot path**: events go out over bounded crossbeam
//!   channels and are dropped rather than block a wave.

pub mod clock;
pub mod connectable;
pub mod data;
pub mod element;
pub mod error;
pub mod events;
pub mod group;
pub mod id;
pub mod kernel;
pub mod lockable;
pub mod looped;
pub mod network;
pub mod nodes;
pub mod registry;
pub mod slot;
pub mod step;
pub mod trigger;
pub mod validity;
pub mod wave;

pub use clock::{Pacing, PeriodicTask, Tick};
pub use connectable::SlotMap;
pub use data::{Data, DataRef};
pub use element::{Element, ElementKind, ElementType};
pub use error::{ComputeError, ConnectionError, GraphError, GraphResult};
pub use events::{EventBus, NetworkEvent, NetworkObserver};
pub use group::Group;
pub use id::{DataId, ElementId, SlotRef};
pub use kernel::{Arguments, FnKernel, Kernel, Outcome, WaveTime};
pub use lockable::{DataReadGuard, DataWriteGuard, LockMode, LockOrderViolation, LockSet};
pub use looped::{LoopMode, LoopStatistics, LoopedTrigger};
pub use network::{Connection, Network};
pub use registry::KernelRegistry;
pub use slot::{DataRole, DataSlot, SlotSpec};
pub use step::{Step, StepState, TriggerOutcome};
pub use trigger::{Listener, Listeners, MultiTrigger, Trigger};
pub use validity::{Validity, ValidityEvent};
pub use wave::WaveReport;
