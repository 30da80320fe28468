//! # fieldnet: processing-graph execution engine
//!
//! Runs networks of computation steps over shared data buffers, as used by
//! recurrent dynamic-field architectures. Steps are wired by data
//! connections and by trigger connections; periodic clocks drive waves of
//! computation through the network on their own threads.
//!
//! ## Architecture
//!
//! - **Data**: lockable shared buffers, locked all at once in creation order
//! - **Steps**: kernels with declared input/output/buffer slots and a validity state
//! - **Triggers**: pass-through, join (N parents) and looped (clock) triggers
//! - **Groups**: sub-networks that promote inner slots to their own boundary
//! - **Communication**: crossbeam channels for observer events
//!
//! ## Configuration
//!
//! Engine settings are stored in the platform config directory under
//! `fieldnet/settings.toml`; network topologies are saved and loaded as JSON
//! or TOML through [`config::NetworkConfig`].
//!
//! ## Example
//!
//! ```ignore
//! use fieldnet::{graph::nodes::{Constant, Integrator}, LoopMode, Network, SlotRef};
//! use std::time::Duration;
//!
//! let net = Network::new();
//! let rate = net.add_step("rate", Constant::new(1.0))?;
//! let state = net.add_step("state", Integrator::new(0.0))?;
//! let clock = net.add_looped_trigger("clock", Duration::from_millis(10), LoopMode::RealTime)?;
//!
//! net.connect(SlotRef::output(rate, "out"), SlotRef::input(state, "rate"))?;
//! net.connect_trigger(clock, rate)?;
//!
//! net.start(clock)?;
//! std::thread::sleep(Duration::from_secs(1));
//! net.stop(clock)?;
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod types;

// Re-export commonly used types
pub use config::{EngineSettings, NetworkConfig};
pub use error::{FieldNetError, Result, ResultExt};
pub use graph::{
    DataRole, ElementId, GraphError, GraphResult, Kernel, KernelRegistry, LoopMode, Network,
    NetworkEvent, SlotRef, Validity,
};
pub use types::{Buffer, DataKind, Matrix};
