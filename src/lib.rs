//! # raumklang
//!
//! A spatial audio job graph with dependency-ordered block rendering.
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use raumklang::{Job, Root, SoundBuffer};
//!
//! let root = Root::new(48000).unwrap();
//!
//! // A scene with one listener and an 8-channel base bus
//! let env = root.create_environment().unwrap();
//! root.set_output(&env, 0).unwrap();
//!
//! // Fire-and-forget playback two units to the listener's right
//! let click = Arc::new(SoundBuffer::mono(48000, vec![1.0; 32]).unwrap());
//! env.play_async(click, 2.0, 0.0, 0.0, true).unwrap();
//!
//! let block = root.tick().unwrap();
//! assert!(block[1][0] > block[0][0]);
//! ```
//!
//! ## Core Concepts
//!
//! - **[`Root`]** - Owns the graph, the lock and the final output
//! - **[`Node`]** - A processing job running a [`Kernel`]
//! - **[`EnvironmentNode`]** - A 3D scene aggregating [`Source`](nodes::Source) nodes
//! - **[`Job`]** - Operations every job handle shares
//!
//! ## Scheduling
//!
//! Every [`Root::tick`] plans the graph from the root: jobs run after
//! everything they read from, each exactly once, however many paths lead to
//! them. All jobs prepare before any job renders.
//!
//! ## Ownership
//!
//! Jobs live for as long as something holds them: a handle, a connection
//! reading from them, or the root's always-active set. An environment does
//! *not* keep its sources alive; a source keeps its environment alive.
//!
//! ## Features
//!
//! - `cpal_sink` - Enables [`CpalDevice`] for real-time audio output

mod connection;
mod environment;
mod error;
mod graph;
mod job;
mod node;
mod parameter;
mod planner;
mod root;
mod sound;

#[cfg(feature = "cpal_sink")]
mod device;

pub mod nodes;

pub use connection::ConnectionInfo;
pub use environment::{
    look_at, DistanceModel, EffectSendConfiguration, EnvironmentInfo, EnvironmentNode,
    EFFECT_SEND_CHANNELS, MIN_BASE_CHANNELS,
};
pub use error::GraphError;
pub use job::{Job, JobId};
pub use node::{Kernel, KernelState, Node, ProcessContext, RenderContext, Scene};
pub use parameter::{ParamValue, Parameters};
pub use root::{BlockOutput, Root, RootSettings};
pub use sound::SoundBuffer;

#[cfg(feature = "cpal_sink")]
pub use device::{CpalDevice, StreamStatus};

// Re-export dasp_graph's buffer since kernels are written against it
pub use dasp_graph::Buffer;
