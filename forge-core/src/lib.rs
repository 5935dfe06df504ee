//! Real-time bridge between a plugin's audio callback and a remote
//! music-generation service.
//!
//! The audio thread runs a [`RealtimeProcessor`]: it records host input while
//! the transport plays and streams staged results out. Everything else goes
//! through a cloneable [`Bridge`]: jobs run on their own worker thread, their
//! results land in a single-slot mailbox, and the message thread decodes and
//! stages them for playback.

pub mod audio_buffer;
pub mod bridge;
pub mod capture;
pub mod client;
pub mod codec;
pub mod config;
pub mod credential;
pub mod error;
pub mod job;
pub mod library;
pub mod mailbox;
pub mod playback;
pub mod processor;
pub mod segments;
pub mod status;
pub mod suno;

pub use bridge::Bridge;
pub use client::{GenerateParams, GenerationClient, JobKind, Model, TaskStatus};
pub use config::ForgeConfig;
pub use credential::Credential;
pub use error::{ForgeError, Result};
pub use job::JobState;
pub use mailbox::Notify;
pub use processor::{BlockEvents, HostBlock, RealtimeProcessor, WakeFlag};
pub use segments::{RecordedSegment, SegmentStore};
pub use suno::SunoClient;
