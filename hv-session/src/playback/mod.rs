//! Playback: the output graph, its level meter, and the scheduler that
//! places decoded audio onto it

pub mod graph;
pub mod meter;
pub mod scheduler;

pub use graph::{OutputGraph, Placement, ScheduledSegment, SegmentId};
pub use meter::LevelMeter;
pub use scheduler::{
    DecodeJob, DecodeOutcome, DrainReport, DroppedChunk, InterruptReport, PlaybackScheduler,
    SchedulerStats,
};
