//! telegrab: a chat bot that fetches media and files for users.
//!
//! Core subsystem is the job supervision and progress aggregation engine:
//! `runner` executes blocking retrievals on a bounded pool, `progress`
//! aggregates callbacks into rate-limited status renders, and `supervisor`
//! ties one job together with timeout, size policy and guaranteed cleanup.

pub mod context;
pub mod fetch;
pub mod job;
pub mod progress;
pub mod runner;
pub mod selection;
pub mod supervisor;
pub mod telegram;
pub mod ytdlp;
