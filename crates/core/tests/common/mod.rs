//! Shared test doubles for the core integration tests.

#![allow(dead_code)]

mod fixed_engine;
mod scripted_gateway;

pub use fixed_engine::FixedEngine;
pub use scripted_gateway::ScriptedGateway;

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use multimerge_core::errors::HandoffError;
use multimerge_core::events::MergeEvent;
use multimerge_core::merge::ConflictHandoff;
use tokio::sync::mpsc::UnboundedReceiver;

/// Hand-off that records every request.
#[derive(Default)]
pub struct RecordingHandoff {
    requests: Mutex<Vec<(PathBuf, Vec<String>)>>,
}

impl RecordingHandoff {
    pub fn requests(&self) -> Vec<(PathBuf, Vec<String>)> {
        self.requests.lock().unwrap().clone()
    }
}

impl ConflictHandoff for RecordingHandoff {
    fn request_resolution(&self, root: &Path, paths: &[String]) -> Result<(), HandoffError> {
        self.requests
            .lock()
            .unwrap()
            .push((root.to_path_buf(), paths.to_vec()));
        Ok(())
    }
}

/// Everything currently buffered on the event channel.
pub fn drain(rx: &mut UnboundedReceiver<MergeEvent>) -> Vec<MergeEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// A scratch directory standing in for a working-tree root.
pub fn scratch_repo(parent: &Path, name: &str) -> PathBuf {
    let root = parent.join(name);
    std::fs::create_dir_all(&root).unwrap();
    root
}
