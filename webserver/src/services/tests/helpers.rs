//! Test helpers for webserver service tests

use crate::config::BroadcasterConfig;
use crate::services::{ConnectionHandle, StreamBroadcaster};
use chrono::Utc;
use shared::{SpectrumFrame, SweepEvent};
use std::sync::Arc;

pub fn broadcaster() -> Arc<StreamBroadcaster> {
    StreamBroadcaster::new(BroadcasterConfig::default())
}

pub fn broadcaster_with_queue(queue_capacity: usize) -> Arc<StreamBroadcaster> {
    StreamBroadcaster::new(BroadcasterConfig {
        queue_capacity,
        ..BroadcasterConfig::default()
    })
}

pub fn frame(data: &str) -> SweepEvent {
    SweepEvent::SpectrumData(SpectrumFrame {
        data: data.to_string(),
        frequency: None,
        received_at: Utc::now(),
    })
}

/// Everything currently queued on the handle
pub fn drain(handle: &mut ConnectionHandle) -> Vec<SweepEvent> {
    let mut events = Vec::new();
    while let Some(event) = handle.try_recv() {
        events.push(event);
    }
    events
}

pub fn frame_data(events: &[SweepEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            SweepEvent::SpectrumData(frame) => Some(frame.data.clone()),
            _ => None,
        })
        .collect()
}
