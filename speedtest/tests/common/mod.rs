#![allow(dead_code)]

use parking_lot::Mutex;
use progress_tracking::ProgressSnapshot;
use speedtest::{PresentationSink, TerminalStatus};

#[derive(Clone, Debug, PartialEq)]
pub enum SinkEvent {
    Progress(ProgressSnapshot),
    Log(String, bool),
    Terminal(TerminalStatus, String),
    ControlsReset,
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().clone()
    }

    pub fn terminal(&self) -> Vec<(TerminalStatus, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::Terminal(status, detail) => Some((status, detail)),
                _ => None,
            })
            .collect()
    }

    pub fn logs(&self) -> Vec<(String, bool)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::Log(message, append) => Some((message, append)),
                _ => None,
            })
            .collect()
    }

    pub fn progress(&self) -> Vec<ProgressSnapshot> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::Progress(snapshot) => Some(snapshot),
                _ => None,
            })
            .collect()
    }
}

impl PresentationSink for RecordingSink {
    fn on_progress(&self, snapshot: ProgressSnapshot) {
        self.events.lock().push(SinkEvent::Progress(snapshot));
    }

    fn on_log(&self, message: &str, append: bool) {
        self.events.lock().push(SinkEvent::Log(message.to_owned(), append));
    }

    fn on_terminal(&self, status: TerminalStatus, detail: &str) {
        self.events.lock().push(SinkEvent::Terminal(status, detail.to_owned()));
    }

    fn on_controls_reset(&self) {
        self.events.lock().push(SinkEvent::ControlsReset);
    }
}
