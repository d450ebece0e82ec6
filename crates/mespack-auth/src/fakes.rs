//! In-memory fakes for the credential seams (testing only)

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use crate::credential::Credential;
use crate::error::CredentialError;
use crate::prompt::Prompter;
use crate::store::DownstreamSync;
use crate::Result;

// ---------------------------------------------------------------------------
// ScriptedPrompter
// ---------------------------------------------------------------------------

/// Answers prompts from a fixed script and records every label asked.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: VecDeque<String>,
    asked: Vec<String>,
}

impl ScriptedPrompter {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            asked: Vec::new(),
        }
    }

    pub fn asked(&self) -> &[String] {
        &self.asked
    }
}

impl Prompter for ScriptedPrompter {
    fn prompt(&mut self, label: &str) -> io::Result<String> {
        self.asked.push(label.to_string());
        self.answers.pop_front().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("no scripted answer for {}", label),
            )
        })
    }
}

// ---------------------------------------------------------------------------
// Sync targets
// ---------------------------------------------------------------------------

/// Sync target that always fails.
#[derive(Debug, Clone)]
pub struct FailingSync {
    name: String,
}

impl FailingSync {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl DownstreamSync for FailingSync {
    fn name(&self) -> &str {
        &self.name
    }

    fn sync(&self, _credentials: &[Credential]) -> Result<()> {
        Err(CredentialError::Sync {
            target: self.name.clone(),
            reason: "target file is read-only".to_string(),
        })
    }
}

/// Sync target that records every credential set it receives. Clones share
/// the same record.
#[derive(Debug, Clone, Default)]
pub struct RecordingSync {
    received: Arc<Mutex<Vec<Vec<Credential>>>>,
}

impl RecordingSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn received(&self) -> Vec<Vec<Credential>> {
        self.received.lock().unwrap().clone()
    }
}

impl DownstreamSync for RecordingSync {
    fn name(&self) -> &str {
        "recording"
    }

    fn sync(&self, credentials: &[Credential]) -> Result<()> {
        self.received.lock().unwrap().push(credentials.to_vec());
        Ok(())
    }
}
