// SPDX-FileCopyrightText: © 2026 PrivKey LLC
// SPDX-License-Identifier: AGPL-3.0-or-later
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use nostr_sdk::prelude::{Event, EventId, Kind, PublicKey};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::policy::{SignatureObserver, SignatureRecord};
use crate::types::{Method, Request, Response};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    Connect,
    GetPublicKey,
    SignEvent,
    Nip04Encrypt,
    Nip04Decrypt,
    Nip44Encrypt,
    Nip44Decrypt,
    Ping,
}

impl From<Method> for AuditAction {
    fn from(method: Method) -> Self {
        match method {
            Method::Connect => Self::Connect,
            Method::GetPublicKey => Self::GetPublicKey,
            Method::SignEvent => Self::SignEvent,
            Method::Nip04Encrypt => Self::Nip04Encrypt,
            Method::Nip04Decrypt => Self::Nip04Decrypt,
            Method::Nip44Encrypt => Self::Nip44Encrypt,
            Method::Nip44Decrypt => Self::Nip44Decrypt,
            Method::Ping => Self::Ping,
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect => write!(f, "connect"),
            Self::GetPublicKey => write!(f, "get_public_key"),
            Self::SignEvent => write!(f, "sign_event"),
            Self::Nip04Encrypt => write!(f, "nip04_encrypt"),
            Self::Nip04Decrypt => write!(f, "nip04_decrypt"),
            Self::Nip44Encrypt => write!(f, "nip44_encrypt"),
            Self::Nip44Decrypt => write!(f, "nip44_decrypt"),
            Self::Ping => write!(f, "ping"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub app_pubkey: String,
    pub identity: Option<String>,
    pub event_kind: Option<u16>,
    pub event_id: Option<String>,
    pub success: bool,
    pub reason: Option<String>,
}

impl AuditEntry {
    pub fn new(action: AuditAction, app_pubkey: &PublicKey) -> Self {
        Self {
            timestamp: Utc::now(),
            action,
            app_pubkey: app_pubkey.to_hex(),
            identity: None,
            event_kind: None,
            event_id: None,
            success: true,
            reason: None,
        }
    }

    pub fn with_identity(mut self, identity: &PublicKey) -> Self {
        self.identity = Some(identity.to_hex());
        self
    }

    pub fn with_event_kind(mut self, kind: Kind) -> Self {
        self.event_kind = Some(kind.as_u16());
        self
    }

    pub fn with_event_id(mut self, id: EventId) -> Self {
        self.event_id = Some(id.to_hex());
        self
    }

    pub fn with_success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

impl std::fmt::Display for AuditEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = if self.success { "✓" } else { "✗" };
        let app = self.app_pubkey.get(..8).unwrap_or(&self.app_pubkey);

        write!(
            f,
            "[{}] {} {} {}",
            self.timestamp.format("%H:%M:%S"),
            status,
            app,
            self.action
        )?;

        if let Some(kind) = self.event_kind {
            write!(f, " kind:{}", kind)?;
        }

        if let Some(ref reason) = self.reason {
            write!(f, " ({})", reason)?;
        }

        Ok(())
    }
}

type EntryCallback = Arc<dyn Fn(&AuditEntry) + Send + Sync>;

/// Bounded in-memory trail of handled requests, with an optional JSONL
/// file sink.
///
/// Entries carrying an event id are recorded once per action, so a log
/// shared between [`Server::with_audit`](crate::Server::with_audit) and a
/// signature observer keeps a single entry per signature.
pub struct AuditLog {
    entries: Mutex<VecDeque<AuditEntry>>,
    file: Mutex<Option<File>>,
    on_entry: RwLock<Option<EntryCallback>>,
    max_entries: usize,
}

impl AuditLog {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(max_entries.min(1024))),
            file: Mutex::new(None),
            on_entry: RwLock::new(None),
            max_entries,
        }
    }

    pub fn open_file(&self, path: &Path) -> std::io::Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        *self.file.lock() = Some(file);
        Ok(())
    }

    /// Called for every new entry, with no internal lock held.
    pub fn set_callback<F>(&self, callback: F)
    where
        F: Fn(&AuditEntry) + Send + Sync + 'static,
    {
        *self.on_entry.write() = Some(Arc::new(callback));
    }

    pub fn log(&self, entry: AuditEntry) {
        {
            let mut entries = self.entries.lock();
            if entry.event_id.is_some()
                && entries
                    .iter()
                    .any(|e| e.action == entry.action && e.event_id == entry.event_id)
            {
                debug!(action = %entry.action, "audit entry already recorded");
                return;
            }
            entries.push_back(entry.clone());
            while entries.len() > self.max_entries {
                entries.pop_front();
            }
        }

        self.append_to_file(&entry);

        let callback = self.on_entry.read().clone();
        if let Some(callback) = callback {
            callback(&entry);
        }
    }

    fn append_to_file(&self, entry: &AuditEntry) {
        let mut file = self.file.lock();
        let Some(file) = file.as_mut() else {
            return;
        };

        let result = serde_json::to_string(entry)
            .map_err(|e| ("Failed to serialize audit log entry", e.to_string()))
            .and_then(|json| {
                writeln!(file, "{}", json)
                    .map_err(|e| ("Failed to write audit log entry to file", e.to_string()))
            });

        if let Err((msg, e)) = result {
            warn!(error = %e, action = %entry.action, "{}", msg);
        }
    }

    /// Record the outcome of one handled request. Unknown methods are skipped.
    pub fn record_request(&self, remote: &PublicKey, request: &Request, response: &Response) {
        let Ok(method) = request.method.parse::<Method>() else {
            return;
        };
        let mut entry = AuditEntry::new(method.into(), remote).with_success(!response.is_error());
        if response.is_error() {
            entry = entry.with_reason(response.error.clone());
        } else if method == Method::SignEvent {
            if let Ok(event) = serde_json::from_str::<Event>(&response.result) {
                entry = entry.with_event_kind(event.kind).with_event_id(event.id);
            }
        }
        self.log(entry);
    }

    pub fn recent(&self, count: usize) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .iter()
            .rev()
            .take(count)
            .cloned()
            .collect()
    }

    pub fn by_app(&self, pubkey: &PublicKey) -> Vec<AuditEntry> {
        let hex = pubkey.to_hex();
        self.entries
            .lock()
            .iter()
            .filter(|e| e.app_pubkey == hex)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl SignatureObserver for AuditLog {
    fn on_signature(&self, record: &SignatureRecord<'_>) {
        self.log(
            AuditEntry::new(AuditAction::SignEvent, record.remote)
                .with_identity(record.local)
                .with_event_kind(record.event.kind)
                .with_event_id(record.event.id),
        );
    }
}
