use std::{collections::BTreeSet, sync::Arc};

use rand::{rngs::OsRng, RngCore};

use super::{IdentityRecord, SharedIdentityEntry};
use crate::{
    crypto::CryptoProvider,
    storage::{shared_identity_key, StorageBroker, StoragePartition, IDENTITY_RECORD_KEY},
    utils::now_millis,
};

const IDENTIFIER_BYTES: usize = 16;

/// Classification of the current process start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum, strum::Display)]
pub enum LaunchType {
    /// The local identifier was reused.
    Normal,
    /// No identifier existed anywhere; a new one was generated.
    First,
    /// Local storage was empty and the identifier was recovered from a shared partition.
    Reinstall,
    /// Local and shared storage disagree, or shared partitions disagree with each other.
    Tampered,
}

/// What kind of ambiguity the resolver ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ConflictKind {
    /// Local storage was empty and exactly one shared identifier was found.
    RecoveredFromShared,
    /// The local identifier differs from the authoritative shared one.
    LocalDisagreesWithShared,
    /// Local storage was empty and shared partitions hold different identifiers.
    ConflictingSharedValues,
}

/// Details of a reinstall or tamper classification. Reported as telemetry, never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityConflict {
    /// What happened.
    pub kind: ConflictKind,
    /// The identifier found in local storage, if any.
    pub local: Option<String>,
    /// The identifier in use after resolution.
    pub adopted: String,
    /// Distinct identifiers found across shared partitions.
    pub candidates: usize,
}

/// Outcome of [`IdentityResolver::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// The identity in use for this process.
    pub record: IdentityRecord,
    /// How the launch was classified.
    pub launch_type: LaunchType,
    /// Set for reinstall and tamper classifications.
    pub conflict: Option<IdentityConflict>,
    /// Identifier displaced from the own shared partition during this resolution.
    pub changed_from: Option<String>,
}

struct Candidate {
    identifier: String,
    written_at: u64,
}

/// Picks the greatest `written_at`, then the lexicographically greatest identifier.
fn authoritative(candidates: &[Candidate]) -> Option<&Candidate> {
    candidates.iter().max_by(|a, b| {
        a.written_at
            .cmp(&b.written_at)
            .then_with(|| a.identifier.cmp(&b.identifier))
    })
}

/// Resolves the device identifier from the private and shared partitions.
pub struct IdentityResolver {
    broker: Arc<StorageBroker>,
    crypto: Arc<dyn CryptoProvider>,
    organization_id: String,
}

impl IdentityResolver {
    /// Creates a resolver for `organization_id`.
    #[must_use]
    pub fn new(
        broker: Arc<StorageBroker>,
        crypto: Arc<dyn CryptoProvider>,
        organization_id: impl Into<String>,
    ) -> Self {
        Self {
            broker,
            crypto,
            organization_id: organization_id.into(),
        }
    }

    /// Resolves the identity at the current time.
    #[must_use]
    pub fn resolve(&self) -> Resolution {
        self.resolve_at(now_millis())
    }

    /// Resolves the identity, stamping shared entries written now with `now`.
    ///
    /// Storage failures never abort resolution: unreadable partitions count as empty and
    /// failed writes are logged.
    #[must_use]
    pub fn resolve_at(&self, now: u64) -> Resolution {
        let stored = self.load_local();
        let own_entry = self.read_entry(self.broker.shared());

        let mut candidates: Vec<Candidate> = own_entry
            .iter()
            .map(|entry| Candidate {
                identifier: entry.identifier.clone(),
                written_at: entry.written_at,
            })
            .collect();
        for partition in self.broker.list_other_stores() {
            if let Some(entry) = self.read_entry(&partition) {
                candidates.push(Candidate {
                    identifier: entry.identifier,
                    written_at: entry.written_at,
                });
            }
        }
        let distinct = candidates
            .iter()
            .map(|candidate| candidate.identifier.as_str())
            .collect::<BTreeSet<_>>()
            .len();
        let winner = authoritative(&candidates).map(|candidate| candidate.identifier.clone());

        let local = stored.clone().map(|mut record| {
            if record.organization_id() != self.organization_id {
                log::info!(
                    "identity record belongs to organization {}, re-stamping for {}",
                    record.organization_id(),
                    self.organization_id
                );
                record.set_organization_id(&self.organization_id);
            }
            record
        });

        let (mut record, launch_type, conflict) = match (local, winner) {
            (Some(local), None) => (local, LaunchType::Normal, None),
            (Some(local), Some(winner)) if local.identifier() == winner => {
                (local, LaunchType::Normal, None)
            }
            (Some(local), Some(winner)) => {
                // A restored or cloned private partition. Keep it and leave shared data alone.
                let conflict = IdentityConflict {
                    kind: ConflictKind::LocalDisagreesWithShared,
                    local: Some(local.identifier().to_string()),
                    adopted: local.identifier().to_string(),
                    candidates: distinct,
                };
                log::warn!(
                    "local identifier disagrees with shared identifier {winner}, keeping local"
                );
                return Resolution {
                    record: local,
                    launch_type: LaunchType::Tampered,
                    conflict: Some(conflict),
                    changed_from: None,
                };
            }
            (None, None) => (
                IdentityRecord::new(&self.organization_id, self.generate_identifier()),
                LaunchType::First,
                None,
            ),
            (None, Some(winner)) => {
                let (launch_type, kind) = if distinct == 1 {
                    (LaunchType::Reinstall, ConflictKind::RecoveredFromShared)
                } else {
                    (LaunchType::Tampered, ConflictKind::ConflictingSharedValues)
                };
                let conflict = IdentityConflict {
                    kind,
                    local: None,
                    adopted: winner.clone(),
                    candidates: distinct,
                };
                (
                    IdentityRecord::new(&self.organization_id, winner),
                    launch_type,
                    Some(conflict),
                )
            }
        };

        let changed_from = match own_entry {
            Some(entry) if entry.identifier == record.identifier() => None,
            previous => {
                self.write_entry(record.identifier(), now);
                previous.map(|entry| entry.identifier)
            }
        };
        if let Some(previous) = &changed_from {
            record.set_previous_identifier(previous.clone());
        }
        if stored.as_ref() != Some(&record) {
            self.store_local(&record);
        }

        match &conflict {
            Some(conflict) => log::warn!(
                "launch classified as {launch_type}: {} across {} shared identifier(s)",
                conflict.kind,
                conflict.candidates
            ),
            None => log::info!("launch classified as {launch_type}"),
        }

        Resolution {
            record,
            launch_type,
            conflict,
            changed_from,
        }
    }

    fn generate_identifier(&self) -> String {
        let mut bytes = [0u8; IDENTIFIER_BYTES];
        OsRng.fill_bytes(&mut bytes);
        self.crypto.base64_encode(bytes.to_vec())
    }

    fn load_local(&self) -> Option<IdentityRecord> {
        match self.broker.read(self.broker.private(), IDENTITY_RECORD_KEY) {
            Ok(Some(bytes)) => match IdentityRecord::from_bytes(&bytes) {
                Ok(record) => Some(record),
                Err(err) => {
                    log::warn!("discarding unreadable identity record: {err}");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                log::warn!("failed to read identity record: {err}");
                None
            }
        }
    }

    fn store_local(&self, record: &IdentityRecord) {
        let result = record
            .to_bytes()
            .and_then(|bytes| self.broker.write(self.broker.private(), IDENTITY_RECORD_KEY, &bytes));
        if let Err(err) = result {
            log::error!("failed to persist identity record: {err}");
        }
    }

    /// Reads the entry for our organization from `partition`, skipping anything unreadable.
    fn read_entry(&self, partition: &StoragePartition) -> Option<SharedIdentityEntry> {
        let key = shared_identity_key(&self.organization_id);
        let bytes = match self.broker.read(partition, &key) {
            Ok(bytes) => bytes?,
            Err(err) => {
                log::debug!("skipping partition {}: {err}", partition.name());
                return None;
            }
        };
        match SharedIdentityEntry::open(&bytes, self.crypto.as_ref()) {
            Ok(entry) if entry.organization_id == self.organization_id => Some(entry),
            Ok(_) => None,
            Err(err) => {
                log::debug!("skipping undecodable entry in {}: {err}", partition.name());
                None
            }
        }
    }

    fn write_entry(&self, identifier: &str, now: u64) {
        let entry = SharedIdentityEntry::new(&self.organization_id, identifier, now);
        let result = entry.seal(self.crypto.as_ref()).and_then(|sealed| {
            self.broker.write(
                self.broker.shared(),
                &shared_identity_key(&self.organization_id),
                &sealed,
            )
        });
        if let Err(err) = result {
            log::error!("failed to mirror identifier into shared partition: {err}");
        }
    }
}
