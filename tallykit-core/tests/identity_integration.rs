//! Integration tests for identity handling.

use std::sync::Arc;

use tallykit_core::{
    crypto::DefaultCrypto,
    identity::{ConflictKind, IdentityResolver, LaunchType, Resolution, SharedIdentityEntry},
    storage::{
        file::FileStorageProvider,
        memory::{MemorySharedMedium, MemoryStorageProvider},
        shared_identity_key, KeyValueStore, SharedStorageProvider, StorageBroker, StoragePaths,
    },
};

const ORG: &str = "ORG1";

fn resolve(provider: Arc<dyn SharedStorageProvider>, now: u64) -> Resolution {
    IdentityResolver::new(
        Arc::new(StorageBroker::new(provider)),
        Arc::new(DefaultCrypto::new()),
        ORG,
    )
    .resolve_at(now)
}

fn shared_identifier(store: &dyn KeyValueStore) -> Option<String> {
    let sealed = store.get(shared_identity_key(ORG)).unwrap()?;
    let entry = SharedIdentityEntry::open(&sealed, &DefaultCrypto::new()).unwrap();
    Some(entry.identifier)
}

#[test]
fn test_reinstall_recovers_identifier() {
    let medium = MemorySharedMedium::new();
    let installed = MemoryStorageProvider::new("com.example.app", &medium);
    let first = resolve(Arc::new(installed.relaunched()), 100);
    assert_eq!(first.launch_type, LaunchType::First);

    let reinstalled = installed.reinstalled();
    let second = resolve(Arc::new(reinstalled.relaunched()), 200);
    assert_eq!(second.launch_type, LaunchType::Reinstall);
    assert_eq!(second.record.identifier(), first.record.identifier());
    assert_eq!(second.changed_from, None);
    let conflict = second.conflict.unwrap();
    assert_eq!(conflict.kind, ConflictKind::RecoveredFromShared);
    assert_eq!(conflict.candidates, 1);

    let third = resolve(Arc::new(reinstalled), 300);
    assert_eq!(third.launch_type, LaunchType::Normal);
    assert_eq!(third.record.identifier(), first.record.identifier());
}

#[test]
fn test_sibling_app_adopts_identifier() {
    let medium = MemorySharedMedium::new();
    let first = resolve(
        Arc::new(MemoryStorageProvider::new("com.example.one", &medium)),
        100,
    );
    let sibling = resolve(
        Arc::new(MemoryStorageProvider::new("com.example.two", &medium)),
        200,
    );
    assert_eq!(sibling.launch_type, LaunchType::Reinstall);
    assert_eq!(sibling.record.identifier(), first.record.identifier());
    assert_eq!(
        shared_identifier(&*medium.store("com.example.two")).as_deref(),
        Some(first.record.identifier())
    );
}

#[test]
fn test_restored_private_store_is_tampered() {
    let medium = MemorySharedMedium::new();
    let provider = MemoryStorageProvider::new("com.example.app", &medium);
    let first = resolve(Arc::new(provider.relaunched()), 100);

    let newer = SharedIdentityEntry::new(ORG, "someone-else", 500)
        .seal(&DefaultCrypto::new())
        .unwrap();
    medium
        .store("com.example.other")
        .set(shared_identity_key(ORG), newer)
        .unwrap();

    let resolution = resolve(Arc::new(provider), 600);
    assert_eq!(resolution.launch_type, LaunchType::Tampered);
    assert_eq!(resolution.record.identifier(), first.record.identifier());
    let conflict = resolution.conflict.unwrap();
    assert_eq!(conflict.kind, ConflictKind::LocalDisagreesWithShared);
    assert_eq!(conflict.candidates, 2);
    assert_eq!(
        shared_identifier(&*medium.store("com.example.app")).as_deref(),
        Some(first.record.identifier())
    );
}

#[test]
fn test_conflicting_shared_values_are_deterministic() {
    let plant = |medium: &MemorySharedMedium, app: &str, identifier: &str| {
        let sealed = SharedIdentityEntry::new(ORG, identifier, 42)
            .seal(&DefaultCrypto::new())
            .unwrap();
        medium
            .store(app)
            .set(shared_identity_key(ORG), sealed)
            .unwrap();
    };

    let mut adopted = Vec::new();
    for _ in 0..3 {
        let medium = MemorySharedMedium::new();
        plant(&medium, "com.example.b", "beta");
        plant(&medium, "com.example.c", "gamma");
        let resolution = resolve(
            Arc::new(MemoryStorageProvider::new("com.example.a", &medium)),
            100,
        );
        assert_eq!(resolution.launch_type, LaunchType::Tampered);
        assert_eq!(
            resolution.conflict.map(|conflict| conflict.kind),
            Some(ConflictKind::ConflictingSharedValues)
        );
        adopted.push(resolution.record.identifier().to_string());
    }
    assert_eq!(adopted, vec!["gamma", "gamma", "gamma"]);
}

#[test]
fn test_file_storage_reinstall() {
    let root = tempfile::tempdir().unwrap();
    let paths = StoragePaths::new(root.path());

    let first = resolve(
        Arc::new(FileStorageProvider::new(paths.clone(), "com.example.app")),
        100,
    );
    assert_eq!(first.launch_type, LaunchType::First);

    let again = resolve(
        Arc::new(FileStorageProvider::new(paths.clone(), "com.example.app")),
        200,
    );
    assert_eq!(again.launch_type, LaunchType::Normal);

    std::fs::remove_dir_all(paths.private_dir("com.example.app")).unwrap();
    let reinstalled = resolve(
        Arc::new(FileStorageProvider::new(paths.clone(), "com.example.app")),
        300,
    );
    assert_eq!(reinstalled.launch_type, LaunchType::Reinstall);
    assert_eq!(reinstalled.record.identifier(), first.record.identifier());

    let sibling = resolve(
        Arc::new(FileStorageProvider::new(paths, "com.example.sibling")),
        400,
    );
    assert_eq!(sibling.launch_type, LaunchType::Reinstall);
    assert_eq!(sibling.record.identifier(), first.record.identifier());
}
