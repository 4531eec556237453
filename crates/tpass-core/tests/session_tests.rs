//! Integration tests for vault sessions: persistence, locking, device failures

mod common;

use std::fs;
use std::time::{Duration, SystemTime};

use common::{Failure, ScriptedDevice, TestStore, draft, tagged};
use tpass_core::device::DeviceOperation;
use tpass_core::vault::codec::CodecError;
use tpass_core::vault::lock::LockError;
use tpass_core::vault::{
    EntryEdit, EntryId, ErrorClass, Icon, LookupKey, MetadataCache, ROOT_TAG, SessionOptions,
    TagId, VaultSession, lock_path_for,
};
use tpass_core::SessionError;
use zeroize::Zeroizing;

fn key(s: &str) -> LookupKey {
    s.parse().expect("valid lookup key")
}

// ==================== create / open / save ====================

#[test]
fn test_entries_survive_reopen() {
    let store = TestStore::new();
    let mut session = store.create(ScriptedDevice::new());
    let work = session.insert_tag("Work", Icon::Card).unwrap();
    session
        .insert_entry(tagged(draft("github.com", "octocat", "hunter2"), &[work]))
        .unwrap();
    session.save().unwrap();
    session.release().unwrap();

    let session = store.open(ScriptedDevice::new());
    let (id, entry) = session.resolve_entry(&key("work/github.com:octocat")).unwrap();
    assert!(entry.is_sealed());
    assert_eq!(session.reveal(id).unwrap().password.as_plain(), Some("hunter2"));
    assert_eq!(session.vault().tags[&work].icon, Icon::Card);
}

#[test]
fn test_open_missing_store() {
    let store = TestStore::new();
    let err = VaultSession::open(store.path(), ScriptedDevice::new(), SessionOptions::default())
        .unwrap_err();
    assert!(matches!(err, SessionError::NotInitialized { .. }));
    assert!(!lock_path_for(store.path()).exists());
}

#[test]
fn test_wrong_device_fails_authentication_and_releases_lock() {
    let store = TestStore::new();
    store.create(ScriptedDevice::new()).release().unwrap();

    let err = VaultSession::open(
        store.path(),
        ScriptedDevice::with_seed([0x99; 32]),
        SessionOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, SessionError::Codec(CodecError::Key(_))));
    assert_eq!(err.class(), ErrorClass::Crypto);
    assert!(!lock_path_for(store.path()).exists());
}

#[test]
fn test_second_open_is_refused_while_locked() {
    let store = TestStore::new();
    let _held = store.create(ScriptedDevice::new());

    let err = VaultSession::open(store.path(), ScriptedDevice::new(), SessionOptions::default())
        .unwrap_err();
    assert!(matches!(err, SessionError::Lock(LockError::AlreadyLocked { .. })));
    assert_eq!(err.class(), ErrorClass::LockConflict);
    // The refused open must not remove the holder's lock
    assert!(lock_path_for(store.path()).exists());
}

#[test]
fn test_drop_releases_lock() {
    let store = TestStore::new();
    {
        let _session = store.create(ScriptedDevice::new());
        assert!(lock_path_for(store.path()).exists());
    }
    assert!(!lock_path_for(store.path()).exists());
    store.open(ScriptedDevice::new());
}

#[test]
fn test_save_detects_external_modification() {
    let store = TestStore::new();
    let mut session = store.create(ScriptedDevice::new());
    session.insert_entry(draft("site", "me", "pw")).unwrap();

    let later = SystemTime::now() + Duration::from_secs(3600);
    fs::File::options()
        .write(true)
        .open(store.path())
        .unwrap()
        .set_modified(later)
        .unwrap();

    let err = session.save().unwrap_err();
    assert!(matches!(err, SessionError::Lock(LockError::Stale { .. })));
    assert_eq!(err.class(), ErrorClass::LockConflict);
    assert!(!session.is_held());
}

#[test]
fn test_repeated_saves_in_one_session() {
    let store = TestStore::new();
    let mut session = store.create(ScriptedDevice::new());
    for i in 0..3 {
        session
            .insert_entry(draft(&format!("site{i}"), "me", "pw"))
            .unwrap();
        session.save().unwrap();
    }
    session.release().unwrap();
    assert_eq!(store.open(ScriptedDevice::new()).vault().entries.len(), 3);
}

// ==================== device failures ====================

#[test]
fn test_declined_insert_leaves_file_untouched() {
    let store = TestStore::new();
    let device = ScriptedDevice::new();
    let mut session = store.create(&device);
    session.insert_entry(draft("keep", "me", "pw")).unwrap();
    session.save().unwrap();
    let before = fs::read(store.path()).unwrap();

    device.fail_on(DeviceOperation::WrapNonce, 0, Failure::Decline);
    let err = session.insert_entry(draft("new", "me", "pw")).unwrap_err();
    assert_eq!(err.class(), ErrorClass::Device);
    assert!(!session.is_held());
    assert!(!lock_path_for(store.path()).exists());
    assert!(matches!(session.save(), Err(SessionError::Released)));
    assert_eq!(fs::read(store.path()).unwrap(), before);
}

#[test]
fn test_unplugged_during_save_leaves_file_untouched() {
    let store = TestStore::new();
    let device = ScriptedDevice::new();
    let mut session = store.create(&device);
    let before = fs::read(store.path()).unwrap();

    session.insert_entry(draft("site", "me", "pw")).unwrap();
    device.fail_on(DeviceOperation::DeriveMasterKey, 0, Failure::Unplug);
    let err = session.save().unwrap_err();
    assert_eq!(err.class(), ErrorClass::Device);
    assert!(!session.is_held());
    assert_eq!(fs::read(store.path()).unwrap(), before);

    device.heal();
    drop(session);
    assert!(store.open(&device).vault().entries.is_empty());
}

#[test]
fn test_declined_edit_keeps_sealed_entry() {
    let store = TestStore::new();
    let device = ScriptedDevice::new();
    let mut session = store.create(&device);
    let id = session.insert_entry(draft("site", "me", "old")).unwrap();
    let stored = session.vault().entries[&id].clone();

    device.fail_on(DeviceOperation::WrapNonce, 0, Failure::Decline);
    let edit = EntryEdit {
        password: Some(Zeroizing::new("new".to_owned())),
        ..EntryEdit::default()
    };
    assert!(session.edit_entry(id, edit).is_err());
    assert_eq!(session.vault().entries[&id], stored);
}

// ==================== tags ====================

#[test]
fn test_remove_tag_cascades() {
    let store = TestStore::new();
    let mut session = store.create(ScriptedDevice::new());
    let work = session.insert_tag("Work", Icon::Card).unwrap();
    let home = session.insert_tag("Home", Icon::Home).unwrap();
    let a = session
        .insert_entry(tagged(draft("a.org", "", "1"), &[work, home]))
        .unwrap();
    let b = session.insert_entry(tagged(draft("b.org", "", "2"), &[work])).unwrap();

    session.remove_tag(work).unwrap();
    assert!(!session.vault().tags.contains_key(&work));
    assert_eq!(
        session.vault().entries[&a].tags.iter().copied().collect::<Vec<_>>(),
        vec![home]
    );
    assert!(session.vault().entries[&b].tags.is_empty());

    // Untagged entries are still listed under the root tag
    let all: Vec<EntryId> = session.entries_by_tag(ROOT_TAG).iter().map(|(id, _)| *id).collect();
    assert_eq!(all, vec![a, b]);

    assert!(matches!(
        session.remove_tag(work),
        Err(SessionError::TagNotFound { .. })
    ));
}

#[test]
fn test_tag_ids_follow_max() {
    let store = TestStore::new();
    let mut session = store.create(ScriptedDevice::new());
    assert_eq!(session.insert_tag("One", Icon::Star).unwrap(), TagId(1));
    assert_eq!(session.insert_tag("Two", Icon::Star).unwrap(), TagId(2));
    session.remove_tag(TagId(1)).unwrap();
    assert_eq!(session.insert_tag("Three", Icon::Star).unwrap(), TagId(3));
}

// ==================== queries ====================

#[test]
fn test_find_does_not_contact_device() {
    let store = TestStore::new();
    let device = ScriptedDevice::new();
    let mut session = store.create(&device);
    session.insert_entry(draft("mail.example.com", "alice", "pw")).unwrap();

    let calls = device.calls();
    let found = session.find("ALICE");
    assert_eq!(found.entries, vec![EntryId(0)]);
    assert_eq!(device.calls(), calls);
}

#[test]
fn test_grep_device_failure_keeps_lock() {
    let store = TestStore::new();
    let device = ScriptedDevice::new();
    let mut session = store.create(&device);
    session.insert_entry(draft("site", "me", "pw")).unwrap();

    device.fail_on(DeviceOperation::UnwrapNonce, 0, Failure::Decline);
    assert!(session.grep("pw", false).is_err());
    assert!(session.is_held());
}

// ==================== import / export ====================

#[test]
fn test_import_is_all_or_nothing() {
    let store = TestStore::new();
    let device = ScriptedDevice::new();
    let mut session = store.create(&device);
    session.insert_entry(draft("existing", "", "pw")).unwrap();

    let doc = r#"{
        "0": {"url": "a.org", "username": "a", "password": "1", "secret": ""},
        "1": {"url": "b.org", "username": "b", "password": "2", "secret": ""}
    }"#;
    device.fail_on(DeviceOperation::WrapNonce, 1, Failure::Decline);
    assert!(session.import(doc).is_err());
    assert_eq!(session.vault().entries.len(), 1);
}

#[test]
fn test_import_rejects_invalid_document() {
    let store = TestStore::new();
    let mut session = store.create(ScriptedDevice::new());
    let err = session
        .import(r#"{"0": {"url": "a.org", "username": "a", "password": "1"}}"#)
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::Format);
    assert!(session.vault().entries.is_empty());
}

#[test]
fn test_import_assigns_fresh_ids() {
    let store = TestStore::new();
    let mut session = store.create(ScriptedDevice::new());
    session.insert_entry(draft("existing", "", "pw")).unwrap();
    let ids = session
        .import(r#"{"40": {"url": "new.org", "username": "n", "password": "p", "secret": "s"}}"#)
        .unwrap();
    assert_eq!(ids, vec![EntryId(1)]);

    let export = session.export().unwrap();
    assert_eq!(export.len(), 2);
    assert_eq!(export[&EntryId(1)].secret, "s");
}

// ==================== metadata cache ====================

#[test]
fn test_cache_hit_skips_master_key() {
    let store = TestStore::new();
    let cache = MetadataCache::new(store.dir.path().join("cache").join("store.json"));
    let options = SessionOptions {
        cache: Some(cache.clone()),
    };

    let mut session = VaultSession::create(store.path(), ScriptedDevice::new(), options.clone())
        .unwrap();
    session.insert_entry(draft("cached.org", "me", "pw")).unwrap();
    session.save().unwrap();
    session.release().unwrap();
    assert!(cache.path().exists());

    let device = ScriptedDevice::new();
    device.fail_on(DeviceOperation::DeriveMasterKey, 0, Failure::Decline);
    let session = VaultSession::open(store.path(), &device, options).unwrap();
    assert_eq!(session.vault().entries.len(), 1);
    assert_eq!(device.calls(), 0);
}

#[test]
fn test_stale_cache_falls_back_to_decrypt() {
    let store = TestStore::new();
    let cache = MetadataCache::new(store.dir.path().join("store.json"));
    let options = SessionOptions {
        cache: Some(cache.clone()),
    };
    VaultSession::create(store.path(), ScriptedDevice::new(), options.clone())
        .unwrap()
        .release()
        .unwrap();

    let earlier = SystemTime::now() - Duration::from_secs(3600);
    fs::File::options()
        .write(true)
        .open(cache.path())
        .unwrap()
        .set_modified(earlier)
        .unwrap();

    let device = ScriptedDevice::new();
    let session = VaultSession::open(store.path(), &device, options).unwrap();
    assert_eq!(device.calls(), 1);
    drop(session);
}

#[test]
fn test_shared_cache_never_serves_another_store() {
    let store_a = TestStore::new();
    let store_b = TestStore::new();
    let shared_dir = tempfile::TempDir::new().unwrap();
    let options = SessionOptions {
        cache: Some(MetadataCache::new(shared_dir.path().join("store.pswd.json"))),
    };

    let mut b = VaultSession::create(store_b.path(), ScriptedDevice::new(), options.clone())
        .unwrap();
    b.insert_entry(draft("bank-B", "bob", "pw-b")).unwrap();
    b.save().unwrap();
    b.release().unwrap();

    let mut a = VaultSession::create(store_a.path(), ScriptedDevice::new(), options.clone())
        .unwrap();
    a.insert_entry(draft("mail-A", "alice", "pw-a")).unwrap();
    a.save().unwrap();
    a.release().unwrap();

    // The shared snapshot now describes A and is newer than B's vault file.
    let device = ScriptedDevice::new();
    let mut b = VaultSession::open(store_b.path(), &device, options).unwrap();
    assert_eq!(device.calls(), 1);
    assert!(b.resolve_entry(&key("bank-B")).is_ok());
    assert!(b.resolve_entry(&key("mail-A")).is_err());

    b.insert_entry(draft("second-B", "bob", "pw-b2")).unwrap();
    b.save().unwrap();
    b.release().unwrap();

    let reopened = store_b.open(ScriptedDevice::new());
    assert_eq!(reopened.vault().entries.len(), 2);
    let (id, _) = reopened.resolve_entry(&key("bank-B")).unwrap();
    assert_eq!(reopened.reveal(id).unwrap().password.as_plain(), Some("pw-b"));
    assert!(reopened.resolve_entry(&key("mail-A")).is_err());
}

#[test]
fn test_default_cache_names_differ_per_store() {
    let store_a = TestStore::new();
    let store_b = TestStore::new();
    let shm = tempfile::TempDir::new().unwrap();
    assert_eq!(store_a.path().file_name(), store_b.path().file_name());
    assert_ne!(
        MetadataCache::location_in(shm.path(), store_a.path()),
        MetadataCache::location_in(shm.path(), store_b.path())
    );
}
