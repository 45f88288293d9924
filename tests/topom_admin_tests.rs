use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use topom::{
    ActionState, FileStore, Group, InMemoryProxyFleet, InMemoryStore, ProxyClient, SlotMapping,
    Topom, TopomConfig, TopomError, TopomStore,
};

const MAX_SLOTS: u32 = 32;

fn config() -> TopomConfig {
    TopomConfig::new("admin-test")
        .max_slot_num(MAX_SLOTS)
        .sync_timeout(Duration::from_millis(200))
}

async fn online_topom() -> (Topom, Arc<InMemoryStore>, InMemoryProxyFleet) {
    let store = Arc::new(InMemoryStore::new(MAX_SLOTS));
    let fleet = InMemoryProxyFleet::new(MAX_SLOTS);
    let topom = Topom::new(config(), store.clone(), Arc::new(fleet.clone())).unwrap();
    topom.start().await.unwrap();
    (topom, store, fleet)
}

#[tokio::test]
async fn start_takes_the_store_lock_and_close_releases_it() {
    let store = Arc::new(InMemoryStore::new(MAX_SLOTS));
    let fleet = Arc::new(InMemoryProxyFleet::new(MAX_SLOTS));

    let first = Topom::new(config(), store.clone(), fleet.clone()).unwrap();
    first.start().await.unwrap();
    assert!(first.is_online());
    assert_eq!(
        store.load_topom().await.unwrap().map(|m| m.token),
        Some(first.model().token.clone())
    );

    let second = Topom::new(config(), store.clone(), fleet.clone()).unwrap();
    let err = second.start().await.unwrap_err();
    assert!(matches!(err, TopomError::Locked(_)));
    assert!(!second.is_online());

    first.close().await.unwrap();
    assert!(store.load_topom().await.unwrap().is_none());
    second.start().await.unwrap();
}

#[tokio::test]
async fn closed_manager_rejects_mutations_but_serves_reads() {
    let (topom, _store, _fleet) = online_topom().await;
    topom.close().await.unwrap();

    assert_eq!(topom.create_group(1).await.unwrap_err(), TopomError::Closed);
    assert_eq!(
        topom.prepare_action().await.unwrap_err(),
        TopomError::Closed
    );
    assert_eq!(topom.slots().await.unwrap().len(), MAX_SLOTS as usize);
    assert!(!topom.overview().await.unwrap().online);
}

#[tokio::test]
async fn start_rejects_a_store_with_a_different_slot_count() {
    let store = Arc::new(InMemoryStore::new(MAX_SLOTS * 2));
    let fleet = Arc::new(InMemoryProxyFleet::new(MAX_SLOTS));
    let topom = Topom::new(config(), store, fleet).unwrap();
    assert!(topom.start().await.unwrap_err().is_validation());
}

#[tokio::test]
async fn invalid_config_is_rejected_up_front() {
    let store = Arc::new(InMemoryStore::new(MAX_SLOTS));
    let fleet = Arc::new(InMemoryProxyFleet::new(MAX_SLOTS));
    let bad = TopomConfig::new("").max_slot_num(MAX_SLOTS);
    assert!(Topom::new(bad, store, fleet).is_err());
}

#[tokio::test]
async fn group_lifecycle_enforces_membership_rules() {
    let (topom, _store, _fleet) = online_topom().await;

    assert!(topom.create_group(0).await.is_err());
    assert!(topom.create_group(10_000).await.is_err());
    topom.create_group(1).await.unwrap();
    assert!(topom.create_group(1).await.is_err());
    topom.create_group(2).await.unwrap();

    topom.group_add_server(1, "10.0.0.1:6379").await.unwrap();
    topom.group_add_server(1, "10.0.0.2:6379").await.unwrap();
    assert!(topom.group_add_server(2, "10.0.0.1:6379").await.is_err());
    assert!(topom.group_add_server(2, "  ").await.is_err());

    // The active server goes last.
    assert!(topom.group_del_server(1, "10.0.0.1:6379").await.is_err());
    assert!(topom.group_del_server(1, "10.0.0.9:6379").await.is_err());
    assert!(topom.remove_group(1).await.is_err());

    topom
        .remap_group(vec![SlotMapping::new(0).with_group(1)])
        .await
        .unwrap();
    topom.group_del_server(1, "10.0.0.2:6379").await.unwrap();
    // Last server of a group that still owns a slot.
    assert!(topom.group_del_server(1, "10.0.0.1:6379").await.is_err());

    topom.remove_group(2).await.unwrap();
    assert!(topom.remove_group(2).await.is_err());
    assert_eq!(topom.overview().await.unwrap().groups, 1);
}

#[tokio::test]
async fn first_server_of_a_group_refreshes_the_fleet() {
    let (topom, store, fleet) = online_topom().await;
    topom.create_group(1).await.unwrap();
    store
        .update_slot_mapping(SlotMapping::new(4).with_group(1))
        .await
        .unwrap();
    let proxy = topom
        .create_proxy(&fleet.start_proxy().await.admin_addr)
        .await
        .unwrap();

    let before = fleet.client(&proxy.admin_addr).slots().await.unwrap();
    assert!(before[4].backend_addr.is_empty());

    topom.group_add_server(1, "10.0.0.1:6379").await.unwrap();
    let after = fleet.client(&proxy.admin_addr).slots().await.unwrap();
    assert_eq!(after[4].backend_addr, "10.0.0.1:6379");
    assert_eq!(after, topom.slots().await.unwrap());
}

#[tokio::test]
async fn create_proxy_registers_and_pushes_the_full_table() {
    let (topom, _store, fleet) = online_topom().await;
    topom.create_group(1).await.unwrap();
    topom.group_add_server(1, "10.0.0.1:6379").await.unwrap();
    topom
        .remap_group((0..MAX_SLOTS).map(|sid| SlotMapping::new(sid).with_group(1)).collect())
        .await
        .unwrap();

    let started = fleet.start_proxy().await;
    let proxy = topom.create_proxy(&started.admin_addr).await.unwrap();
    assert_eq!(proxy.token, started.token);

    let slots = fleet.client(&proxy.admin_addr).slots().await.unwrap();
    assert!(slots.iter().all(|s| s.backend_addr == "10.0.0.1:6379"));

    let err = topom.create_proxy(&started.admin_addr).await.unwrap_err();
    assert!(err.is_validation());
    assert_eq!(topom.overview().await.unwrap().proxies, 1);
}

#[tokio::test]
async fn create_proxy_fails_for_an_unreachable_proxy() {
    let (topom, _store, fleet) = online_topom().await;
    let started = fleet.start_proxy().await;
    fleet.shutdown_proxy(&started.admin_addr).await.unwrap();

    assert!(topom.create_proxy(&started.admin_addr).await.is_err());
    assert_eq!(topom.overview().await.unwrap().proxies, 0);
}

#[tokio::test]
async fn reinit_proxy_repairs_a_stale_table() {
    let (topom, store, fleet) = online_topom().await;
    topom.create_group(1).await.unwrap();
    topom.group_add_server(1, "10.0.0.1:6379").await.unwrap();
    let proxy = fleet.start_proxy().await;
    store.update_proxy(proxy.clone()).await.unwrap();
    store
        .update_slot_mapping(SlotMapping::new(9).with_group(1))
        .await
        .unwrap();

    let client = fleet.client(&proxy.admin_addr);
    assert!(client.slots().await.unwrap()[9].backend_addr.is_empty());

    topom.reinit_proxy(&proxy.token).await.unwrap();
    assert_eq!(client.slots().await.unwrap(), topom.slots().await.unwrap());

    assert!(matches!(
        topom.reinit_proxy("missing").await.unwrap_err(),
        TopomError::NotFound(_)
    ));
}

#[tokio::test]
async fn remove_proxy_needs_force_for_a_dead_proxy() {
    let (topom, _store, fleet) = online_topom().await;
    let alive = topom
        .create_proxy(&fleet.start_proxy().await.admin_addr)
        .await
        .unwrap();
    let dead = topom
        .create_proxy(&fleet.start_proxy().await.admin_addr)
        .await
        .unwrap();

    topom.remove_proxy(&alive.token, false).await.unwrap();
    assert!(!fleet.is_online(&alive.admin_addr).await);

    fleet.shutdown_proxy(&dead.admin_addr).await.unwrap();
    assert!(topom.remove_proxy(&dead.token, false).await.is_err());
    assert_eq!(topom.overview().await.unwrap().proxies, 1);

    topom.remove_proxy(&dead.token, true).await.unwrap();
    assert_eq!(topom.overview().await.unwrap().proxies, 0);
}

#[tokio::test]
async fn slow_proxy_counts_as_a_sync_failure() {
    let (topom, store, fleet) = online_topom().await;
    topom.create_group(1).await.unwrap();
    topom.group_add_server(1, "10.0.0.1:6379").await.unwrap();
    let slow = fleet.start_proxy().await;
    store.update_proxy(slow.clone()).await.unwrap();
    fleet
        .set_response_delay(&slow.admin_addr, Duration::from_secs(5))
        .await
        .unwrap();

    topom.create_action(2, 1).await.unwrap();
    let err = topom.prepare_action().await.unwrap_err();
    assert!(err.is_sync());
    assert_eq!(
        topom.slot_mapping(2).await.unwrap().action.state,
        ActionState::Preparing
    );
}

#[tokio::test]
async fn create_action_range_skips_busy_and_owned_slots() {
    let (topom, store, _fleet) = online_topom().await;
    topom.create_group(1).await.unwrap();
    topom.group_add_server(1, "10.0.0.1:6379").await.unwrap();
    store
        .update_slot_mapping(SlotMapping::new(3).with_group(1))
        .await
        .unwrap();
    store
        .update_slot_mapping(SlotMapping::new(4).with_action(ActionState::Migrating, 1))
        .await
        .unwrap();

    assert_eq!(topom.create_action_range(0, 7, 1).await.unwrap(), 6);
    assert_eq!(topom.create_action_range(0, 7, 1).await.unwrap(), 0);
    assert!(topom.create_action_range(7, 0, 1).await.is_err());
    assert!(topom.create_action_range(0, MAX_SLOTS, 1).await.is_err());
    assert!(topom.create_action_range(0, 1, 2).await.is_err());

    let overview = topom.overview().await.unwrap();
    assert_eq!(overview.actions.get("pending"), Some(&6));
    assert_eq!(overview.actions.get("migrating"), Some(&1));
    assert_eq!(overview.assigned_slots, 1);

    let mut indexes = Vec::new();
    for sid in [0, 1, 2, 5, 6, 7] {
        let mapping = topom.slot_mapping(sid).await.unwrap();
        assert_eq!(mapping.action.state, ActionState::Pending);
        indexes.push(mapping.action.index);
    }
    assert_eq!(indexes, vec![1, 2, 3, 4, 5, 6]);

    // The batch reserved one contiguous block, so the next action follows it.
    topom.create_action(8, 1).await.unwrap();
    assert_eq!(topom.slot_mapping(8).await.unwrap().action.index, 7);
}

#[tokio::test]
async fn file_store_survives_a_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("topom.json");
    let fleet = Arc::new(InMemoryProxyFleet::new(MAX_SLOTS));

    {
        let store = Arc::new(FileStore::open(&path, MAX_SLOTS).await.unwrap());
        let topom = Topom::new(config(), store, fleet.clone()).unwrap();
        topom.start().await.unwrap();
        topom.create_group(1).await.unwrap();
        topom.group_add_server(1, "10.0.0.1:6379").await.unwrap();
        topom.create_action(5, 1).await.unwrap();
        assert_eq!(topom.prepare_action().await.unwrap(), 5);
        topom.close().await.unwrap();
    }

    let store = Arc::new(FileStore::open(&path, MAX_SLOTS).await.unwrap());
    assert!(store.load_topom().await.unwrap().is_none());
    let topom = Topom::new(config(), store, fleet).unwrap();
    topom.start().await.unwrap();
    assert_eq!(
        topom.slot_mapping(5).await.unwrap().action.state,
        ActionState::Migrating
    );
    topom.complete_action(5).await.unwrap();
    assert_eq!(topom.slot_mapping(5).await.unwrap().group_id, 1);

    // A later action still gets a larger index after the reload.
    topom.create_action(6, 1).await.unwrap();
    assert!(topom.slot_mapping(6).await.unwrap().action.index > 1);
}

#[tokio::test]
async fn file_store_rejects_a_different_slot_count() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("topom.json");
    FileStore::open(&path, MAX_SLOTS).await.unwrap();

    let err = match FileStore::open(&path, MAX_SLOTS + 1).await {
        Ok(_) => panic!("slot count mismatch should be rejected"),
        Err(err) => err,
    };
    assert!(err.is_validation());
}

#[tokio::test]
async fn file_store_keeps_the_manager_lock_across_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("topom.json");
    let fleet = Arc::new(InMemoryProxyFleet::new(MAX_SLOTS));

    let first = Topom::new(
        config(),
        Arc::new(FileStore::open(&path, MAX_SLOTS).await.unwrap()),
        fleet.clone(),
    )
    .unwrap();
    first.start().await.unwrap();

    let reopened = Arc::new(FileStore::open(&path, MAX_SLOTS).await.unwrap());
    let second = Topom::new(config(), reopened.clone(), fleet).unwrap();
    assert!(matches!(
        second.start().await.unwrap_err(),
        TopomError::Locked(_)
    ));

    reopened.release().await.unwrap();
    second.start().await.unwrap();
}

#[tokio::test]
async fn two_file_stores_on_one_path_keep_a_single_writer() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("topom.json");
    let fleet = Arc::new(InMemoryProxyFleet::new(MAX_SLOTS));

    let store_a = Arc::new(FileStore::open(&path, MAX_SLOTS).await.unwrap());
    let store_b = Arc::new(FileStore::open(&path, MAX_SLOTS).await.unwrap());
    let a = Topom::new(config(), store_a, fleet.clone()).unwrap();
    let b = Topom::new(config(), store_b.clone(), fleet.clone()).unwrap();

    a.start().await.unwrap();
    assert!(matches!(b.start().await.unwrap_err(), TopomError::Locked(_)));

    a.create_group(1).await.unwrap();
    a.group_add_server(1, "10.0.0.1:6379").await.unwrap();
    store_b
        .update_group(Group::with_servers(2, ["10.0.0.2:6379"]))
        .await
        .unwrap();
    a.create_action(5, 1).await.unwrap();

    // Neither handle overwrote the other's document.
    let reopened = FileStore::open(&path, MAX_SLOTS).await.unwrap();
    let snapshot = reopened.load_snapshot().await.unwrap();
    assert_eq!(
        snapshot.group(1).unwrap().servers[0].addr,
        "10.0.0.1:6379"
    );
    assert!(snapshot.group(2).is_some());
    assert_eq!(snapshot.slot(5).unwrap().action.state, ActionState::Pending);
    assert!(a.context().await.unwrap().group(2).is_ok());

    // Once the lock is forced over to the second manager the first one is fenced off.
    store_b.release().await.unwrap();
    b.start().await.unwrap();
    assert!(matches!(
        a.create_group(3).await.unwrap_err(),
        TopomError::Locked(_)
    ));
    b.create_group(3).await.unwrap();
    assert!(reopened.load_snapshot().await.unwrap().group(3).is_some());

    a.close().await.unwrap();
    assert!(reopened.load_topom().await.unwrap().is_some());
    b.close().await.unwrap();
    assert!(reopened.load_topom().await.unwrap().is_none());
}
